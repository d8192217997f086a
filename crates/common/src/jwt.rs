//! Access token claims shared by the stream controller and its test tooling.
//!
//! Tokens follow the media server's access token format: an HS256 JWT whose
//! `video` claim carries the grants. The same claim shape is used for two
//! different purposes:
//!
//! - **Participant tokens** handed to clients, scoped to one room and one
//!   identity, built from a [`GrantSet`].
//! - **Control tokens** used as the bearer credential on calls to the media
//!   server's control API (`roomCreate`, `roomList`, `roomAdmin`,
//!   `ingressAdmin`). These never leave the process.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Participant grants are always serialized as explicit booleans. The media
//!   server reads an absent `canPublish` as `true`, so omitting a field would
//!   silently widen the grant.
//! - The `sub` field in [`AccessClaims`] is redacted in Debug output

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Participant tokens are a few hundred bytes. Anything larger is rejected
/// before base64 decoding or signature verification.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Leeway applied to `exp` and `nbf` when decoding a token.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(60);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur before a token reaches signature verification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,
}

// =============================================================================
// Grants
// =============================================================================

/// The four participant capabilities a token can carry.
///
/// `room_join` is forced to `true` by the issuer for every participant token;
/// it is kept as a field so decoded tokens can be checked for it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GrantSet {
    pub room_join: bool,
    pub can_publish: bool,
    pub can_subscribe: bool,
    pub can_publish_data: bool,
}

impl GrantSet {
    /// Host profile: publish and subscribe.
    #[must_use]
    pub const fn host() -> Self {
        Self {
            room_join: true,
            can_publish: true,
            can_subscribe: true,
            can_publish_data: false,
        }
    }

    /// Viewer profile: subscribe and publish data, no media publishing.
    #[must_use]
    pub const fn viewer() -> Self {
        Self {
            room_join: true,
            can_publish: false,
            can_subscribe: true,
            can_publish_data: true,
        }
    }

    /// API auth profile: room membership only, no media capabilities.
    ///
    /// Returned alongside participant tokens so callers can authenticate
    /// further REST calls against the room.
    #[must_use]
    pub const fn api() -> Self {
        Self {
            room_join: true,
            can_publish: false,
            can_subscribe: false,
            can_publish_data: false,
        }
    }

    /// Same grants with media publishing enabled.
    #[must_use]
    pub const fn with_publish(mut self) -> Self {
        self.can_publish = true;
        self
    }

    /// Short label used as a metrics dimension.
    #[must_use]
    pub fn profile_name(&self) -> &'static str {
        match *self {
            g if g == Self::host() => "host",
            g if g == Self::viewer() => "viewer",
            g if g == Self::viewer().with_publish() => "viewer_publish",
            g if g == Self::api() => "api",
            _ => "custom",
        }
    }
}

/// The `video` claim of an access token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoGrant {
    #[serde(skip_serializing_if = "is_false")]
    pub room_create: bool,

    #[serde(skip_serializing_if = "is_false")]
    pub room_list: bool,

    #[serde(skip_serializing_if = "is_false")]
    pub room_admin: bool,

    #[serde(skip_serializing_if = "is_false")]
    pub ingress_admin: bool,

    #[serde(skip_serializing_if = "is_false")]
    pub room_join: bool,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub room: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_publish: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_subscribe: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_publish_data: Option<bool>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

impl VideoGrant {
    /// Participant grant for `room`. Every capability is written explicitly.
    #[must_use]
    pub fn participant(room: &str, grants: GrantSet) -> Self {
        Self {
            room_join: grants.room_join,
            room: room.to_string(),
            can_publish: Some(grants.can_publish),
            can_subscribe: Some(grants.can_subscribe),
            can_publish_data: Some(grants.can_publish_data),
            ..Self::default()
        }
    }

    /// Participant capabilities carried by this grant.
    ///
    /// Absent capability fields read as `false`.
    #[must_use]
    pub fn grant_set(&self) -> GrantSet {
        GrantSet {
            room_join: self.room_join,
            can_publish: self.can_publish.unwrap_or(false),
            can_subscribe: self.can_subscribe.unwrap_or(false),
            can_publish_data: self.can_publish_data.unwrap_or(false),
        }
    }
}

// =============================================================================
// Claims Types
// =============================================================================

/// Access token claims.
///
/// # Security
///
/// The `sub` field names a participant and is redacted in Debug output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Issuer: the API key id shared with the media server.
    pub iss: String,

    /// Subject: participant identity. Empty for control tokens.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sub: String,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,

    /// Not-before timestamp (Unix epoch seconds).
    pub nbf: i64,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    pub video: VideoGrant,
}

impl fmt::Debug for AccessClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessClaims")
            .field("iss", &self.iss)
            .field("sub", &"[REDACTED]")
            .field("iat", &self.iat)
            .field("nbf", &self.nbf)
            .field("exp", &self.exp)
            .field("video", &self.video)
            .finish()
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Reject tokens larger than [`MAX_JWT_SIZE_BYTES`].
///
/// # Errors
///
/// Returns `JwtValidationError::TokenTooLarge` if the token exceeds the limit.
pub fn check_token_size(token: &str) -> Result<(), JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_max_jwt_size_is_8kb() {
        assert_eq!(MAX_JWT_SIZE_BYTES, 8192);
    }

    #[test]
    fn test_check_token_size_boundary() {
        let at_limit = "a".repeat(MAX_JWT_SIZE_BYTES);
        assert!(check_token_size(&at_limit).is_ok());

        let over_limit = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        assert_eq!(
            check_token_size(&over_limit),
            Err(JwtValidationError::TokenTooLarge)
        );
    }

    #[test]
    fn test_profiles_always_join() {
        for grants in [
            GrantSet::host(),
            GrantSet::viewer(),
            GrantSet::viewer().with_publish(),
            GrantSet::api(),
        ] {
            assert!(grants.room_join);
        }
    }

    #[test]
    fn test_host_and_viewer_shapes() {
        let host = GrantSet::host();
        assert!(host.can_publish && host.can_subscribe);

        let viewer = GrantSet::viewer();
        assert!(!viewer.can_publish);
        assert!(viewer.can_subscribe);
        assert!(viewer.can_publish_data);

        let api = GrantSet::api();
        assert!(!api.can_publish && !api.can_subscribe && !api.can_publish_data);
    }

    #[test]
    fn test_profile_names() {
        assert_eq!(GrantSet::host().profile_name(), "host");
        assert_eq!(GrantSet::viewer().profile_name(), "viewer");
        assert_eq!(
            GrantSet::viewer().with_publish().profile_name(),
            "viewer_publish"
        );
        assert_eq!(GrantSet::api().profile_name(), "api");
        assert_eq!(GrantSet::default().profile_name(), "custom");
    }

    #[test]
    fn test_participant_grant_serializes_explicit_false() {
        let grant = VideoGrant::participant("studio", GrantSet::api());
        let json = serde_json::to_value(&grant).unwrap();

        assert_eq!(json["roomJoin"], true);
        assert_eq!(json["room"], "studio");
        assert_eq!(json["canPublish"], false);
        assert_eq!(json["canSubscribe"], false);
        assert_eq!(json["canPublishData"], false);
        assert!(json.get("roomCreate").is_none());
        assert!(json.get("ingressAdmin").is_none());
    }

    #[test]
    fn test_control_grant_omits_participant_fields() {
        let grant = VideoGrant {
            room_list: true,
            ..VideoGrant::default()
        };
        let json = serde_json::to_value(&grant).unwrap();

        assert_eq!(json, serde_json::json!({ "roomList": true }));
    }

    #[test]
    fn test_grant_set_reads_absent_fields_as_false() {
        let grant: VideoGrant =
            serde_json::from_str(r#"{"roomJoin": true, "room": "r1"}"#).unwrap();
        let grants = grant.grant_set();

        assert!(grants.room_join);
        assert!(!grants.can_publish);
        assert!(!grants.can_subscribe);
        assert!(!grants.can_publish_data);
    }

    #[test]
    fn test_access_claims_debug_redacts_sub() {
        let claims = AccessClaims {
            iss: "APIkey".to_string(),
            sub: "alice-secret-identity".to_string(),
            iat: 1_700_000_000,
            nbf: 1_700_000_000,
            exp: 1_700_003_600,
            video: VideoGrant::participant("studio", GrantSet::host()),
        };

        let debug_str = format!("{claims:?}");
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("alice-secret-identity"));
        assert!(debug_str.contains("APIkey"));
    }

    #[test]
    fn test_access_claims_omit_empty_sub() {
        let claims = AccessClaims {
            iss: "APIkey".to_string(),
            sub: String::new(),
            iat: 0,
            nbf: 0,
            exp: 600,
            video: VideoGrant {
                room_create: true,
                ..VideoGrant::default()
            },
        };

        let json = serde_json::to_value(&claims).unwrap();
        assert!(json.get("sub").is_none());

        let back: AccessClaims = serde_json::from_value(json).unwrap();
        assert_eq!(back, claims);
    }
}
