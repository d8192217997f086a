//! Token Issuer.
//!
//! Builds HS256 access tokens signed with the API key pair shared with the
//! media server. Issuance is local and synchronous; it never performs I/O.
//!
//! Which grants a token carries is decided by the caller (see [`Role`] and
//! [`GrantSet`]). The issuer only enforces that every participant token can
//! join its room.

use crate::observability::metrics;
use chrono::{DateTime, Utc};
use common::jwt::{check_token_size, AccessClaims, GrantSet, VideoGrant, DEFAULT_CLOCK_SKEW};
use common::secret::{ExposeSecret, SecretString};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Validity window of participant tokens.
pub const DEFAULT_TOKEN_VALIDITY: Duration = Duration::from_secs(3600);

/// Validity window of control-plane bearer tokens.
pub const CONTROL_TOKEN_VALIDITY: Duration = Duration::from_secs(600);

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Invalid token input: {0}")]
    InvalidInput(String),

    #[error("Invalid signing key: {0}")]
    InvalidKey(String),

    #[error("Token signing failed: {0}")]
    Signing(String),

    #[error("The access token is invalid or expired")]
    Invalid,
}

/// Actor role used to pick a default grant set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Viewer,
}

impl Role {
    pub fn default_grants(self) -> GrantSet {
        match self {
            Role::Host => GrantSet::host(),
            Role::Viewer => GrantSet::viewer(),
        }
    }
}

/// Signs participant and control-plane tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    api_key: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("api_key", &self.api_key)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl TokenIssuer {
    /// Build an issuer from the API key pair.
    ///
    /// Signs a probe token so malformed key material fails here, at startup,
    /// rather than on the first request.
    pub fn new(api_key: &str, api_secret: &SecretString) -> Result<Self, TokenError> {
        if api_key.trim().is_empty() {
            return Err(TokenError::InvalidKey("API key must not be empty".to_string()));
        }
        let secret = api_secret.expose_secret().as_bytes();
        if secret.is_empty() {
            return Err(TokenError::InvalidKey(
                "API secret must not be empty".to_string(),
            ));
        }

        let issuer = Self {
            api_key: api_key.to_string(),
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        };

        let probe = issuer.control_token(VideoGrant {
            room_list: true,
            ..VideoGrant::default()
        })?;
        issuer.decode(&probe)?;

        Ok(issuer)
    }

    /// Issue a participant token using the wall clock.
    #[instrument(skip_all, fields(room = %room, profile = grants.profile_name()))]
    pub fn issue(
        &self,
        identity: &str,
        room: &str,
        grants: GrantSet,
        validity: Duration,
    ) -> Result<String, TokenError> {
        let token = self.issue_at(identity, room, grants, validity, Utc::now())?;
        metrics::record_token_issued(grants.profile_name());
        Ok(token)
    }

    /// Issue a participant token as of `issued_at`.
    ///
    /// Identical inputs produce identical tokens. `room_join` is always set.
    pub fn issue_at(
        &self,
        identity: &str,
        room: &str,
        grants: GrantSet,
        validity: Duration,
        issued_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        if identity.trim().is_empty() {
            return Err(TokenError::InvalidInput(
                "identity must not be empty".to_string(),
            ));
        }
        if room.trim().is_empty() {
            return Err(TokenError::InvalidInput("room must not be empty".to_string()));
        }

        let grants = GrantSet {
            room_join: true,
            ..grants
        };
        self.sign(
            identity,
            VideoGrant::participant(room, grants),
            validity,
            issued_at,
        )
    }

    /// Bearer token for a control API call. Never returned to callers.
    pub fn control_token(&self, grant: VideoGrant) -> Result<String, TokenError> {
        self.sign("", grant, CONTROL_TOKEN_VALIDITY, Utc::now())
    }

    /// Verify and decode a token signed by this issuer.
    pub fn decode(&self, token: &str) -> Result<AccessClaims, TokenError> {
        check_token_size(token).map_err(|_| TokenError::Invalid)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.api_key.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.validate_nbf = true;
        validation.leeway = DEFAULT_CLOCK_SKEW.as_secs();

        let data = decode::<AccessClaims>(token, &self.decoding_key, &validation).map_err(|e| {
            tracing::debug!(target: "sc.auth.token", error = %e, "Token verification failed");
            TokenError::Invalid
        })?;

        Ok(data.claims)
    }

    fn sign(
        &self,
        identity: &str,
        video: VideoGrant,
        validity: Duration,
        issued_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        if validity.is_zero() {
            return Err(TokenError::InvalidInput(
                "validity must be positive".to_string(),
            ));
        }
        let validity_secs = i64::try_from(validity.as_secs())
            .map_err(|_| TokenError::InvalidInput("validity is too large".to_string()))?;

        let iat = issued_at.timestamp();
        let claims = AccessClaims {
            iss: self.api_key.clone(),
            sub: identity.to_string(),
            iat,
            nbf: iat,
            exp: iat.saturating_add(validity_secs),
            video,
        };

        let mut header = Header::new(Algorithm::HS256);
        header.typ = Some("JWT".to_string());

        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(format!("JWT signing operation failed: {}", e)))
    }
}
