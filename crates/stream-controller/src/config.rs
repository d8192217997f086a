//! Stream Controller configuration.
//!
//! Configuration is loaded from environment variables once at startup and
//! passed explicitly into the token issuer, the control client and the app
//! state. The API secret is redacted in Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default timeout for a single control API request.
pub const DEFAULT_CONTROL_REQUEST_TIMEOUT_SECONDS: u64 = 10;

/// Upper bound for `CONTROL_REQUEST_TIMEOUT_SECONDS`.
pub const MAX_CONTROL_REQUEST_TIMEOUT_SECONDS: u64 = 120;

/// Default graceful-shutdown drain period.
pub const DEFAULT_DRAIN_SECONDS: u64 = 30;

/// What to do when a publish request names a room that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoomConflictPolicy {
    /// Fail with 409 before calling CreateRoom.
    #[default]
    Reject,
    /// Succeed if the existing room carries the requested metadata.
    Reuse,
}

impl FromStr for RoomConflictPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "reuse" => Ok(Self::Reuse),
            other => Err(ConfigError::InvalidRoomConflictPolicy(format!(
                "ROOM_CONFLICT_POLICY must be 'reject' or 'reuse', got '{other}'"
            ))),
        }
    }
}

/// Stream Controller configuration.
#[derive(Clone)]
pub struct Config {
    /// Media server control API base URL (`LIVEKIT_URL`).
    pub livekit_url: String,

    /// Client-facing websocket URL returned in connection details.
    /// Defaults to `livekit_url`.
    pub ws_url: String,

    /// API key id shared with the media server.
    pub api_key: String,

    /// API secret used to sign every token.
    pub api_secret: SecretString,

    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    pub room_conflict_policy: RoomConflictPolicy,

    /// Viewer tokens also get `canPublish` (synthetic media such as file
    /// playback).
    pub viewer_can_publish: bool,

    /// Per-request timeout for control API calls.
    pub control_request_timeout_seconds: u64,

    /// Seconds to keep serving in-flight requests after a shutdown signal.
    pub drain_seconds: u64,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("livekit_url", &self.livekit_url)
            .field("ws_url", &self.ws_url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("room_conflict_policy", &self.room_conflict_policy)
            .field("viewer_can_publish", &self.viewer_can_publish)
            .field(
                "control_request_timeout_seconds",
                &self.control_request_timeout_seconds,
            )
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid media server URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid room conflict policy: {0}")]
    InvalidRoomConflictPolicy(String),

    #[error("Invalid boolean setting: {0}")]
    InvalidBool(String),

    #[error("Invalid control request timeout configuration: {0}")]
    InvalidControlTimeout(String),

    #[error("Invalid drain period configuration: {0}")]
    InvalidDrainPeriod(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let livekit_url = required(vars, "LIVEKIT_URL")?;
        validate_url("LIVEKIT_URL", &livekit_url)?;

        let ws_url = match non_empty(vars, "LIVEKIT_WS_URL") {
            Some(url) => {
                validate_url("LIVEKIT_WS_URL", &url)?;
                url
            }
            None => livekit_url.clone(),
        };

        let api_key = required(vars, "LIVEKIT_API_KEY")?;
        let api_secret = SecretString::from(required(vars, "LIVEKIT_API_SECRET")?);

        let bind_address =
            non_empty(vars, "BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let room_conflict_policy = match vars.get("ROOM_CONFLICT_POLICY") {
            Some(value) => value.parse()?,
            None => RoomConflictPolicy::default(),
        };

        let viewer_can_publish = match vars.get("VIEWER_CAN_PUBLISH") {
            Some(value) => parse_bool("VIEWER_CAN_PUBLISH", value)?,
            None => false,
        };

        let control_request_timeout_seconds =
            if let Some(value_str) = vars.get("CONTROL_REQUEST_TIMEOUT_SECONDS") {
                let value: u64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidControlTimeout(format!(
                        "CONTROL_REQUEST_TIMEOUT_SECONDS must be a valid positive integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                if value == 0 {
                    return Err(ConfigError::InvalidControlTimeout(
                        "CONTROL_REQUEST_TIMEOUT_SECONDS must be greater than 0".to_string(),
                    ));
                }

                if value > MAX_CONTROL_REQUEST_TIMEOUT_SECONDS {
                    return Err(ConfigError::InvalidControlTimeout(format!(
                        "CONTROL_REQUEST_TIMEOUT_SECONDS must not exceed {} seconds, got {}",
                        MAX_CONTROL_REQUEST_TIMEOUT_SECONDS, value
                    )));
                }

                value
            } else {
                DEFAULT_CONTROL_REQUEST_TIMEOUT_SECONDS
            };

        let drain_seconds = if let Some(value_str) = vars.get("SC_DRAIN_SECONDS") {
            value_str.parse().map_err(|e| {
                ConfigError::InvalidDrainPeriod(format!(
                    "SC_DRAIN_SECONDS must be a valid non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?
        } else {
            DEFAULT_DRAIN_SECONDS
        };

        Ok(Config {
            livekit_url,
            ws_url,
            api_key,
            api_secret,
            bind_address,
            room_conflict_policy,
            viewer_can_publish,
            control_request_timeout_seconds,
            drain_seconds,
        })
    }
}

fn non_empty(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    non_empty(vars, name).ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn validate_url(name: &str, url: &str) -> Result<(), ConfigError> {
    const SCHEMES: [&str; 4] = ["http://", "https://", "ws://", "wss://"];
    if SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
        Ok(())
    } else {
        Err(ConfigError::InvalidUrl(format!(
            "{name} must start with http://, https://, ws:// or wss://, got '{url}'"
        )))
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(ConfigError::InvalidBool(format!(
            "{name} must be true or false, got '{other}'"
        ))),
    }
}
