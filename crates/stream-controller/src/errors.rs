//! Stream Controller error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl. Upstream
//! and internal details are logged server-side; clients get a generic message.

use crate::auth::token::TokenError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Step of the publish flow that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStage {
    Room,
    Ingress,
    Token,
}

impl PublishStage {
    /// Client-facing error code for a failure at this stage.
    pub fn error_code(self) -> &'static str {
        match self {
            PublishStage::Room => "ROOM_CREATE_FAILED",
            PublishStage::Ingress => "INGRESS_CREATE_FAILED",
            PublishStage::Token => "TOKEN_ISSUE_FAILED",
        }
    }

    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            PublishStage::Room => "room",
            PublishStage::Ingress => "ingress",
            PublishStage::Token => "token",
        }
    }
}

impl fmt::Display for PublishStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stream Controller error type.
///
/// Maps to HTTP status codes:
/// - BadRequest: 400 Bad Request
/// - NotFound: 404 Not Found
/// - Conflict: 409 Conflict
/// - Upstream, PublishFailed, Internal: 500 Internal Server Error
/// - ServiceUnavailable: 503 Service Unavailable
#[derive(Debug, Error)]
pub enum ScError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The media server control API failed or returned something unusable.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// A publish flow stopped partway. `room_name` is set when a room was
    /// already created and has been left in place.
    #[error("Publish flow failed at {stage} stage: {reason}")]
    PublishFailed {
        stage: PublishStage,
        room_name: Option<String>,
        reason: String,
    },

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            ScError::BadRequest(_) => 400,
            ScError::NotFound(_) => 404,
            ScError::Conflict(_) => 409,
            ScError::Upstream(_) | ScError::PublishFailed { .. } | ScError::Internal(_) => 500,
            ScError::ServiceUnavailable(_) => 503,
        }
    }
}

impl From<TokenError> for ScError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidInput(reason) => ScError::BadRequest(reason),
            other => ScError::Internal(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,

    #[serde(skip_serializing_if = "Option::is_none")]
    room_name: Option<String>,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for ScError {
    fn into_response(self) -> Response {
        let mut room_name: Option<String> = None;
        let (status, code, message) = match &self {
            ScError::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", reason.clone())
            }
            ScError::NotFound(resource) => (StatusCode::NOT_FOUND, "NOT_FOUND", resource.clone()),
            ScError::Conflict(reason) => (StatusCode::CONFLICT, "CONFLICT", reason.clone()),
            ScError::Upstream(err) => {
                // Log actual error server-side, return generic message to client
                tracing::error!(target: "sc.upstream", error = %err, "Media server call failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "UPSTREAM_ERROR",
                    "The media server request failed".to_string(),
                )
            }
            ScError::PublishFailed {
                stage,
                room_name: orphan,
                reason,
            } => {
                tracing::error!(
                    target: "sc.upstream",
                    stage = %stage,
                    room_name = ?orphan,
                    error = %reason,
                    "Publish flow failed"
                );
                room_name.clone_from(orphan);
                let message = match (stage, orphan) {
                    (PublishStage::Room, _) => "Failed to create room".to_string(),
                    (PublishStage::Ingress, Some(room)) => {
                        format!("Failed to create ingress; room '{room}' was created and left in place")
                    }
                    (PublishStage::Ingress, None) => "Failed to create ingress".to_string(),
                    (PublishStage::Token, _) => "Failed to issue access token".to_string(),
                };
                (StatusCode::INTERNAL_SERVER_ERROR, stage.error_code(), message)
            }
            ScError::ServiceUnavailable(reason) => {
                tracing::warn!(target: "sc.availability", reason = %reason, "Service unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Service temporarily unavailable".to_string(),
                )
            }
            ScError::Internal(err) => {
                tracing::error!(target: "sc.internal", error = %err, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
            room_name,
        };

        (status, Json(error_response)).into_response()
    }
}
