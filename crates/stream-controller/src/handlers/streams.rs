//! Stream handlers.
//!
//! - `POST /api/create_stream` - Publish flow, host token
//! - `POST /api/join_stream` - Join flow, viewer token
//! - `GET /api/streams` - List rooms
//! - `GET /api/streams/:id` - Room detail with participants
//! - `DELETE /api/streams/:id` - Delete room
//!
//! Tokens appear only in response bodies. They are never logged.

use crate::errors::ScError;
use crate::models::api::{
    ConnectionDetails, CreateStreamRequest, CreateStreamResponse, DeleteStreamResponse,
    GetStreamResponse, JoinStreamRequest, JoinStreamResponse, ListStreamsResponse,
};
use crate::routes::AppState;
use crate::services::sessions::PublishRequest;
use axum::extract::{Path, State};
use axum::Json;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Decode a JSON body, rejecting malformed input with 400 rather than 422.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ScError> {
    serde_json::from_slice(body).map_err(|e| {
        debug!(target: "sc.handlers", error = %e, "Invalid request body");
        ScError::BadRequest("Invalid request body".to_string())
    })
}

/// Handler for POST /api/create_stream
///
/// # Response
///
/// - 200 OK: room ready, host token issued
/// - 400 Bad Request: malformed body or missing `metadata.creator_identity`
/// - 409 Conflict: requested room name already in use
/// - 500 Internal Server Error: `ROOM_CREATE_FAILED` or `TOKEN_ISSUE_FAILED`
#[instrument(skip_all, name = "sc.stream.create")]
pub async fn create_stream(
    State(state): State<Arc<AppState>>,
    body: axum::body::Bytes,
) -> Result<Json<CreateStreamResponse>, ScError> {
    let request: CreateStreamRequest = parse_body(&body)?;

    let outcome = state
        .sessions
        .publish_detached(PublishRequest {
            room_name: request.room_name,
            metadata: request.metadata,
            ingress: None,
        })
        .await?;

    info!(target: "sc.handlers.streams", room = %outcome.room.name, "Stream created");

    Ok(Json(CreateStreamResponse {
        room_id: outcome.room.name,
        auth_token: outcome.auth_token,
        connection_details: ConnectionDetails {
            ws_url: outcome.ws_url,
            token: outcome.host_token,
        },
    }))
}

/// Handler for POST /api/join_stream
///
/// # Response
///
/// - 200 OK: viewer token issued
/// - 400 Bad Request: malformed body, blank identity or room
/// - 409 Conflict: identity already present in the room
#[instrument(skip_all, name = "sc.stream.join")]
pub async fn join_stream(
    State(state): State<Arc<AppState>>,
    body: axum::body::Bytes,
) -> Result<Json<JoinStreamResponse>, ScError> {
    let request: JoinStreamRequest = parse_body(&body)?;

    let outcome = state
        .sessions
        .join(&request.identity, &request.room_name)
        .await?;

    Ok(Json(JoinStreamResponse {
        auth_token: outcome.auth_token,
        connection_details: ConnectionDetails {
            ws_url: outcome.ws_url,
            token: outcome.token,
        },
    }))
}

/// Handler for GET /api/streams
#[instrument(skip_all, name = "sc.stream.list")]
pub async fn list_streams(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListStreamsResponse>, ScError> {
    let rooms = state.streams.list_streams().await?;
    let total = rooms.len();
    Ok(Json(ListStreamsResponse { rooms, total }))
}

/// Handler for GET /api/streams/:id
#[instrument(skip_all, name = "sc.stream.get", fields(room = %room_id))]
pub async fn get_stream(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<GetStreamResponse>, ScError> {
    Ok(Json(state.streams.get_stream(&room_id).await?))
}

/// Handler for DELETE /api/streams/:id
///
/// Ingresses bound to the room are left alone.
#[instrument(skip_all, name = "sc.stream.delete", fields(room = %room_id))]
pub async fn delete_stream(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<DeleteStreamResponse>, ScError> {
    state.rooms.delete(&room_id).await?;

    Ok(Json(DeleteStreamResponse {
        message: "Stream deleted".to_string(),
        room_id,
    }))
}
