//! Ingress handlers.
//!
//! - `POST /api/create_ingress` - Publish flow with an RTMP or WHIP endpoint
//! - `GET /api/ingress` - List ingresses (no stream keys)
//! - `GET /api/ingress/:id` - Ingress detail (no stream key)
//! - `DELETE /api/ingress/:id` - Delete ingress

use super::streams::parse_body;
use crate::errors::ScError;
use crate::models::api::{
    ConnectionDetails, CreateIngressRequest, CreateIngressResponse, DeleteIngressResponse,
    IngressEndpoint, IngressView, ListIngressResponse,
};
use crate::models::IngressMode;
use crate::routes::AppState;
use crate::services::sessions::PublishRequest;
use axum::extract::{Path, State};
use axum::Json;
use common::secret::ExposeSecret;
use std::sync::Arc;
use tracing::{info, instrument};

/// Handler for POST /api/create_ingress
///
/// The stream key is returned here and nowhere else.
///
/// # Response
///
/// - 200 OK: room and ingress ready
/// - 400 Bad Request: malformed body, unknown `ingress_type`, missing creator
/// - 409 Conflict: requested room name already in use
/// - 500 Internal Server Error: `ROOM_CREATE_FAILED`, or
///   `INGRESS_CREATE_FAILED` with the `room_name` left behind
#[instrument(skip_all, name = "sc.ingress.create", fields(mode = tracing::field::Empty))]
pub async fn create_ingress(
    State(state): State<Arc<AppState>>,
    body: axum::body::Bytes,
) -> Result<Json<CreateIngressResponse>, ScError> {
    let request: CreateIngressRequest = parse_body(&body)?;
    let mode = IngressMode::parse(request.ingress_type.as_deref())?;
    tracing::Span::current().record("mode", mode.as_str());

    let outcome = state
        .sessions
        .publish_detached(PublishRequest {
            room_name: request.room_name,
            metadata: request.metadata,
            ingress: Some(mode),
        })
        .await?;

    let ingress = outcome.ingress.ok_or_else(|| {
        ScError::Internal("Publish flow completed without an ingress".to_string())
    })?;
    let stream_key = ingress
        .stream_key
        .as_ref()
        .map(|key| key.expose_secret().to_string())
        .ok_or_else(|| ScError::Internal("Ingress carries no stream key".to_string()))?;

    info!(
        target: "sc.handlers.ingress",
        room = %outcome.room.name,
        ingress_id = %ingress.ingress_id,
        "Ingress provisioned"
    );

    Ok(Json(CreateIngressResponse {
        ingress: IngressEndpoint {
            url: ingress.url,
            stream_key,
            room_name: outcome.room.name,
        },
        auth_token: outcome.auth_token,
        connection_details: ConnectionDetails {
            ws_url: outcome.ws_url,
            token: outcome.host_token,
        },
    }))
}

/// Handler for GET /api/ingress
#[instrument(skip_all, name = "sc.ingress.list")]
pub async fn list_ingress(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListIngressResponse>, ScError> {
    let ingresses: Vec<IngressView> = state
        .ingress
        .list()
        .await?
        .iter()
        .map(IngressView::from)
        .collect();
    let total = ingresses.len();
    Ok(Json(ListIngressResponse { ingresses, total }))
}

/// Handler for GET /api/ingress/:id
#[instrument(skip_all, name = "sc.ingress.get", fields(ingress_id = %ingress_id))]
pub async fn get_ingress(
    State(state): State<Arc<AppState>>,
    Path(ingress_id): Path<String>,
) -> Result<Json<IngressView>, ScError> {
    let ingress = state.ingress.get(&ingress_id).await?;
    Ok(Json(IngressView::from(&ingress)))
}

/// Handler for DELETE /api/ingress/:id
#[instrument(skip_all, name = "sc.ingress.delete", fields(ingress_id = %ingress_id))]
pub async fn delete_ingress(
    State(state): State<Arc<AppState>>,
    Path(ingress_id): Path<String>,
) -> Result<Json<DeleteIngressResponse>, ScError> {
    state.ingress.delete(&ingress_id).await?;

    Ok(Json(DeleteIngressResponse {
        message: "Ingress deleted".to_string(),
        ingress_id,
    }))
}
