//! HTTP routes for the stream controller.
//!
//! Defines the Axum router and application state.

use crate::auth::token::TokenIssuer;
use crate::config::Config;
use crate::handlers;
use crate::middleware::http_metrics_middleware;
use crate::services::{ControlPlane, IngressManager, RoomManager, SessionOrchestrator, StreamQuery};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Signs participant and control tokens.
    pub issuer: Arc<TokenIssuer>,

    /// Media server control API.
    pub control: Arc<dyn ControlPlane>,

    pub rooms: RoomManager,
    pub ingress: IngressManager,
    pub sessions: SessionOrchestrator,
    pub streams: StreamQuery,
}

impl AppState {
    /// Wire the managers over one control plane.
    pub fn new(config: &Config, issuer: Arc<TokenIssuer>, control: Arc<dyn ControlPlane>) -> Self {
        let rooms = RoomManager::new(control.clone(), config.room_conflict_policy);
        let ingress = IngressManager::new(control.clone());
        let sessions = SessionOrchestrator::new(
            rooms.clone(),
            ingress.clone(),
            issuer.clone(),
            config.ws_url.clone(),
            config.viewer_can_publish,
        );
        let streams = StreamQuery::new(rooms.clone());

        Self {
            issuer,
            control,
            rooms,
            ingress,
            sessions,
            streams,
        }
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health`, `/ready` - probes
/// - `/metrics` - Prometheus scrape endpoint
/// - `/api/create_stream`, `/api/join_stream` - publish and join flows
/// - `/api/streams[/:id]` - room queries and deletion
/// - `/api/create_ingress`, `/api/ingress[/:id]` - ingress flows
/// - `/getToken` - raw room-join token
/// - TraceLayer, HTTP metrics middleware, 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/api/create_stream", post(handlers::create_stream))
        .route("/api/join_stream", post(handlers::join_stream))
        .route("/api/streams", get(handlers::list_streams))
        .route(
            "/api/streams/:id",
            get(handlers::get_stream).delete(handlers::delete_stream),
        )
        .route("/api/create_ingress", post(handlers::create_ingress))
        .route("/api/ingress", get(handlers::list_ingress))
        .route(
            "/api/ingress/:id",
            get(handlers::get_ingress).delete(handlers::delete_ingress),
        )
        .route("/getToken", get(handlers::get_token))
        .with_state(state);

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer (innermost)
    // 2. TraceLayer
    // 3. http_metrics_middleware (outermost, sees framework-level 404/405 too)
    api_routes
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}
