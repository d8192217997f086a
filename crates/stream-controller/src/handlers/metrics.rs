//! Prometheus scrape endpoint.

use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics
///
/// Unauthenticated, like the health probes. Label values are bounded by the
/// endpoint normalization in `observability::metrics`.
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
