//! Metrics definitions for the Stream Controller.
//!
//! All metrics follow Prometheus naming conventions:
//! - `sc_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: HTTP methods
//! - `endpoint`: the routes in `routes::build_routes`, parameters replaced
//! - `operation`: the seven control API methods
//! - `outcome`, `stage`: publish flow outcomes and the three failure stages
//! - `profile`: grant profile names from `GrantSet::profile_name`

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("sc_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.200, 0.300, 0.500, 1.000, 2.000, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Control calls are a network round trip to the media server
        .set_buckets_for_metric(
            Matcher::Prefix("sc_control_call".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set control call buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `sc_http_requests_total`, `sc_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
///
/// Covers framework-level responses too (400 on unreadable bodies, 404, 405).
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("sc_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("sc_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path to prevent label cardinality explosion.
///
/// Room names and ingress ids are replaced with placeholders.
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/health" | "/ready" | "/metrics" | "/getToken" | "/api/create_stream"
        | "/api/join_stream" | "/api/create_ingress" | "/api/streams" | "/api/ingress" => {
            path.to_string()
        }
        _ => normalize_dynamic_endpoint(path),
    }
}

fn normalize_dynamic_endpoint(path: &str) -> String {
    for (prefix, template) in [
        ("/api/streams/", "/api/streams/{id}"),
        ("/api/ingress/", "/api/ingress/{id}"),
    ] {
        if let Some(rest) = path.strip_prefix(prefix) {
            if !rest.is_empty() && !rest.contains('/') {
                return template.to_string();
            }
        }
    }

    // Unknown paths normalized to "/other" to bound cardinality
    "/other".to_string()
}

// ============================================================================
// Control API Metrics
// ============================================================================

/// Record a call to the media server control API.
///
/// Metric: `sc_control_call_duration_seconds`, `sc_control_calls_total`
/// Labels: `operation`, `status`
///
/// Operations: "CreateRoom", "ListRooms", "DeleteRoom", "ListParticipants",
/// "CreateIngress", "ListIngress", "DeleteIngress"
/// Status: "success", "not_found", "conflict", "error"
pub fn record_control_call(operation: &str, status: &str, duration: Duration) {
    histogram!("sc_control_call_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("sc_control_calls_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Session Metrics
// ============================================================================

/// Record a finished publish flow.
///
/// Metric: `sc_publish_flows_total`
/// Labels: `kind` ("stream" or "ingress"), `outcome` ("completed" or
/// "failed"), `stage` ("none", "room", "ingress", "token")
pub fn record_publish_flow(kind: &str, outcome: &str, stage: &str) {
    counter!("sc_publish_flows_total",
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string(),
        "stage" => stage.to_string()
    )
    .increment(1);
}

/// Record a join flow outcome.
///
/// Metric: `sc_join_flows_total`
/// Labels: `outcome` ("completed", "conflict", "error")
pub fn record_join_flow(outcome: &str) {
    counter!("sc_join_flows_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record an issued participant token.
///
/// Metric: `sc_tokens_issued_total`
/// Labels: `profile`
pub fn record_token_issued(profile: &str) {
    counter!("sc_tokens_issued_total",
        "profile" => profile.to_string()
    )
    .increment(1);
}

// ============================================================================
// Tests
// ============================================================================
