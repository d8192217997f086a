//! HTTP metrics middleware.
//!
//! Applied as the outermost layer so it also sees responses produced before
//! a handler runs (unknown routes, wrong methods, timeouts).

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::observability::metrics::record_http_request;

/// Records method, normalized path, status and duration for every response.
pub async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    record_http_request(&method, &path, response.status().as_u16(), start.elapsed());

    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    async fn handler_200() -> &'static str {
        "OK"
    }

    async fn handler_409() -> (StatusCode, &'static str) {
        (StatusCode::CONFLICT, "taken")
    }

    fn test_app() -> Router {
        Router::new()
            .route("/api/streams", get(handler_200))
            .route("/api/join_stream", get(handler_409))
            .layer(middleware::from_fn(http_metrics_middleware))
    }

    async fn status_of(uri: &str) -> StatusCode {
        let request = HttpRequest::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .expect("request builder should succeed");

        test_app()
            .oneshot(request)
            .await
            .expect("request should succeed")
            .status()
    }

    #[tokio::test]
    async fn test_middleware_passes_responses_through() {
        assert_eq!(status_of("/api/streams").await, StatusCode::OK);
        assert_eq!(status_of("/api/join_stream").await, StatusCode::CONFLICT);
        assert_eq!(status_of("/nonexistent").await, StatusCode::NOT_FOUND);
    }
}
