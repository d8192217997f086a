//! HTTP middleware for the Stream Controller.

pub mod http_metrics;

pub use http_metrics::http_metrics_middleware;
