//! HTTP request handlers for the stream controller.

pub mod health;
pub mod ingress;
pub mod metrics;
pub mod streams;
pub mod token;

pub use health::{health_check, readiness_check};
pub use ingress::{create_ingress, delete_ingress, get_ingress, list_ingress};
pub use metrics::metrics_handler;
pub use streams::{create_stream, delete_stream, get_stream, join_stream, list_streams};
pub use token::get_token;
