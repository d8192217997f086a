//! # SC Test Utilities
//!
//! Shared test utilities for the Stream Controller service.
//!
//! This crate provides:
//! - Server test harness (`TestStreamServer` for E2E tests)
//! - Media server fixtures (Twirp JSON bodies and wiremock mounts)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sc_test_utils::*;
//! use stream_controller::services::control_client::mock::MockControlPlane;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let server = TestStreamServer::spawn(MockControlPlane::new()).await?;
//!
//!     let response = reqwest::get(format!("{}/health", server.url())).await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod server_harness;

pub use fixtures::*;
pub use server_harness::*;
