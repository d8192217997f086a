//! Service layer for the Stream Controller.
//!
//! # Components
//!
//! - `control_client` - media server control API client and its mock
//! - `rooms` - Room Lifecycle Manager
//! - `ingress` - Ingress Lifecycle Manager
//! - `sessions` - Session Orchestrator (publish and join flows)
//! - `streams` - read-only Query Façade

pub mod control_client;
pub mod ingress;
pub mod rooms;
pub mod sessions;
pub mod streams;

pub use control_client::{ControlClient, ControlPlane};
pub use ingress::IngressManager;
pub use rooms::RoomManager;
pub use sessions::SessionOrchestrator;
pub use streams::StreamQuery;
