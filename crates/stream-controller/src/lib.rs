//! Stream Controller Service Library
//!
//! HTTP control plane for live streams on a LiveKit-compatible media server.
//! Provisions rooms and ingest endpoints, and issues participant tokens.
//!
//! # Modules
//!
//! - `auth` - Participant and control token signing
//! - `config` - Service configuration
//! - `errors` - Error types
//! - `handlers` - HTTP request handlers
//! - `models` - Media server and API data models
//! - `routes` - Router and application state
//! - `services` - Control client, lifecycle managers and flows

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
pub mod services;
