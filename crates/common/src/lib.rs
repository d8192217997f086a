//! Common utilities and types shared across the stream controller crates.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for access token claims and grant profiles
pub mod jwt;
