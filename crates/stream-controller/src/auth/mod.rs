//! Access token issuance.

pub mod token;
