//! HTTP Handlers
//!
//! Request handlers for all UI bridge endpoints.

pub mod alerts;
pub mod channel;
pub mod health;
pub mod seniors;
pub mod sessions;
