//! HTTP surface of the UI bridge.

pub mod handlers;
pub mod routes;
