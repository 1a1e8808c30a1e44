//! Presentation Layer
//!
//! Local UI bridge: HTTP routes and the WebSocket event feed.

pub mod http;
pub mod middleware;
pub mod websocket;
