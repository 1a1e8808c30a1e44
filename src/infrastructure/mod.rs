//! Infrastructure Layer
//!
//! Contains implementations for external services including:
//! - Realtime channel over Socket.IO (WebSocket transport)
//! - Peer connections for live video (`webrtc`)
//! - Backend REST client (`reqwest`)
//! - Durable key/value store (memory, file or Redis)
//! - Prometheus metrics

pub mod http;
pub mod metrics;
pub mod realtime;
pub mod store;
pub mod webrtc;
