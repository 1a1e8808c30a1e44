//! # Domain Layer
//!
//! Entities, wire vocabulary and the ports the rest of the crate depends on.
//! Nothing here knows about sockets, HTTP or storage backends.
//!
//! ## Structure
//!
//! - **entities**: seniors, alerts, sensor readings, media and channel types
//! - **events**: event names used on the realtime channel

pub mod entities;
pub mod events;

// Re-export commonly used types
pub use entities::*;
