//! WebSocket event feed for UI listeners.

mod handler;

pub use handler::ws_handler;
