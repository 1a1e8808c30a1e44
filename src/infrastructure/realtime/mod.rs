//! Realtime channel: Socket.IO framing, websocket transport and the manager.

mod channel;
pub mod protocol;
mod transport;

pub use channel::ChannelManager;
pub use transport::{engine_url, TransportConnector, TransportLink, WebSocketConnector};
