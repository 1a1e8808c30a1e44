//! # Domain Entities
//!
//! Core types of the monitoring client.
//!
//! - **Senior**: monitored person, risk status and the directory port
//! - **Alert**: feed entries and emergency codes
//! - **Sensor**: canonical sensor readings and the payload classifier
//! - **Media**: live video negotiation types and the peer connection port
//! - **Realtime**: channel events, subscriptions and the signaling port

mod alert;
mod media;
mod realtime;
mod senior;
mod sensor;

pub use alert::{Alert, AlertCategory, EmergencyKind, NewAlert};
pub use media::{
    IceCandidate, PeerConnectionState, PeerConnector, PeerEvent, PeerEventSink, PeerLink,
    RemoteTrack, SdpKind, SessionDescription, SessionState,
};
pub use realtime::{
    ChannelEvent, ChannelStatus, EventHandler, SignalingChannel, Subscription, SubscriptionSet,
};
pub use senior::{HealthInfo, RiskStatus, Senior, SeniorDirectory, StatusSource};
#[cfg(test)]
pub use senior::MockSeniorDirectory;
pub use sensor::{SensorPayload, SensorPayloadError, SensorRecord, SensorSnapshot};
