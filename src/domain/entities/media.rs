//! Live video session types and the peer connection port.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::shared::error::AppError;

/// Kind of a session description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// Session description as exchanged over the signaling channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }

    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    /// Read an offer pushed by the server.
    ///
    /// Returns `Ok(None)` for the "no offer yet" replies (null, empty string,
    /// empty object, empty sdp). Accepts an object, a JSON-encoded object or a
    /// bare SDP string.
    pub fn offer_from_wire(raw: Option<&Value>) -> Result<Option<Self>, AppError> {
        match raw {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Ok(None)
                } else if trimmed.starts_with('{') {
                    let parsed: Value = serde_json::from_str(trimmed)?;
                    Self::offer_from_wire(Some(&parsed))
                } else {
                    Ok(Some(Self::offer(trimmed)))
                }
            }
            Some(Value::Object(map)) if map.is_empty() => Ok(None),
            Some(Value::Object(map)) => {
                let sdp = map.get("sdp").and_then(Value::as_str).unwrap_or_default();
                if sdp.trim().is_empty() {
                    return Ok(None);
                }
                match map.get("type").and_then(Value::as_str) {
                    None | Some("offer") => Ok(Some(Self::offer(sdp))),
                    Some(other) => Err(AppError::Negotiation(format!(
                        "expected an offer, got {other}"
                    ))),
                }
            }
            Some(other) => Err(AppError::Negotiation(format!(
                "unsupported offer payload: {other}"
            ))),
        }
    }
}

/// Network path candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMLineIndex", alias = "sdp_mline_index", default)]
    pub sdp_mline_index: Option<u16>,
    #[serde(rename = "sdpMid", alias = "sdp_mid", default)]
    pub sdp_mid: Option<String>,
}

/// Peer transport state as reported by the media stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PeerConnectionState {
    #[default]
    New,
    Checking,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl PeerConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Checking => "checking",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }
}

/// Negotiator state for one viewing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Initializing,
    AwaitingOffer,
    Negotiating,
    Connected,
    Reconnecting,
    Failed,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::AwaitingOffer => "awaiting_offer",
            Self::Negotiating => "negotiating",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

/// Inbound media track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTrack {
    pub track_id: String,
    pub stream_id: String,
    pub kind: String,
}

/// Callback events raised by a peer connection.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    LocalCandidate(IceCandidate),
    GatheringComplete,
    StateChanged(PeerConnectionState),
    Track(RemoteTrack),
}

/// Receives [`PeerEvent`]s. Must not block.
pub type PeerEventSink = Arc<dyn Fn(PeerEvent) + Send + Sync>;

/// Creates peer connections.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn create(&self, events: PeerEventSink) -> Result<Arc<dyn PeerLink>, AppError>;
}

/// One peer connection in the answering role.
#[async_trait]
pub trait PeerLink: Send + Sync {
    async fn set_remote_description(&self, offer: &SessionDescription) -> Result<(), AppError>;

    async fn create_answer(&self) -> Result<SessionDescription, AppError>;

    /// Applies the answer and returns the description the stack settled on.
    async fn set_local_description(
        &self,
        answer: SessionDescription,
    ) -> Result<SessionDescription, AppError>;

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<(), AppError>;

    async fn close(&self) -> Result<(), AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_offers() {
        for raw in [Value::Null, json!(""), json!({}), json!({ "type": "offer", "sdp": "" })] {
            assert_eq!(SessionDescription::offer_from_wire(Some(&raw)).unwrap(), None);
        }
        assert_eq!(SessionDescription::offer_from_wire(None).unwrap(), None);
    }

    #[test]
    fn test_offer_object_and_encoded_string() {
        let object = json!({ "type": "offer", "sdp": "v=0\r\n" });
        let encoded = json!("{\"type\":\"offer\",\"sdp\":\"v=0\\r\\n\"}");

        let expected = Some(SessionDescription::offer("v=0\r\n"));
        assert_eq!(SessionDescription::offer_from_wire(Some(&object)).unwrap(), expected);
        assert_eq!(SessionDescription::offer_from_wire(Some(&encoded)).unwrap(), expected);
    }

    #[test]
    fn test_answer_is_not_an_offer() {
        let raw = json!({ "type": "answer", "sdp": "v=0" });
        assert!(SessionDescription::offer_from_wire(Some(&raw)).is_err());
    }

    #[test]
    fn test_candidate_wire_names() {
        let candidate = IceCandidate {
            candidate: "candidate:1 1 udp 2122260223 10.0.0.2 50000 typ host".into(),
            sdp_mline_index: Some(0),
            sdp_mid: Some("0".into()),
        };
        let value = serde_json::to_value(&candidate).unwrap();
        assert_eq!(value["sdpMLineIndex"], 0);
        assert_eq!(value["sdpMid"], "0");

        let from_hub: IceCandidate = serde_json::from_value(json!({
            "candidate": candidate.candidate,
            "sdp_mline_index": 0,
            "sdp_mid": "0"
        }))
        .unwrap();
        assert_eq!(from_hub, candidate);
    }

    #[test]
    fn test_answer_wire_shape() {
        let value = serde_json::to_value(SessionDescription::answer("v=0")).unwrap();
        assert_eq!(value, json!({ "type": "answer", "sdp": "v=0" }));
    }
}
