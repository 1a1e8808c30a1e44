//! Peer connections backed by the `webrtc` crate.
//!
//! The client only ever answers. Remote tracks are drained so the transport
//! keeps flowing, and their payload volume is exported as a metric.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

use crate::config::MediaSettings;
use crate::domain::{
    IceCandidate, PeerConnectionState, PeerConnector, PeerEvent, PeerEventSink, PeerLink,
    RemoteTrack, SdpKind, SessionDescription,
};
use crate::infrastructure::metrics;
use crate::shared::error::AppError;

/// Build the traversal server list from configuration.
pub fn ice_servers(settings: &MediaSettings) -> Vec<RTCIceServer> {
    let mut servers = Vec::new();
    if !settings.ice_servers.is_empty() {
        servers.push(RTCIceServer {
            urls: settings.ice_servers.clone(),
            ..Default::default()
        });
    }
    if let Some(turn) = &settings.turn {
        servers.push(RTCIceServer {
            urls: turn.urls.clone(),
            username: turn.username.clone(),
            credential: turn.credential.clone(),
            ..Default::default()
        });
    }
    servers
}

fn map_state(state: RTCPeerConnectionState) -> PeerConnectionState {
    match state {
        RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => PeerConnectionState::New,
        RTCPeerConnectionState::Connecting => PeerConnectionState::Checking,
        RTCPeerConnectionState::Connected => PeerConnectionState::Connected,
        RTCPeerConnectionState::Disconnected => PeerConnectionState::Disconnected,
        RTCPeerConnectionState::Failed => PeerConnectionState::Failed,
        RTCPeerConnectionState::Closed => PeerConnectionState::Closed,
    }
}

/// [`PeerConnector`] producing `webrtc` peer connections.
pub struct WebRtcPeerConnector {
    api: API,
    configuration: RTCConfiguration,
}

impl WebRtcPeerConnector {
    pub fn new(settings: &MediaSettings) -> Result<Self, AppError> {
        let mut media = MediaEngine::default();
        media.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media)?;

        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let configuration = RTCConfiguration {
            ice_servers: ice_servers(settings),
            bundle_policy: RTCBundlePolicy::MaxBundle,
            rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
            ice_candidate_pool_size: settings.ice_candidate_pool_size,
            ..Default::default()
        };

        Ok(Self { api, configuration })
    }
}

#[async_trait]
impl PeerConnector for WebRtcPeerConnector {
    async fn create(&self, events: PeerEventSink) -> Result<Arc<dyn PeerLink>, AppError> {
        let pc = Arc::new(
            self.api
                .new_peer_connection(self.configuration.clone())
                .await?,
        );

        let sink = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let sink = sink.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    sink(PeerEvent::GatheringComplete);
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => sink(PeerEvent::LocalCandidate(IceCandidate {
                        candidate: init.candidate,
                        sdp_mline_index: init.sdp_mline_index,
                        sdp_mid: init.sdp_mid,
                    })),
                    Err(e) => warn!(error = %e, "Dropping unserializable local candidate"),
                }
            })
        }));

        let sink = events.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let sink = sink.clone();
            Box::pin(async move {
                debug!(?state, "Peer connection state changed");
                sink(PeerEvent::StateChanged(map_state(state)));
            })
        }));

        let sink = events;
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let sink = sink.clone();
                Box::pin(async move {
                    let remote = RemoteTrack {
                        track_id: track.id(),
                        stream_id: track.stream_id(),
                        kind: track.kind().to_string(),
                    };
                    info!(track_id = %remote.track_id, kind = %remote.kind, "Remote track attached");
                    sink(PeerEvent::Track(remote.clone()));
                    tokio::spawn(drain_track(track, remote.kind));
                })
            },
        ));

        Ok(Arc::new(WebRtcPeerLink { pc }))
    }
}

async fn drain_track(track: Arc<TrackRemote>, kind: String) {
    while let Ok((packet, _)) = track.read_rtp().await {
        metrics::record_rtp_bytes(&kind, packet.payload.len());
    }
    debug!(kind = %kind, "Remote track ended");
}

pub struct WebRtcPeerLink {
    pc: Arc<RTCPeerConnection>,
}

fn to_native(description: &SessionDescription) -> Result<RTCSessionDescription, AppError> {
    let native = match description.kind {
        SdpKind::Offer => RTCSessionDescription::offer(description.sdp.clone())?,
        SdpKind::Answer => RTCSessionDescription::answer(description.sdp.clone())?,
        SdpKind::Pranswer => RTCSessionDescription::pranswer(description.sdp.clone())?,
        SdpKind::Rollback => {
            return Err(AppError::Negotiation("rollback is not supported".into()));
        }
    };
    Ok(native)
}

#[async_trait]
impl PeerLink for WebRtcPeerLink {
    async fn set_remote_description(&self, offer: &SessionDescription) -> Result<(), AppError> {
        self.pc.set_remote_description(to_native(offer)?).await?;
        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription, AppError> {
        let answer = self.pc.create_answer(None).await?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(
        &self,
        answer: SessionDescription,
    ) -> Result<SessionDescription, AppError> {
        self.pc.set_local_description(to_native(&answer)?).await?;
        Ok(self
            .pc
            .local_description()
            .await
            .map(|applied| SessionDescription::answer(applied.sdp))
            .unwrap_or(answer))
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<(), AppError> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), AppError> {
        self.pc.close().await?;
        Ok(())
    }
}
