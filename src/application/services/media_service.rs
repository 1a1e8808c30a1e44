//! Media Service
//!
//! One actor task per live viewing session. Channel handlers, peer callbacks
//! and timers only enqueue [`SessionCommand`]s, so session state is only ever
//! touched by the actor.
//!
//! ```text
//! Initializing -> AwaitingOffer -> Negotiating -> Connected
//!                      ^                |             |
//!                      +-- (error) -----+        peer failed
//!                      |                              v
//!                      +------- restart (5s + 2s) - Reconnecting
//! ```
//!
//! Every emitted offer request arms one retry timer. The timer and peer
//! callbacks carry the peer epoch, so anything raised by a replaced peer is
//! ignored.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};

use super::feed::{EventFeed, MonitorEvent};
use crate::config::MediaSettings;
use crate::domain::events::{client, local, server};
use crate::domain::{
    ChannelEvent, IceCandidate, PeerConnectionState, PeerConnector, PeerEvent, PeerEventSink,
    PeerLink, RemoteTrack, SessionDescription, SessionState, SignalingChannel, SubscriptionSet,
};
use crate::infrastructure::metrics;
use crate::shared::error::AppError;

/// Invoked with a human readable message whenever negotiation fails.
pub type ErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Observable state of one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub senior_id: i64,
    pub state: SessionState,
    pub peer_state: PeerConnectionState,
    /// Display string for the viewer
    pub status_text: String,
    /// First remote track, once negotiated
    pub stream: Option<RemoteTrack>,
    pub last_error: Option<String>,
    pub offer_retries: u32,
    pub reconnect_attempts: u32,
}

impl SessionSnapshot {
    fn new(senior_id: i64) -> Self {
        Self {
            senior_id,
            state: SessionState::Initializing,
            peer_state: PeerConnectionState::New,
            status_text: status_text(SessionState::Initializing, PeerConnectionState::New).into(),
            stream: None,
            last_error: None,
            offer_retries: 0,
            reconnect_attempts: 0,
        }
    }
}

fn status_text(state: SessionState, peer: PeerConnectionState) -> &'static str {
    match (state, peer) {
        (SessionState::Initializing, _) => "초기화 중",
        (SessionState::AwaitingOffer, _) => "영상 대기 중",
        (SessionState::Negotiating, _) => "연결 시도 중...",
        (SessionState::Connected, PeerConnectionState::Disconnected) => "연결 끊어짐",
        (SessionState::Connected, _) => "연결됨 - 스트리밍 중",
        (SessionState::Reconnecting, _) => "연결 실패 - 재시도 중...",
        (SessionState::Failed, _) => "연결 실패",
        (SessionState::Closed, _) => "연결 종료됨",
    }
}

#[derive(Debug)]
enum SessionCommand {
    Offer(Option<Value>),
    RemoteCandidate(Value),
    Peer { epoch: u64, event: PeerEvent },
    OfferRetryDue { epoch: u64, check: u64 },
    RestartDue { epoch: u64 },
    RequestOffer,
    ChannelConnected,
    Close,
}

/// Read a candidate relayed by the server.
fn candidate_from_wire(raw: &Value) -> Option<IceCandidate> {
    match raw {
        Value::Object(_) => serde_json::from_value(raw.clone()).ok(),
        Value::String(s) if s.trim_start().starts_with('{') => serde_json::from_str(s).ok(),
        Value::String(s) if !s.trim().is_empty() => Some(IceCandidate {
            candidate: s.trim().to_string(),
            sdp_mline_index: None,
            sdp_mid: None,
        }),
        _ => None,
    }
    .filter(|c: &IceCandidate| !c.candidate.is_empty())
}

/// Offers are broadcast to the viewer without a target; an explicit
/// `senior_id` that names another senior is not ours.
fn offer_targets(raw: Option<&Value>, senior_id: i64) -> bool {
    let Some(target) = raw.and_then(|v| v.get("senior_id")) else {
        return true;
    };
    match target {
        Value::Number(n) => n.as_i64() == Some(senior_id),
        Value::String(s) => s.trim().parse::<i64>().ok() == Some(senior_id),
        _ => true,
    }
}

struct SessionActor {
    senior_id: i64,
    channel: Arc<dyn SignalingChannel>,
    connector: Arc<dyn PeerConnector>,
    settings: MediaSettings,
    feed: EventFeed,
    on_error: Option<ErrorCallback>,
    commands: mpsc::WeakUnboundedSender<SessionCommand>,
    snapshot: Arc<watch::Sender<SessionSnapshot>>,
    closed: Arc<AtomicBool>,

    state: SessionState,
    peer: Option<Arc<dyn PeerLink>>,
    epoch: u64,
    offer_check: u64,
    remote_attempted: bool,
    remote_applied: bool,
    pending_candidates: Vec<IceCandidate>,
}

impl SessionActor {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn publish(&self, update: impl FnOnce(&mut SessionSnapshot)) {
        if self.is_closed() {
            return;
        }
        let state = self.state;
        self.snapshot.send_modify(|snapshot| {
            update(snapshot);
            snapshot.state = state;
            snapshot.status_text = status_text(state, snapshot.peer_state).into();
        });
        self.feed
            .publish(MonitorEvent::SessionChanged(self.snapshot.borrow().clone()));
    }

    fn transition(&mut self, next: SessionState) {
        if self.is_closed() || self.state == next {
            return;
        }
        debug!(senior_id = self.senior_id, from = self.state.as_str(), to = next.as_str(), "Session transition");
        self.state = next;
        metrics::record_session_transition(next.as_str());
        self.publish(|_| {});
    }

    fn report_error(&self, message: String) {
        warn!(senior_id = self.senior_id, error = %message, "Media session error");
        if let Some(callback) = &self.on_error {
            callback(&message);
        }
        self.publish(|snapshot| snapshot.last_error = Some(message));
    }

    fn schedule(&self, delay: std::time::Duration, command: SessionCommand) {
        let commands = self.commands.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(command);
            }
        });
    }

    fn peer_sink(&self, epoch: u64) -> PeerEventSink {
        let commands = self.commands.clone();
        Arc::new(move |event| {
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(SessionCommand::Peer { epoch, event });
            }
        })
    }

    async fn teardown_peer(&mut self) {
        self.epoch += 1;
        self.remote_attempted = false;
        self.remote_applied = false;
        self.pending_candidates.clear();
        if let Some(peer) = self.peer.take() {
            if let Err(e) = peer.close().await {
                debug!(senior_id = self.senior_id, error = %e, "Peer close failed");
            }
        }
    }

    async fn install_peer(&mut self) -> Result<(), AppError> {
        self.teardown_peer().await;
        let peer = self.connector.create(self.peer_sink(self.epoch)).await?;
        self.peer = Some(peer);
        self.publish(|snapshot| {
            snapshot.peer_state = PeerConnectionState::New;
            snapshot.stream = None;
        });
        Ok(())
    }

    async fn start(&mut self) {
        self.transition(SessionState::Initializing);
        if let Err(e) = self.install_peer().await {
            self.report_error(format!("피어 연결 생성 실패: {e}"));
            self.begin_reconnect().await;
            return;
        }
        self.transition(SessionState::AwaitingOffer);
        self.request_offer();
    }

    fn request_offer(&mut self) {
        if !self.channel.emit(client::CHECK_OFFER, vec![json!(self.senior_id)]) {
            debug!(senior_id = self.senior_id, "Channel down, offer request dropped");
        }
        self.arm_offer_retry();
    }

    fn arm_offer_retry(&mut self) {
        self.offer_check += 1;
        self.schedule(
            self.settings.offer_retry_delay(),
            SessionCommand::OfferRetryDue {
                epoch: self.epoch,
                check: self.offer_check,
            },
        );
    }

    async fn on_offer_retry_due(&mut self, epoch: u64, check: u64) {
        if epoch != self.epoch || check != self.offer_check || self.state != SessionState::AwaitingOffer {
            return;
        }
        let attempts = self.snapshot.borrow().offer_retries;
        if let Some(cap) = self.settings.offer_retry_cap() {
            if attempts >= cap {
                self.fail(format!("{attempts}회 재시도 후에도 Offer를 받지 못했습니다")).await;
                return;
            }
        }
        info!(senior_id = self.senior_id, attempt = attempts + 1, "No offer yet, requesting again");
        self.publish(|snapshot| snapshot.offer_retries += 1);
        self.request_offer();
    }

    #[instrument(skip(self, raw), fields(senior_id = self.senior_id))]
    async fn on_offer(&mut self, raw: Option<Value>) {
        if self.state.is_terminal() || !offer_targets(raw.as_ref(), self.senior_id) {
            return;
        }

        let offer = match SessionDescription::offer_from_wire(raw.as_ref()) {
            Ok(Some(offer)) => offer,
            Ok(None) => {
                if self.state == SessionState::AwaitingOffer {
                    debug!("Empty offer, retry scheduled");
                    self.arm_offer_retry();
                }
                return;
            }
            Err(e) => {
                self.report_error(format!("Offer 처리 오류: {e}"));
                return;
            }
        };

        // Cancels the pending retry.
        self.offer_check += 1;
        self.publish(|snapshot| snapshot.offer_retries = 0);

        if self.remote_attempted || self.peer.is_none() {
            info!(state = self.state.as_str(), "New offer, restarting negotiation");
            if let Err(e) = self.install_peer().await {
                self.report_error(format!("피어 연결 생성 실패: {e}"));
                self.begin_reconnect().await;
                return;
            }
        }

        self.transition(SessionState::Negotiating);
        if let Err(e) = self.negotiate(offer).await {
            self.report_error(format!("Offer 처리 오류: {e}"));
            self.transition(SessionState::AwaitingOffer);
        }
    }

    async fn negotiate(&mut self, offer: SessionDescription) -> Result<(), AppError> {
        let peer = self
            .peer
            .clone()
            .ok_or_else(|| AppError::Negotiation("no peer connection".into()))?;

        self.remote_attempted = true;
        peer.set_remote_description(&offer).await?;
        self.remote_applied = true;

        for candidate in std::mem::take(&mut self.pending_candidates) {
            if let Err(e) = peer.add_remote_candidate(candidate).await {
                debug!(error = %e, "Buffered candidate rejected");
            }
        }

        let answer = peer.create_answer().await?;
        let applied = peer.set_local_description(answer).await?;
        if self.is_closed() {
            return Ok(());
        }

        let payload = serde_json::to_value(&applied)?;
        if self
            .channel
            .emit(client::SEND_ANSWER, vec![json!(self.senior_id), payload])
        {
            info!(senior_id = self.senior_id, "Answer sent");
        } else {
            warn!(senior_id = self.senior_id, "Channel down, answer dropped");
        }
        Ok(())
    }

    async fn on_remote_candidate(&mut self, raw: Value) {
        if self.state.is_terminal() {
            return;
        }
        let Some(candidate) = candidate_from_wire(&raw) else {
            debug!(senior_id = self.senior_id, "Ignoring unreadable remote candidate");
            return;
        };
        if !self.remote_applied {
            self.pending_candidates.push(candidate);
            return;
        }
        if let Some(peer) = self.peer.clone() {
            if let Err(e) = peer.add_remote_candidate(candidate).await {
                debug!(senior_id = self.senior_id, error = %e, "Remote candidate rejected");
            }
        }
    }

    async fn on_peer_event(&mut self, epoch: u64, event: PeerEvent) {
        if epoch != self.epoch || self.state.is_terminal() {
            return;
        }
        match event {
            PeerEvent::LocalCandidate(candidate) => {
                let payload = match serde_json::to_value(&candidate) {
                    Ok(payload) => payload,
                    Err(e) => {
                        debug!(error = %e, "Unserializable local candidate");
                        return;
                    }
                };
                if !self
                    .channel
                    .emit(client::SEND_ICE_CANDIDATE, vec![json!(self.senior_id), payload])
                {
                    debug!(senior_id = self.senior_id, "Channel down, local candidate dropped");
                }
            }
            PeerEvent::GatheringComplete => {
                debug!(senior_id = self.senior_id, "Candidate gathering complete");
            }
            PeerEvent::Track(track) => {
                info!(senior_id = self.senior_id, kind = %track.kind, "Remote track received");
                self.publish(|snapshot| {
                    if snapshot.stream.is_none() {
                        snapshot.stream = Some(track);
                    }
                });
            }
            PeerEvent::StateChanged(peer_state) => {
                self.publish(|snapshot| snapshot.peer_state = peer_state);
                match peer_state {
                    PeerConnectionState::Connected
                        if matches!(self.state, SessionState::Negotiating | SessionState::AwaitingOffer) =>
                    {
                        info!(senior_id = self.senior_id, "Media session connected");
                        self.publish(|snapshot| snapshot.reconnect_attempts = 0);
                        self.transition(SessionState::Connected);
                    }
                    PeerConnectionState::Failed
                        if matches!(self.state, SessionState::Negotiating | SessionState::Connected) =>
                    {
                        warn!(senior_id = self.senior_id, "Peer connection failed, reconnecting");
                        self.begin_reconnect().await;
                    }
                    _ => {}
                }
            }
        }
    }

    async fn begin_reconnect(&mut self) {
        self.transition(SessionState::Reconnecting);
        self.teardown_peer().await;
        self.publish(|snapshot| snapshot.stream = None);

        let attempts = self.snapshot.borrow().reconnect_attempts;
        if let Some(cap) = self.settings.reconnect_cap() {
            if attempts >= cap {
                self.fail(format!("{attempts}회 재연결에 실패했습니다")).await;
                return;
            }
        }
        self.publish(|snapshot| snapshot.reconnect_attempts += 1);

        let commands = self.commands.clone();
        let (delay, settle) = (self.settings.reconnect_delay(), self.settings.reconnect_settle());
        let epoch = self.epoch;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::time::sleep(settle).await;
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(SessionCommand::RestartDue { epoch });
            }
        });
    }

    async fn fail(&mut self, reason: String) {
        self.report_error(reason);
        self.teardown_peer().await;
        self.transition(SessionState::Failed);
    }

    async fn shutdown(&mut self) {
        self.teardown_peer().await;
        self.state = SessionState::Closed;
        metrics::record_session_transition(SessionState::Closed.as_str());
        info!(senior_id = self.senior_id, "Media session closed");
    }

    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<SessionCommand>) {
        self.start().await;

        while let Some(command) = inbox.recv().await {
            if self.is_closed() {
                break;
            }
            match command {
                SessionCommand::Close => break,
                SessionCommand::Offer(raw) => self.on_offer(raw).await,
                SessionCommand::RemoteCandidate(raw) => self.on_remote_candidate(raw).await,
                SessionCommand::Peer { epoch, event } => self.on_peer_event(epoch, event).await,
                SessionCommand::OfferRetryDue { epoch, check } => {
                    self.on_offer_retry_due(epoch, check).await
                }
                SessionCommand::RestartDue { epoch } => {
                    if epoch == self.epoch && self.state == SessionState::Reconnecting {
                        self.start().await;
                    }
                }
                SessionCommand::RequestOffer | SessionCommand::ChannelConnected => {
                    if self.state == SessionState::AwaitingOffer {
                        self.request_offer();
                    }
                }
            }
        }

        self.shutdown().await;
    }
}

/// Caller side of a live viewing session.
///
/// Dropping the handle closes the session.
pub struct MediaSessionHandle {
    senior_id: i64,
    commands: mpsc::UnboundedSender<SessionCommand>,
    snapshot: Arc<watch::Sender<SessionSnapshot>>,
    subscriptions: parking_lot::Mutex<SubscriptionSet>,
    closed: Arc<AtomicBool>,
}

impl MediaSessionHandle {
    /// Start negotiating with the senior's device. Must be called inside a runtime.
    pub fn open(
        senior_id: i64,
        channel: Arc<dyn SignalingChannel>,
        connector: Arc<dyn PeerConnector>,
        settings: MediaSettings,
        feed: EventFeed,
        on_error: Option<ErrorCallback>,
    ) -> Self {
        let (commands, inbox) = mpsc::unbounded_channel();
        let snapshot = Arc::new(watch::Sender::new(SessionSnapshot::new(senior_id)));
        let closed = Arc::new(AtomicBool::new(false));

        let mut subscriptions = SubscriptionSet::new();
        let forward = |build: fn(&ChannelEvent) -> SessionCommand| {
            let commands = commands.clone();
            Arc::new(move |event: &ChannelEvent| {
                let _ = commands.send(build(event));
            })
        };
        subscriptions.push(channel.subscribe(
            server::NEW_OFFER,
            forward(|event| SessionCommand::Offer(event.payload().cloned())),
        ));
        subscriptions.push(channel.subscribe(
            server::NEW_ICE_CANDIDATE,
            forward(|event| SessionCommand::RemoteCandidate(event.payload().cloned().unwrap_or(Value::Null))),
        ));
        subscriptions.push(channel.subscribe(
            local::CONNECT,
            forward(|_| SessionCommand::ChannelConnected),
        ));

        let actor = SessionActor {
            senior_id,
            channel,
            connector,
            settings,
            feed,
            on_error,
            commands: commands.downgrade(),
            snapshot: snapshot.clone(),
            closed: closed.clone(),
            state: SessionState::Initializing,
            peer: None,
            epoch: 0,
            offer_check: 0,
            remote_attempted: false,
            remote_applied: false,
            pending_candidates: Vec::new(),
        };
        tokio::spawn(actor.run(inbox));
        metrics::record_session_transition(SessionState::Initializing.as_str());
        info!(senior_id, "Media session opened");

        Self {
            senior_id,
            commands,
            snapshot,
            subscriptions: parking_lot::Mutex::new(subscriptions),
            closed,
        }
    }

    pub fn senior_id(&self) -> i64 {
        self.senior_id
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    /// Ask the server for an offer again. Only acts while awaiting one.
    pub fn request_offer(&self) {
        let _ = self.commands.send(SessionCommand::RequestOffer);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Tear the session down. Every channel handler is gone when this returns;
    /// the peer connection is released by the actor right after.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.subscriptions.lock().dispose();
        self.snapshot.send_modify(|snapshot| {
            snapshot.state = SessionState::Closed;
            snapshot.status_text = status_text(SessionState::Closed, snapshot.peer_state).into();
            snapshot.stream = None;
        });
        let _ = self.commands.send(SessionCommand::Close);
    }
}

impl Drop for MediaSessionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Open sessions keyed by senior id.
pub struct MediaSessionRegistry {
    sessions: DashMap<i64, Arc<MediaSessionHandle>>,
    channel: Arc<dyn SignalingChannel>,
    connector: Arc<dyn PeerConnector>,
    settings: MediaSettings,
    feed: EventFeed,
}

impl MediaSessionRegistry {
    pub fn new(
        channel: Arc<dyn SignalingChannel>,
        connector: Arc<dyn PeerConnector>,
        settings: MediaSettings,
        feed: EventFeed,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            channel,
            connector,
            settings,
            feed,
        }
    }

    /// Open a session, or nudge the existing one if it is still alive.
    pub fn open(&self, senior_id: i64) -> SessionSnapshot {
        if let Some(existing) = self.sessions.get(&senior_id) {
            if !existing.snapshot().state.is_terminal() {
                existing.request_offer();
                return existing.snapshot();
            }
        }

        let handle = Arc::new(MediaSessionHandle::open(
            senior_id,
            self.channel.clone(),
            self.connector.clone(),
            self.settings.clone(),
            self.feed.clone(),
            None,
        ));
        let snapshot = handle.snapshot();
        if let Some(previous) = self.sessions.insert(senior_id, handle) {
            previous.close();
        }
        snapshot
    }

    pub fn snapshot(&self, senior_id: i64) -> Option<SessionSnapshot> {
        self.sessions.get(&senior_id).map(|handle| handle.snapshot())
    }

    /// Returns `false` when no session was open.
    pub fn close(&self, senior_id: i64) -> bool {
        match self.sessions.remove(&senior_id) {
            Some((_, handle)) => {
                handle.close();
                true
            }
            None => false,
        }
    }

    pub fn close_all(&self) {
        let ids: Vec<i64> = self.sessions.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.close(id);
        }
    }

    pub fn list(&self) -> Vec<SessionSnapshot> {
        self.sessions.iter().map(|entry| entry.snapshot()).collect()
    }
}
