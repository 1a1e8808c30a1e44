//! Realtime Channel Manager
//!
//! Owns the single authenticated connection to the backend's event server.
//!
//! # Lifecycle
//! 1. `connect` opens a websocket-only transport (or reuses the live one)
//! 2. Engine `open` arrives, the client answers with a namespace connect
//!    carrying `{ "token": credential }`
//! 3. Namespace connect ack flips the status to connected and raises `connect`
//! 4. The server may ask `request_auth`, answered with `authenticate { jwt }`
//! 5. Server pings are answered; missing pings close the transport
//!
//! Every transport gets a generation number. Frames from a transport whose
//! generation is no longer current are never dispatched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::protocol::{frame, EnginePacket, SocketPacket};
use super::transport::{engine_url, TransportConnector, TransportLink};
use crate::config::RealtimeSettings;
use crate::domain::events::{client, local, server};
use crate::domain::{ChannelEvent, ChannelStatus, EventHandler, SignalingChannel, Subscription};
use crate::infrastructure::metrics;
use crate::shared::error::AppError;

struct LiveTransport {
    generation: u64,
    endpoint: String,
    credential: String,
    outbound: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

impl LiveTransport {
    fn is_alive(&self) -> bool {
        !self.task.is_finished() && !self.outbound.is_closed()
    }

    fn shutdown(self) {
        let _ = self.outbound.send(frame(&SocketPacket::disconnect()));
        let _ = self.outbound.send(EnginePacket::Close.encode());
        self.task.abort();
    }
}

/// State shared with transport tasks and subscription handles.
struct ChannelShared {
    handlers: RwLock<HashMap<String, Vec<(u64, EventHandler)>>>,
    next_handler_id: AtomicU64,
    generation: AtomicU64,
    live: Mutex<Option<LiveTransport>>,
    socket_id: Mutex<Option<String>>,
    status_tx: watch::Sender<ChannelStatus>,
}

impl ChannelShared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn set_status(&self, status: ChannelStatus) {
        let previous = self.status_tx.send_replace(status);
        if previous != status {
            tracing::info!(from = previous.as_str(), to = status.as_str(), "Realtime channel status changed");
            metrics::set_channel_connected(status == ChannelStatus::Connected);
        }
    }

    fn status(&self) -> ChannelStatus {
        *self.status_tx.borrow()
    }

    fn dispatch(&self, event: &ChannelEvent) {
        let handlers: Vec<EventHandler> = self
            .handlers
            .read()
            .get(&event.name)
            .map(|entries| entries.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        metrics::record_channel_event(&event.name, handlers.len());
        for handler in handlers {
            handler(event);
        }
    }

    fn remove_handler(&self, event: &str, id: u64) {
        let mut handlers = self.handlers.write();
        if let Some(entries) = handlers.get_mut(event) {
            entries.retain(|(handler_id, _)| *handler_id != id);
            if entries.is_empty() {
                handlers.remove(event);
            }
        }
    }

    fn send(&self, text: String) -> bool {
        match self.live.lock().as_ref() {
            Some(live) => live.outbound.send(text).is_ok(),
            None => false,
        }
    }

    /// Settle the status after a connect attempt lost its generation.
    ///
    /// A newer live transport owns the status; otherwise nothing is connecting.
    fn abandon_connect(&self) {
        if self.live.lock().is_some() {
            return;
        }
        self.socket_id.lock().take();
        self.set_status(ChannelStatus::Disconnected);
    }

    /// Called by a transport task when its socket is gone.
    fn transport_closed(&self, generation: u64, reason: &str) {
        let mut live = self.live.lock();
        if !matches!(live.as_ref(), Some(t) if t.generation == generation) {
            return;
        }
        // The finishing task owns itself, so the handle is dropped rather than aborted.
        live.take();
        drop(live);

        self.socket_id.lock().take();
        self.set_status(ChannelStatus::Disconnected);
        tracing::warn!(reason, "Realtime transport closed");
        self.dispatch(&ChannelEvent::new(local::DISCONNECT, vec![json!(reason)]));
    }
}

/// Process-wide realtime channel.
pub struct ChannelManager {
    connector: Arc<dyn TransportConnector>,
    settings: RealtimeSettings,
    shared: Arc<ChannelShared>,
    connect_lock: tokio::sync::Mutex<()>,
}

impl ChannelManager {
    pub fn new(connector: Arc<dyn TransportConnector>, settings: RealtimeSettings) -> Self {
        let (status_tx, _) = watch::channel(ChannelStatus::Disconnected);
        Self {
            connector,
            settings,
            shared: Arc::new(ChannelShared {
                handlers: RwLock::new(HashMap::new()),
                next_handler_id: AtomicU64::new(1),
                generation: AtomicU64::new(0),
                live: Mutex::new(None),
                socket_id: Mutex::new(None),
                status_tx,
            }),
            connect_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Connect, or keep the live connection when it already serves the same
    /// endpoint and credential.
    ///
    /// Only an empty credential or an unusable endpoint is an error. Network
    /// and auth failures flip the status and raise `connect_error`.
    pub async fn connect(&self, endpoint: &str, credential: &str) -> Result<(), AppError> {
        if credential.trim().is_empty() {
            return Err(AppError::Unauthorized(
                "a bearer credential is required to open the realtime channel".into(),
            ));
        }
        let url = engine_url(endpoint, &self.settings.path)?;

        let _guard = self.connect_lock.lock().await;

        {
            let live = self.shared.live.lock();
            if let Some(transport) = live.as_ref() {
                if transport.is_alive()
                    && transport.endpoint == endpoint
                    && transport.credential == credential
                    && self.shared.status() != ChannelStatus::Disconnected
                {
                    tracing::debug!("Realtime channel already live, reusing transport");
                    return Ok(());
                }
            }
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(previous) = self.shared.live.lock().take() {
            tracing::info!(generation = previous.generation, "Replacing realtime transport");
            previous.shutdown();
        }
        self.shared.socket_id.lock().take();
        self.shared.set_status(ChannelStatus::Connecting);

        let link = match self.connector.open(&url).await {
            Ok(link) => link,
            Err(e) => {
                if self.shared.is_current(generation) {
                    tracing::warn!(error = %e, "Realtime channel connection failed");
                    self.shared.set_status(ChannelStatus::Disconnected);
                    self.shared.dispatch(&ChannelEvent::new(
                        local::CONNECT_ERROR,
                        vec![json!({ "message": e.to_string() })],
                    ));
                } else {
                    self.shared.abandon_connect();
                }
                return Ok(());
            }
        };

        if !self.shared.is_current(generation) {
            tracing::debug!("Realtime channel torn down while connecting, dropping transport");
            self.shared.abandon_connect();
            return Ok(());
        }

        let TransportLink { outbound, inbound } = link;
        let task = tokio::spawn(run_transport(
            Arc::downgrade(&self.shared),
            generation,
            credential.to_string(),
            inbound,
            outbound.clone(),
            Duration::from_secs(self.settings.connect_timeout_secs),
        ));

        *self.shared.live.lock() = Some(LiveTransport {
            generation,
            endpoint: endpoint.to_string(),
            credential: credential.to_string(),
            outbound,
            task,
        });

        Ok(())
    }

    /// Tear down the live transport, or abandon a connect still in flight.
    /// No-op when already disconnected.
    pub fn disconnect(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        let previous = self.shared.live.lock().take();
        let Some(previous) = previous else {
            if self.shared.status() != ChannelStatus::Disconnected {
                tracing::info!("Pending realtime connection abandoned");
                self.shared.socket_id.lock().take();
                self.shared.set_status(ChannelStatus::Disconnected);
            }
            return;
        };

        previous.shutdown();
        self.shared.socket_id.lock().take();
        self.shared.set_status(ChannelStatus::Disconnected);
        tracing::info!("Realtime channel disconnected");
        self.shared.dispatch(&ChannelEvent::new(
            local::DISCONNECT,
            vec![json!("io client disconnect")],
        ));
    }

    /// Remove a handler registered with [`SignalingChannel::subscribe`].
    pub fn unsubscribe(&self, subscription: Subscription) {
        subscription.dispose();
    }

    pub fn is_connected(&self) -> bool {
        self.shared.status() == ChannelStatus::Connected
    }

    /// Socket id assigned by the server for the current connection.
    pub fn socket_id(&self) -> Option<String> {
        self.shared.socket_id.lock().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<ChannelStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Number of handlers registered for `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        self.shared
            .handlers
            .read()
            .get(event)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl SignalingChannel for ChannelManager {
    fn subscribe(&self, event: &str, handler: EventHandler) -> Subscription {
        let id = self.shared.next_handler_id.fetch_add(1, Ordering::SeqCst);
        self.shared
            .handlers
            .write()
            .entry(event.to_string())
            .or_default()
            .push((id, handler));

        let shared = Arc::downgrade(&self.shared);
        let name = event.to_string();
        Subscription::new(event, id, move || {
            if let Some(shared) = shared.upgrade() {
                shared.remove_handler(&name, id);
            }
        })
    }

    fn emit(&self, event: &str, args: Vec<Value>) -> bool {
        if self.shared.status() != ChannelStatus::Connected {
            tracing::debug!(event, "Realtime channel not connected, dropping emit");
            return false;
        }
        self.shared.send(frame(&SocketPacket::event(event, args, None)))
    }

    fn ack(&self, ack_id: u64, args: Vec<Value>) -> bool {
        if self.shared.status() != ChannelStatus::Connected {
            return false;
        }
        self.shared.send(frame(&SocketPacket::ack(ack_id, args)))
    }

    fn status(&self) -> ChannelStatus {
        self.shared.status()
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        if let Some(live) = self.shared.live.lock().take() {
            live.shutdown();
        }
    }
}

/// Protocol loop of one transport.
async fn run_transport(
    shared: Weak<ChannelShared>,
    generation: u64,
    credential: String,
    mut inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<String>,
    handshake_timeout: Duration,
) {
    let mut deadline = Instant::now() + handshake_timeout;
    let mut liveness = handshake_timeout;

    let reason = loop {
        let next = tokio::select! {
            next = inbound.recv() => next,
            _ = tokio::time::sleep_until(deadline) => break "ping timeout",
        };
        let Some(text) = next else {
            break "transport close";
        };
        let Some(channel) = shared.upgrade() else {
            return;
        };
        if !channel.is_current(generation) {
            return;
        }

        let packet = match EnginePacket::decode(&text) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable engine frame");
                continue;
            }
        };

        match packet {
            EnginePacket::Open(handshake) => {
                liveness = Duration::from_millis(handshake.ping_interval + handshake.ping_timeout);
                deadline = Instant::now() + liveness;
                tracing::debug!(engine_sid = %handshake.sid, "Engine handshake received");
                let auth = SocketPacket::connect(Some(json!({ "token": credential })));
                let _ = outbound.send(frame(&auth));
            }
            EnginePacket::Ping(data) => {
                deadline = Instant::now() + liveness;
                let _ = outbound.send(EnginePacket::Pong(data).encode());
            }
            EnginePacket::Close => break "transport close",
            EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {}
            EnginePacket::Message(body) => match SocketPacket::decode(&body) {
                Ok(SocketPacket::Connect { data, .. }) => {
                    let sid = data
                        .as_ref()
                        .and_then(|d| d.get("sid"))
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    *channel.socket_id.lock() = sid;
                    channel.set_status(ChannelStatus::Connected);
                    channel.dispatch(&ChannelEvent::new(local::CONNECT, Vec::new()));
                }
                Ok(SocketPacket::ConnectError { data, .. }) => {
                    tracing::warn!(?data, "Realtime channel rejected the connection");
                    channel.dispatch(&ChannelEvent::new(
                        local::CONNECT_ERROR,
                        data.into_iter().collect(),
                    ));
                    break "connect error";
                }
                Ok(SocketPacket::Disconnect { .. }) => break "io server disconnect",
                Ok(packet @ SocketPacket::Event { .. }) => {
                    let Some((name, args, ack_id)) = packet.into_event() else {
                        continue;
                    };
                    if name == server::REQUEST_AUTH {
                        let reply = SocketPacket::event(
                            client::AUTHENTICATE,
                            vec![json!({ "jwt": credential })],
                            None,
                        );
                        let _ = outbound.send(frame(&reply));
                    }
                    channel.dispatch(&ChannelEvent { name, args, ack_id });
                }
                Ok(SocketPacket::Ack { id, .. }) => {
                    tracing::debug!(ack_id = id, "Ignoring unsolicited ack");
                }
                Err(e) => tracing::warn!(error = %e, "Dropping undecodable socket packet"),
            },
        }
    };

    if let Some(shared) = shared.upgrade() {
        shared.transport_closed(generation, reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use reqwest::Url;

    const OPEN: &str = r#"0{"sid":"e1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;

    /// Server side of an in-memory transport.
    struct ServerEnd {
        to_client: mpsc::UnboundedSender<String>,
        from_client: mpsc::UnboundedReceiver<String>,
    }

    impl ServerEnd {
        fn send(&self, frame: &str) {
            self.to_client.send(frame.to_string()).unwrap();
        }

        async fn next(&mut self) -> String {
            self.from_client.recv().await.unwrap()
        }
    }

    struct MemoryConnector {
        ends: mpsc::UnboundedSender<ServerEnd>,
        opened: AtomicUsize,
    }

    #[async_trait]
    impl TransportConnector for MemoryConnector {
        async fn open(&self, _url: &Url) -> Result<TransportLink, AppError> {
            let (to_server, from_client) = mpsc::unbounded_channel();
            let (to_client, inbound) = mpsc::unbounded_channel();
            self.opened.fetch_add(1, Ordering::SeqCst);
            let _ = self.ends.send(ServerEnd {
                to_client,
                from_client,
            });
            Ok(TransportLink {
                outbound: to_server,
                inbound,
            })
        }
    }

    fn manager() -> (ChannelManager, Arc<MemoryConnector>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (ends, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(MemoryConnector {
            ends,
            opened: AtomicUsize::new(0),
        });
        let manager = ChannelManager::new(connector.clone(), RealtimeSettings::default());
        (manager, connector, rx)
    }

    async fn connected(
        manager: &ChannelManager,
        ends: &mut mpsc::UnboundedReceiver<ServerEnd>,
    ) -> ServerEnd {
        manager.connect("http://backend.test", "token-1").await.unwrap();
        let mut end = ends.recv().await.unwrap();
        end.send(OPEN);
        assert_eq!(end.next().await, r#"40{"token":"token-1"}"#);
        end.send(r#"40{"sid":"s1"}"#);

        let mut status = manager.watch_status();
        status
            .wait_for(|s| *s == ChannelStatus::Connected)
            .await
            .unwrap();
        end
    }

    fn counter(manager: &ChannelManager, event: &str) -> (Arc<AtomicUsize>, Subscription) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        let subscription = manager.subscribe(
            event,
            Arc::new(move |_: &ChannelEvent| {
                inner.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (count, subscription)
    }

    #[tokio::test]
    async fn test_connect_requires_credential_and_usable_endpoint() {
        let (manager, connector, _ends) = manager();

        assert!(matches!(
            manager.connect("http://backend.test", "  ").await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(manager.connect("ftp://backend.test", "token").await.is_err());
        assert_eq!(connector.opened.load(Ordering::SeqCst), 0);
        assert_eq!(manager.status(), ChannelStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_handshake_connects_and_raises_connect() {
        let (manager, _, mut ends) = manager();
        let (connects, _subscription) = counter(&manager, local::CONNECT);

        let _end = connected(&manager, &mut ends).await;

        assert!(manager.is_connected());
        assert_eq!(manager.socket_id().as_deref(), Some("s1"));
        assert_eq!(connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_same_credential_reuses_live_transport() {
        let (manager, connector, mut ends) = manager();
        let _end = connected(&manager, &mut ends).await;

        manager.connect("http://backend.test", "token-1").await.unwrap();
        assert_eq!(connector.opened.load(Ordering::SeqCst), 1);

        manager.connect("http://backend.test", "token-2").await.unwrap();
        assert_eq!(connector.opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_request_auth_is_answered_with_credential() {
        let (manager, _, mut ends) = manager();
        let mut end = connected(&manager, &mut ends).await;

        end.send(r#"42["request_auth"]"#);

        assert_eq!(end.next().await, r#"42["authenticate",{"jwt":"token-1"}]"#);
    }

    #[tokio::test]
    async fn test_ping_is_answered() {
        let (manager, _, mut ends) = manager();
        let mut end = connected(&manager, &mut ends).await;

        end.send("2");

        assert_eq!(end.next().await, "3");
    }

    #[tokio::test]
    async fn test_emit_only_while_connected() {
        let (manager, _, mut ends) = manager();
        assert!(!manager.emit(client::REQUEST_ALL_STATUS, Vec::new()));

        let mut end = connected(&manager, &mut ends).await;
        assert!(manager.emit(client::CHECK_OFFER, vec![json!(7)]));

        assert_eq!(end.next().await, r#"42["client:check_offer",7]"#);
    }

    #[tokio::test]
    async fn test_events_dispatch_with_ack_id() {
        let (manager, _, mut ends) = manager();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _subscription = manager.subscribe(
            server::REQUEST_SAFETY_CHECK,
            Arc::new(move |event: &ChannelEvent| sink.lock().push(event.clone())),
        );
        let mut end = connected(&manager, &mut ends).await;

        end.send(r#"425["server:request_safety_check",{"senior_id":1}]"#);
        end.send("2");
        assert_eq!(end.next().await, "3");

        let events = seen.lock().clone();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].ack_id, Some(5));
        assert_eq!(events[0].payload(), Some(&json!({ "senior_id": 1 })));

        assert!(manager.ack(5, vec![json!({ "status": "ok" })]));
        assert_eq!(end.next().await, r#"435[{"status":"ok"}]"#);
    }

    #[tokio::test]
    async fn test_transport_loss_disconnects() {
        let (manager, _, mut ends) = manager();
        let (disconnects, _subscription) = counter(&manager, local::DISCONNECT);
        let end = connected(&manager, &mut ends).await;

        drop(end);
        manager
            .watch_status()
            .wait_for(|s| *s == ChannelStatus::Disconnected)
            .await
            .unwrap();

        assert_eq!(manager.socket_id(), None);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connect_error_disconnects() {
        let (manager, _, mut ends) = manager();
        let (errors, _subscription) = counter(&manager, local::CONNECT_ERROR);

        manager.connect("http://backend.test", "expired").await.unwrap();
        let mut end = ends.recv().await.unwrap();
        end.send(OPEN);
        end.next().await;
        end.send(r#"44{"message":"Not authorized"}"#);

        manager
            .watch_status()
            .wait_for(|s| *s == ChannelStatus::Disconnected)
            .await
            .unwrap();
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (manager, _, mut ends) = manager();
        let (disconnects, _subscription) = counter(&manager, local::DISCONNECT);
        let _end = connected(&manager, &mut ends).await;

        manager.disconnect();
        manager.disconnect();

        assert_eq!(manager.status(), ChannelStatus::Disconnected);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    /// Connector whose `open` waits until the test releases it.
    struct GatedConnector {
        gate: tokio::sync::Notify,
    }

    #[async_trait]
    impl TransportConnector for GatedConnector {
        async fn open(&self, _url: &Url) -> Result<TransportLink, AppError> {
            self.gate.notified().await;
            let (outbound, _from_client) = mpsc::unbounded_channel();
            let (_to_client, inbound) = mpsc::unbounded_channel();
            Ok(TransportLink { outbound, inbound })
        }
    }

    #[tokio::test]
    async fn test_disconnect_abandons_pending_connect() {
        let connector = Arc::new(GatedConnector {
            gate: tokio::sync::Notify::new(),
        });
        let manager = Arc::new(ChannelManager::new(connector.clone(), RealtimeSettings::default()));

        let pending = tokio::spawn({
            let manager = manager.clone();
            async move { manager.connect("http://backend.test", "token-1").await }
        });
        manager
            .watch_status()
            .wait_for(|s| *s == ChannelStatus::Connecting)
            .await
            .unwrap();

        manager.disconnect();
        assert_eq!(manager.status(), ChannelStatus::Disconnected);

        connector.gate.notify_one();
        pending.await.unwrap().unwrap();

        assert_eq!(manager.status(), ChannelStatus::Disconnected);
        assert_eq!(manager.socket_id(), None);
        assert!(!manager.emit(client::CHECK_OFFER, vec![json!(1)]));
    }

    #[tokio::test]
    async fn test_dropped_subscription_stops_dispatch() {
        let (manager, _, _ends) = manager();
        let (_count, subscription) = counter(&manager, server::NEW_OFFER);
        let (_other, _kept) = counter(&manager, server::NEW_OFFER);
        assert_eq!(manager.handler_count(server::NEW_OFFER), 2);

        manager.unsubscribe(subscription);
        assert_eq!(manager.handler_count(server::NEW_OFFER), 1);
    }
}
