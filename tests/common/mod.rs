//! Common Test Utilities
//!
//! Shared fakes and the test application. The realtime channel runs for real
//! over an in-memory transport whose server side is driven by the test.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum_test::TestServer;
use fake::faker::address::en::CityName;
use fake::faker::name::en::Name;
use fake::Fake;
use parking_lot::Mutex;
use reqwest::Url;
use serde_json::Value;
use tokio::sync::mpsc;

use senior_safe::application::services::PushRouter;
use senior_safe::config::Settings;
use senior_safe::domain::{
    HealthInfo, IceCandidate, PeerConnector, PeerEvent, PeerEventSink, PeerLink, Senior,
    SeniorDirectory, SessionDescription,
};
use senior_safe::infrastructure::realtime::{TransportConnector, TransportLink};
use senior_safe::infrastructure::store::MemoryStore;
use senior_safe::presentation::http::routes::create_router;
use senior_safe::shared::error::AppError;
use senior_safe::startup::{AppState, Components};

pub const TOKEN: &str = "test-token";
pub const BACKEND: &str = "http://backend.test";

const OPEN: &str = r#"0{"sid":"engine-1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Senior with a generated name and address.
pub fn senior(id: i64, health_info: HealthInfo) -> Senior {
    let mut senior = Senior::new(id, Name().fake::<String>(), health_info);
    senior.address = CityName().fake();
    senior
}

/// In-memory backend directory.
#[derive(Default)]
pub struct FakeDirectory {
    pub seniors: Mutex<Vec<Senior>>,
    pub refuse_delete: Mutex<bool>,
}

impl FakeDirectory {
    pub fn with(seniors: Vec<Senior>) -> Self {
        Self {
            seniors: Mutex::new(seniors),
            refuse_delete: Mutex::new(false),
        }
    }
}

#[async_trait]
impl SeniorDirectory for FakeDirectory {
    async fn list_seniors(&self) -> Result<Vec<Senior>, AppError> {
        Ok(self.seniors.lock().clone())
    }

    async fn get_senior(&self, id: i64) -> Result<Option<Senior>, AppError> {
        Ok(self.seniors.lock().iter().find(|s| s.id == id).cloned())
    }

    async fn delete_senior(&self, id: i64) -> Result<bool, AppError> {
        if *self.refuse_delete.lock() {
            return Ok(false);
        }
        let mut seniors = self.seniors.lock();
        let before = seniors.len();
        seniors.retain(|s| s.id != id);
        Ok(seniors.len() != before)
    }

    async fn profile_image(&self, id: i64) -> Result<Vec<u8>, AppError> {
        if self.seniors.lock().iter().any(|s| s.id == id) {
            Ok(vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A])
        } else {
            Err(AppError::NotFound(format!("Senior {id}")))
        }
    }
}

/// Server side of one in-memory transport.
pub struct ServerEnd {
    to_client: mpsc::UnboundedSender<String>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    pub fn send(&self, frame: &str) {
        let _ = self.to_client.send(frame.to_string());
    }

    /// Push a server event.
    pub fn push(&self, event: &str, args: Vec<Value>) {
        let mut body = vec![Value::String(event.to_string())];
        body.extend(args);
        self.send(&format!("42{}", Value::Array(body)));
    }

    pub async fn next_frame(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(2), self.from_client.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next client event, skipping pongs and other control frames.
    pub async fn next_event(&mut self) -> Option<(String, Vec<Value>)> {
        while let Some(frame) = self.next_frame().await {
            let Some(body) = frame.strip_prefix("42") else {
                continue;
            };
            let Ok(Value::Array(mut items)) = serde_json::from_str::<Value>(body) else {
                continue;
            };
            if items.is_empty() {
                continue;
            }
            let name = items.remove(0).as_str().unwrap_or_default().to_string();
            return Some((name, items));
        }
        None
    }

    /// Next client event with the given name.
    pub async fn expect_event(&mut self, name: &str) -> Vec<Value> {
        while let Some((event, args)) = self.next_event().await {
            if event == name {
                return args;
            }
        }
        panic!("client never sent {name}");
    }
}

/// Transport connector whose sockets end in the test.
pub struct MemoryTransport {
    ends: mpsc::UnboundedSender<ServerEnd>,
    pub opened: Mutex<Vec<Url>>,
}

impl MemoryTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (ends, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                ends,
                opened: Mutex::new(Vec::new()),
            }),
            rx,
        )
    }
}

#[async_trait]
impl TransportConnector for MemoryTransport {
    async fn open(&self, url: &Url) -> Result<TransportLink, AppError> {
        let (outbound, from_client) = mpsc::unbounded_channel();
        let (to_client, inbound) = mpsc::unbounded_channel();
        self.opened.lock().push(url.clone());
        let _ = self.ends.send(ServerEnd {
            to_client,
            from_client,
        });
        Ok(TransportLink { outbound, inbound })
    }
}

/// Peer that answers every offer.
pub struct FakePeer {
    pub remote: Mutex<Option<SessionDescription>>,
    pub candidates: Mutex<Vec<IceCandidate>>,
    pub events: PeerEventSink,
}

#[async_trait]
impl PeerLink for FakePeer {
    async fn set_remote_description(&self, offer: &SessionDescription) -> Result<(), AppError> {
        *self.remote.lock() = Some(offer.clone());
        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription, AppError> {
        Ok(SessionDescription::answer("v=0 answer"))
    }

    async fn set_local_description(
        &self,
        answer: SessionDescription,
    ) -> Result<SessionDescription, AppError> {
        Ok(answer)
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<(), AppError> {
        self.candidates.lock().push(candidate);
        Ok(())
    }

    async fn close(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePeers {
    pub created: Mutex<Vec<Arc<FakePeer>>>,
}

impl FakePeers {
    pub fn latest(&self) -> Option<Arc<FakePeer>> {
        self.created.lock().last().cloned()
    }

    /// Raise a peer event on the newest peer.
    pub fn raise(&self, event: PeerEvent) {
        if let Some(peer) = self.latest() {
            (peer.events)(event);
        }
    }
}

#[async_trait]
impl PeerConnector for FakePeers {
    async fn create(&self, events: PeerEventSink) -> Result<Arc<dyn PeerLink>, AppError> {
        let peer = Arc::new(FakePeer {
            remote: Mutex::new(None),
            candidates: Mutex::new(Vec::new()),
            events,
        });
        self.created.lock().push(peer.clone());
        Ok(peer)
    }
}

pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.backend.socket_url = BACKEND.into();
    settings.backend.access_token = TOKEN.into();
    settings
}

/// Test application: real services, fake backend, in-memory transport.
pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub directory: Arc<FakeDirectory>,
    pub transport: Arc<MemoryTransport>,
    pub peers: Arc<FakePeers>,
    ends: mpsc::UnboundedReceiver<ServerEnd>,
    _router: PushRouter,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_seniors(Vec::new()).await
    }

    /// Application whose backend knows `seniors`, loaded once.
    pub async fn with_seniors(seniors: Vec<Senior>) -> Self {
        let directory = Arc::new(FakeDirectory::with(seniors));
        let (transport, ends) = MemoryTransport::new();
        let peers = Arc::new(FakePeers::default());

        let state = AppState::assemble(
            test_settings(),
            Components {
                store: Arc::new(MemoryStore::new()),
                directory: directory.clone(),
                transport: transport.clone(),
                peers: peers.clone(),
            },
        )
        .await;
        state
            .reconciler
            .load_initial()
            .await
            .expect("initial load");

        let router = PushRouter::attach(
            state.channel.clone(),
            state.reconciler.clone(),
            state.alerts.clone(),
        );
        let server = TestServer::new(create_router(state.clone())).expect("test server");

        Self {
            server,
            state,
            directory,
            transport,
            peers,
            ends,
            _router: router,
        }
    }

    /// Connect the realtime channel and complete the handshake.
    pub async fn connect(&mut self) -> ServerEnd {
        self.state
            .channel
            .connect(BACKEND, TOKEN)
            .await
            .expect("connect");
        self.accept().await
    }

    /// Complete the handshake on the next transport the channel opened.
    pub async fn accept(&mut self) -> ServerEnd {
        let mut end = tokio::time::timeout(Duration::from_secs(2), self.ends.recv())
            .await
            .expect("no transport opened")
            .expect("transport opened");
        end.send(OPEN);
        let auth = end.next_frame().await.expect("namespace connect");
        assert_eq!(auth, format!(r#"40{{"token":"{TOKEN}"}}"#));
        end.send(r#"40{"sid":"socket-1"}"#);

        let mut status = self.state.channel.watch_status();
        tokio::time::timeout(
            Duration::from_secs(2),
            status.wait_for(|s| s.as_str() == "connected"),
        )
        .await
        .expect("handshake timed out")
        .expect("channel dropped");
        end
    }
}
