//! Application Startup
//!
//! Component wiring, background tasks and the UI bridge server.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tracing::{info, warn};

use crate::application::services::{
    spawn_status_poller, AlertSink, EventFeed, MediaSessionRegistry, MonitorEvent, PushRouter,
    StatusReconciler,
};
use crate::config::Settings;
use crate::domain::{ChannelStatus, PeerConnector, SeniorDirectory};
use crate::infrastructure::http::HttpSeniorDirectory;
use crate::infrastructure::realtime::{ChannelManager, TransportConnector, WebSocketConnector};
use crate::infrastructure::store::{create_store, DurableStore, JsonStore};
use crate::infrastructure::webrtc::WebRtcPeerConnector;
use crate::presentation::http::handlers::health::init_server_start;
use crate::presentation::http::routes;
use crate::presentation::middleware::{create_cors_layer, create_trace_layer};

/// Outside collaborators. Tests swap in fakes.
pub struct Components {
    pub store: Arc<dyn DurableStore>,
    pub directory: Arc<dyn SeniorDirectory>,
    pub transport: Arc<dyn TransportConnector>,
    pub peers: Arc<dyn PeerConnector>,
}

impl Components {
    /// Production collaborators built from settings.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            store: create_store(&settings.storage).await?,
            directory: Arc::new(HttpSeniorDirectory::new(&settings.backend)?),
            transport: Arc::new(WebSocketConnector::new(Duration::from_secs(
                settings.realtime.connect_timeout_secs,
            ))),
            peers: Arc::new(WebRtcPeerConnector::new(&settings.media)?),
        })
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub channel: Arc<ChannelManager>,
    pub reconciler: Arc<StatusReconciler>,
    pub alerts: Arc<AlertSink>,
    pub sessions: Arc<MediaSessionRegistry>,
    pub feed: EventFeed,
    pub store: JsonStore,
}

impl AppState {
    /// Wire the services together and restore persisted state.
    pub async fn assemble(settings: Settings, components: Components) -> Self {
        let settings = Arc::new(settings);
        let feed = EventFeed::new();
        let store = JsonStore::new(components.store);

        let channel = Arc::new(ChannelManager::new(
            components.transport,
            settings.realtime.clone(),
        ));
        let alerts = Arc::new(
            AlertSink::hydrate(store.clone(), settings.alerts.clone(), feed.clone()).await,
        );
        let reconciler = Arc::new(
            StatusReconciler::hydrate(
                components.directory,
                alerts.clone(),
                store.clone(),
                settings.status.clone(),
                feed.clone(),
            )
            .await,
        );
        let sessions = Arc::new(MediaSessionRegistry::new(
            channel.clone(),
            components.peers,
            settings.media.clone(),
            feed.clone(),
        ));

        Self {
            settings,
            channel,
            reconciler,
            alerts,
            sessions,
            feed,
            store,
        }
    }
}

/// Tasks that live as long as the application runs.
struct Background {
    _router: PushRouter,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for Background {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Publish every channel status change to UI listeners.
fn spawn_channel_bridge(mut status: watch::Receiver<ChannelStatus>, feed: EventFeed) -> JoinHandle<()> {
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = *status.borrow_and_update();
            feed.publish(MonitorEvent::ChannelChanged { status: current });
        }
    })
}

/// Attach the push router, connect, load the seniors and start polling.
async fn start_background(state: &AppState) -> Background {
    let router = PushRouter::attach(
        state.channel.clone(),
        state.reconciler.clone(),
        state.alerts.clone(),
    );
    let bridge = spawn_channel_bridge(state.channel.watch_status(), state.feed.clone());

    let backend = &state.settings.backend;
    if backend.access_token.trim().is_empty() {
        warn!("No access token configured, realtime channel stays disconnected");
    } else if let Err(e) = state
        .channel
        .connect(&backend.socket_url, &backend.access_token)
        .await
    {
        warn!(error = %e, "Realtime channel could not be started");
    }

    match state.reconciler.load_initial().await {
        Ok(count) => info!(count, "Senior list loaded"),
        Err(e) => warn!(error = %e, "Initial senior load failed, will retry on the next poll"),
    }

    let poller = spawn_status_poller(
        state.channel.clone(),
        state.reconciler.clone(),
        Duration::from_secs(state.settings.status.poll_interval_secs),
    );

    Background {
        _router: router,
        tasks: vec![bridge, poller],
    }
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
    state: AppState,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        let components = Components::from_settings(&settings).await?;
        Self::build_with(settings, components).await
    }

    /// Build the application around the given collaborators
    pub async fn build_with(settings: Settings, components: Components) -> Result<Self> {
        init_server_start();

        let addr = settings.server_addr();
        let cors = create_cors_layer(&settings.cors);
        let state = AppState::assemble(settings, components).await;

        // Build router with middleware
        let router = routes::create_router(state.clone()).layer(
            ServiceBuilder::new()
                .layer(create_trace_layer())
                .layer(cors),
        );

        let listener = TcpListener::bind(&addr).await?;
        info!("UI bridge listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            router,
            state,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run until Ctrl-C or SIGTERM
    pub async fn run_until_stopped(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `shutdown` resolves, then close sessions and the channel.
    pub async fn run_until(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let Self {
            listener,
            router,
            state,
        } = self;

        let background = start_background(&state).await;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down");
        state.sessions.close_all();
        state.channel.disconnect();
        drop(background);
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
