//! Application settings and configuration structures.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Default values shared by the config builder and the `Default` impls.
pub mod defaults {
    pub const SERVER_HOST: &str = "127.0.0.1";
    pub const SERVER_PORT: u16 = 8787;

    pub const API_BASE_URL: &str = "http://localhost:8000/api";
    pub const SOCKET_URL: &str = "http://localhost:8000";
    pub const REQUEST_TIMEOUT_SECS: u64 = 5;

    pub const SOCKET_PATH: &str = "/socket.io/";
    pub const CONNECT_TIMEOUT_SECS: u64 = 10;

    pub const STUN_SERVERS: [&str; 5] = [
        "stun:stun.l.google.com:19302",
        "stun:stun1.l.google.com:19302",
        "stun:stun2.l.google.com:19302",
        "stun:stun3.l.google.com:19302",
        "stun:stun4.l.google.com:19302",
    ];
    pub const OFFER_RETRY_DELAY_SECS: u64 = 10;
    pub const MAX_OFFER_RETRIES: u32 = 6;
    pub const RECONNECT_DELAY_SECS: u64 = 5;
    pub const RECONNECT_SETTLE_SECS: u64 = 2;
    pub const MAX_RECONNECT_ATTEMPTS: u32 = 6;
    pub const ICE_CANDIDATE_POOL_SIZE: u8 = 10;

    pub const POLL_INTERVAL_SECS: u64 = 30;

    pub const ALERT_CAPACITY: usize = 50;
    pub const ALERT_DEDUP_WINDOW_SECS: u64 = 5;

    pub const STORAGE_BACKEND: &str = "file";
    pub const STORAGE_PATH: &str = "data";
    pub const STORAGE_KEY_PREFIX: &str = "sst:";

    pub const CORS_MAX_AGE_SECS: u64 = 600;
}

/// Root configuration structure containing all application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Local UI bridge binding
    pub server: ServerSettings,

    /// Backend REST API and credential
    pub backend: BackendSettings,

    /// Realtime channel transport
    pub realtime: RealtimeSettings,

    /// Live video negotiation policy
    pub media: MediaSettings,

    /// Status reconciliation policy
    pub status: StatusSettings,

    /// Alert feed policy
    pub alerts: AlertSettings,

    /// Durable store selection
    pub storage: StorageSettings,

    /// CORS configuration for the UI bridge
    pub cors: CorsSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Local UI bridge binding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Backend endpoints and the caregiver's bearer credential.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendSettings {
    /// Base URL of the REST API, e.g. `https://host/api`
    pub api_base_url: String,

    /// Origin of the realtime endpoint, e.g. `https://host`
    pub socket_url: String,

    /// Bearer token issued at login. The channel refuses to connect without one.
    #[serde(default)]
    pub access_token: String,

    pub request_timeout_secs: u64,
}

/// Realtime transport configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeSettings {
    /// Engine path on the server, normally `/socket.io/`
    pub path: String,

    pub connect_timeout_secs: u64,
}

/// Relay server that requires credentials.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TurnSettings {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}

/// Live video negotiation configuration.
///
/// A retry cap of `0` means the loop never gives up.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaSettings {
    /// Reflection servers used for network traversal
    pub ice_servers: Vec<String>,

    /// Optional relay server
    #[serde(default)]
    pub turn: Option<TurnSettings>,

    pub offer_retry_delay_secs: u64,
    pub max_offer_retries: u32,
    pub reconnect_delay_secs: u64,
    pub reconnect_settle_secs: u64,
    pub max_reconnect_attempts: u32,
    pub ice_candidate_pool_size: u8,
}

/// Status reconciliation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusSettings {
    /// How often the full status list is re-requested
    pub poll_interval_secs: u64,

    /// Age after which a persisted override stops winning. Unset keeps overrides forever.
    #[serde(default)]
    pub override_ttl_secs: Option<u64>,

    /// Drop every persisted override on each bulk reload
    pub clear_overrides_on_refresh: bool,
}

/// Alert feed configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertSettings {
    /// Number of alerts kept in the persisted feed
    pub capacity: usize,

    /// Window in which identical alerts are suppressed
    pub dedup_window_secs: u64,
}

/// Durable store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// `memory`, `file` or `redis`
    pub backend: String,

    /// Directory used by the file backend
    pub path: String,

    #[serde(default)]
    pub redis_url: Option<String>,

    pub key_prefix: String,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CorsSettings {
    /// Allowed origins (comma-separated in env). Empty allows any origin.
    pub allowed_origins: Vec<String>,

    /// Preflight cache lifetime for the listed origins
    pub max_age_secs: u64,
}

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. built-in defaults
    /// 2. config/default.toml (base configuration)
    /// 3. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 4. Environment variables (highest priority)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed,
    /// or if a value fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        Config::builder()
            .set_default("environment", environment.clone())?
            .set_default("server.host", defaults::SERVER_HOST)?
            .set_default("server.port", defaults::SERVER_PORT)?
            .set_default("backend.api_base_url", defaults::API_BASE_URL)?
            .set_default("backend.socket_url", defaults::SOCKET_URL)?
            .set_default("backend.access_token", "")?
            .set_default("backend.request_timeout_secs", defaults::REQUEST_TIMEOUT_SECS)?
            .set_default("realtime.path", defaults::SOCKET_PATH)?
            .set_default("realtime.connect_timeout_secs", defaults::CONNECT_TIMEOUT_SECS)?
            .set_default("media.ice_servers", defaults::STUN_SERVERS.to_vec())?
            .set_default("media.offer_retry_delay_secs", defaults::OFFER_RETRY_DELAY_SECS)?
            .set_default("media.max_offer_retries", defaults::MAX_OFFER_RETRIES)?
            .set_default("media.reconnect_delay_secs", defaults::RECONNECT_DELAY_SECS)?
            .set_default("media.reconnect_settle_secs", defaults::RECONNECT_SETTLE_SECS)?
            .set_default("media.max_reconnect_attempts", defaults::MAX_RECONNECT_ATTEMPTS)?
            .set_default("media.ice_candidate_pool_size", defaults::ICE_CANDIDATE_POOL_SIZE)?
            .set_default("status.poll_interval_secs", defaults::POLL_INTERVAL_SECS)?
            .set_default("status.clear_overrides_on_refresh", false)?
            .set_default("alerts.capacity", defaults::ALERT_CAPACITY as u64)?
            .set_default("alerts.dedup_window_secs", defaults::ALERT_DEDUP_WINDOW_SECS)?
            .set_default("storage.backend", defaults::STORAGE_BACKEND)?
            .set_default("storage.path", defaults::STORAGE_PATH)?
            .set_default("storage.key_prefix", defaults::STORAGE_KEY_PREFIX)?
            .set_default("cors.allowed_origins", vec!["http://localhost:5173"])?
            .set_default("cors.max_age_secs", defaults::CORS_MAX_AGE_SECS)?
            // Load from config files
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // APP__MEDIA__MAX_OFFER_RETRIES=3 -> media.max_offer_retries = 3
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            // Map simple environment variables
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .set_override_option("backend.api_base_url", std::env::var("SST_API_URL").ok())?
            .set_override_option("backend.socket_url", std::env::var("SST_SOCKET_URL").ok())?
            .set_override_option("backend.access_token", std::env::var("SST_ACCESS_TOKEN").ok())?
            .set_override_option("storage.redis_url", std::env::var("REDIS_URL").ok())?
            .build()?
            .try_deserialize()
            .and_then(|settings: Self| {
                settings.validate()?;
                Ok(settings)
            })
    }

    /// Reject combinations that would leave a component unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.alerts.capacity == 0 {
            return Err(ConfigError::Message(
                "alerts.capacity must be at least 1".into(),
            ));
        }
        if self.status.poll_interval_secs == 0 {
            return Err(ConfigError::Message(
                "status.poll_interval_secs must be at least 1".into(),
            ));
        }
        if self.storage.backend == "redis" && self.storage.redis_url.is_none() {
            return Err(ConfigError::Message(
                "storage.backend = \"redis\" requires storage.redis_url".into(),
            ));
        }
        if let Some(turn) = &self.media.turn {
            if turn.username.is_empty() || turn.credential.is_empty() {
                return Err(ConfigError::Message(
                    "media.turn requires both username and credential".into(),
                ));
            }
        }
        Ok(())
    }

    /// Get the full UI bridge address as a string.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: defaults::SERVER_HOST.into(),
                port: defaults::SERVER_PORT,
            },
            backend: BackendSettings {
                api_base_url: defaults::API_BASE_URL.into(),
                socket_url: defaults::SOCKET_URL.into(),
                access_token: String::new(),
                request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
            },
            realtime: RealtimeSettings::default(),
            media: MediaSettings::default(),
            status: StatusSettings::default(),
            alerts: AlertSettings::default(),
            storage: StorageSettings {
                backend: "memory".into(),
                path: defaults::STORAGE_PATH.into(),
                redis_url: None,
                key_prefix: defaults::STORAGE_KEY_PREFIX.into(),
            },
            cors: CorsSettings {
                allowed_origins: Vec::new(),
                max_age_secs: defaults::CORS_MAX_AGE_SECS,
            },
            environment: "test".into(),
        }
    }
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            path: defaults::SOCKET_PATH.into(),
            connect_timeout_secs: defaults::CONNECT_TIMEOUT_SECS,
        }
    }
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            ice_servers: defaults::STUN_SERVERS.iter().map(|s| s.to_string()).collect(),
            turn: None,
            offer_retry_delay_secs: defaults::OFFER_RETRY_DELAY_SECS,
            max_offer_retries: defaults::MAX_OFFER_RETRIES,
            reconnect_delay_secs: defaults::RECONNECT_DELAY_SECS,
            reconnect_settle_secs: defaults::RECONNECT_SETTLE_SECS,
            max_reconnect_attempts: defaults::MAX_RECONNECT_ATTEMPTS,
            ice_candidate_pool_size: defaults::ICE_CANDIDATE_POOL_SIZE,
        }
    }
}

impl MediaSettings {
    pub fn offer_retry_delay(&self) -> Duration {
        Duration::from_secs(self.offer_retry_delay_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn reconnect_settle(&self) -> Duration {
        Duration::from_secs(self.reconnect_settle_secs)
    }

    /// `None` when offer checks repeat forever.
    pub fn offer_retry_cap(&self) -> Option<u32> {
        (self.max_offer_retries > 0).then_some(self.max_offer_retries)
    }

    /// `None` when peer restarts repeat forever.
    pub fn reconnect_cap(&self) -> Option<u32> {
        (self.max_reconnect_attempts > 0).then_some(self.max_reconnect_attempts)
    }
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: defaults::POLL_INTERVAL_SECS,
            override_ttl_secs: None,
            clear_overrides_on_refresh: false,
        }
    }
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            capacity: defaults::ALERT_CAPACITY,
            dedup_window_secs: defaults::ALERT_DEDUP_WINDOW_SECS,
        }
    }
}
