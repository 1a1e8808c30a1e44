//! Durable Store Module
//!
//! Key/value persistence for the status override cache, the alert feed and
//! sensor snapshots.
//!
//! # Architecture
//!
//! ```text
//! +-------------------+
//! |  Reconciler/Sink  |
//! +-------------------+
//!          |
//!          v
//! +-------------------+
//! |     JsonStore     |  <-- typed load/save, corruption falls back to empty
//! +-------------------+
//!          |
//!          v
//! +-------------------+
//! |   DurableStore    |  <-- memory | file | redis
//! +-------------------+
//! ```

mod file_store;
mod memory_store;
mod redis_store;

pub use file_store::FileStore;
pub use memory_store::MemoryStore;
pub use redis_store::{create_redis_client, RedisStore};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{info, warn};

use crate::config::StorageSettings;
use crate::shared::error::AppError;

/// Store keys, one whole JSON value per key.
pub mod keys {
    /// Senior id -> last pushed status
    pub const STATUS_OVERRIDES: &str = "status:overrides";

    /// Persisted alert feed, newest first
    pub const ALERT_FEED: &str = "alerts:feed";

    /// Normalized sensor snapshot of one senior
    pub fn sensors(senior_id: i64) -> String {
        format!("sensors:{senior_id}")
    }
}

/// Raw string storage.
///
/// Every value is written whole. Read-modify-write sequences are serialized
/// by the callers.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, AppError>;

    async fn set_raw(&self, key: &str, value: String) -> Result<(), AppError>;

    /// `Ok(true)` if the key existed.
    async fn delete(&self, key: &str) -> Result<bool, AppError>;

    /// Cheap availability check used by readiness probes.
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }

    fn backend(&self) -> &'static str;
}

/// JSON view over a [`DurableStore`].
#[derive(Clone)]
pub struct JsonStore {
    inner: Arc<dyn DurableStore>,
}

impl JsonStore {
    pub fn new(inner: Arc<dyn DurableStore>) -> Self {
        Self { inner }
    }

    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Load a value, treating a missing, unreadable or unparsable entry as empty.
    pub async fn load_or_default<T>(&self, key: &str) -> T
    where
        T: DeserializeOwned + Default,
    {
        let raw = match self.inner.get_raw(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return T::default(),
            Err(e) => {
                warn!(key, error = %e, "Durable store read failed, using empty value");
                return T::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Discarding corrupt persisted value");
                T::default()
            }
        }
    }

    pub async fn save<T>(&self, key: &str, value: &T) -> Result<(), AppError>
    where
        T: Serialize + Sync,
    {
        let raw = serde_json::to_string(value)?;
        self.inner.set_raw(key, raw).await
    }

    pub async fn remove(&self, key: &str) -> Result<bool, AppError> {
        self.inner.delete(key).await
    }

    pub async fn ping(&self) -> Result<(), AppError> {
        self.inner.ping().await
    }

    pub fn backend(&self) -> &'static str {
        self.inner.backend()
    }

    pub fn raw(&self) -> &Arc<dyn DurableStore> {
        &self.inner
    }
}

/// Build the store selected by `storage.backend`.
pub async fn create_store(settings: &StorageSettings) -> Result<Arc<dyn DurableStore>, AppError> {
    let store: Arc<dyn DurableStore> = match settings.backend.as_str() {
        "memory" => Arc::new(MemoryStore::new()),
        "file" => Arc::new(FileStore::open(&settings.path).await?),
        "redis" => {
            let url = settings.redis_url.as_deref().ok_or_else(|| {
                AppError::Validation("storage.redis_url is required for the redis backend".into())
            })?;
            let conn = create_redis_client(url).await?;
            Arc::new(RedisStore::new(conn, settings.key_prefix.clone()))
        }
        other => {
            return Err(AppError::Validation(format!(
                "unknown storage backend {other}"
            )))
        }
    };
    info!(backend = store.backend(), "Durable store ready");
    Ok(store)
}
