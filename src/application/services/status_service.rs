//! Status Service
//!
//! Reconciles the senior list fetched from the backend with realtime pushes
//! and the durable status override cache, and turns pushes into alerts.
//!
//! Status precedence on load: persisted override, then the keyword rule over
//! the raw health information. Pushes update the in-memory entry in place and
//! overwrite the override.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::alert_service::AlertSink;
use super::feed::{EventFeed, MonitorEvent};
use crate::config::StatusSettings;
use crate::domain::{
    AlertCategory, EmergencyKind, NewAlert, RiskStatus, Senior, SeniorDirectory, SensorPayload,
    SensorSnapshot, StatusSource,
};
use crate::infrastructure::store::{keys, JsonStore};
use crate::shared::error::AppError;

/// Persisted override for one senior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusOverride {
    pub status: RiskStatus,
    pub updated_at: DateTime<Utc>,
}

type OverrideMap = HashMap<i64, StatusOverride>;

/// Fold persisted overrides into the in-memory map, newest entry winning.
///
/// Returns true when the in-memory map holds entries the store lacks.
fn merge_overrides(cache: &mut OverrideMap, persisted: &OverrideMap) -> bool {
    for (id, stored) in persisted {
        match cache.get(id) {
            Some(current) if current.updated_at >= stored.updated_at => {}
            _ => {
                cache.insert(*id, *stored);
            }
        }
    }
    cache
        .iter()
        .any(|(id, entry)| persisted.get(id) != Some(entry))
}

/// Projection selector for [`StatusReconciler::filtered_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(RiskStatus),
}

impl StatusFilter {
    /// `all`/`전체` or any exact status label.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "" | "all" | "전체" => Some(Self::All),
            other => RiskStatus::parse(other).map(Self::Only),
        }
    }

    pub fn matches(&self, status: RiskStatus) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => *wanted == status,
        }
    }
}

pub struct StatusReconciler {
    directory: Arc<dyn SeniorDirectory>,
    alerts: Arc<AlertSink>,
    store: JsonStore,
    settings: StatusSettings,
    feed: EventFeed,
    seniors: RwLock<Vec<Arc<RwLock<Senior>>>>,
    overrides: Mutex<OverrideMap>,
    sensors: DashMap<i64, SensorSnapshot>,
}

impl StatusReconciler {
    pub async fn hydrate(
        directory: Arc<dyn SeniorDirectory>,
        alerts: Arc<AlertSink>,
        store: JsonStore,
        settings: StatusSettings,
        feed: EventFeed,
    ) -> Self {
        let overrides: OverrideMap = store.load_or_default(keys::STATUS_OVERRIDES).await;
        debug!(count = overrides.len(), "Status overrides restored");

        Self {
            directory,
            alerts,
            store,
            settings,
            feed,
            seniors: RwLock::new(Vec::new()),
            overrides: Mutex::new(overrides),
            sensors: DashMap::new(),
        }
    }

    fn is_active(&self, entry: &StatusOverride, now: DateTime<Utc>) -> bool {
        match self.settings.override_ttl_secs {
            None => true,
            Some(ttl) => now.signed_duration_since(entry.updated_at) < Duration::seconds(ttl as i64),
        }
    }

    async fn persist_overrides(&self, overrides: &OverrideMap) {
        if let Err(e) = self.store.save(keys::STATUS_OVERRIDES, overrides).await {
            warn!(error = %e, "Failed to persist status overrides");
        }
    }

    /// Fetch the full list and resolve every status.
    ///
    /// Entries already in memory are updated in place so holders of an
    /// entry see the new values. The override guard is held through the
    /// merge so a concurrent push is applied either before or after it.
    #[instrument(skip(self))]
    pub async fn load_initial(&self) -> Result<usize, AppError> {
        let fetched = self.directory.list_seniors().await?;
        let now = Utc::now();

        let mut cache = self.overrides.lock().await;
        let persisted: OverrideMap = self.store.load_or_default(keys::STATUS_OVERRIDES).await;
        let mut dirty = merge_overrides(&mut cache, &persisted);

        let before = cache.len();
        if self.settings.clear_overrides_on_refresh {
            cache.clear();
        } else {
            cache.retain(|_, entry| self.is_active(entry, now));
        }
        dirty |= cache.len() != before;
        if dirty {
            self.persist_overrides(&cache).await;
        }

        let count = fetched.len();
        {
            let existing: HashMap<i64, Arc<RwLock<Senior>>> = self
                .seniors
                .read()
                .iter()
                .map(|entry| (entry.read().id, entry.clone()))
                .collect();

            let merged: Vec<Arc<RwLock<Senior>>> = fetched
                .into_iter()
                .map(|mut senior| {
                    if let Some(entry) = cache.get(&senior.id) {
                        senior.apply_status(entry.status, StatusSource::Override);
                    }
                    match existing.get(&senior.id) {
                        Some(slot) => {
                            *slot.write() = senior;
                            slot.clone()
                        }
                        None => Arc::new(RwLock::new(senior)),
                    }
                })
                .collect();

            *self.seniors.write() = merged;
        }
        let overrides = cache.len();
        drop(cache);

        info!(count, overrides, "Senior list loaded");
        self.feed.publish(MonitorEvent::SeniorsReloaded { count });
        Ok(count)
    }

    fn entry(&self, senior_id: i64) -> Option<Arc<RwLock<Senior>>> {
        self.seniors
            .read()
            .iter()
            .find(|entry| entry.read().id == senior_id)
            .cloned()
    }

    /// Display name from memory, else from the backend. `None` suppresses the alert.
    async fn resolve_name(&self, senior_id: i64) -> Option<String> {
        if let Some(entry) = self.entry(senior_id) {
            return Some(entry.read().name.clone());
        }
        match self.directory.get_senior(senior_id).await {
            Ok(Some(senior)) => Some(senior.name),
            Ok(None) => {
                debug!(senior_id, "Unknown senior, alert dropped");
                None
            }
            Err(e) => {
                debug!(senior_id, error = %e, "Name lookup failed, alert dropped");
                None
            }
        }
    }

    /// Apply a pushed status. Repeating the same push changes nothing.
    #[instrument(skip(self))]
    pub async fn on_status_push(&self, senior_id: i64, status: RiskStatus) {
        let now = Utc::now();
        let held = {
            let mut cache = self.overrides.lock().await;
            let unchanged = cache.get(&senior_id).map(|entry| entry.status) == Some(status);
            if !unchanged {
                cache.insert(senior_id, StatusOverride { status, updated_at: now });
                self.persist_overrides(&cache).await;
            }

            match self.entry(senior_id) {
                Some(entry) => {
                    let mut senior = entry.write();
                    let changed = senior.status != status;
                    senior.apply_status(status, StatusSource::Push);
                    Some(changed.then(|| senior.clone()))
                }
                None if unchanged => {
                    debug!(senior_id, %status, "Status unchanged");
                    return;
                }
                None => None,
            }
        };

        let name = match held {
            Some(Some(snapshot)) => {
                info!(senior_id, %status, "Senior status changed");
                let name = snapshot.name.clone();
                self.feed.publish(MonitorEvent::SeniorUpdated(snapshot));
                name
            }
            Some(None) => {
                debug!(senior_id, %status, "Status unchanged");
                return;
            }
            None => match self.resolve_name(senior_id).await {
                Some(name) => name,
                None => return,
            },
        };

        self.alerts.record(status_alert(senior_id, &name, status)).await;
    }

    /// Emergencies always raise an error alert and never touch the status.
    #[instrument(skip(self))]
    pub async fn on_emergency_push(&self, senior_id: Option<i64>, kind: EmergencyKind) {
        let alert = match senior_id {
            Some(id) => {
                let Some(name) = self.resolve_name(id).await else {
                    return;
                };
                NewAlert::new(
                    AlertCategory::Error,
                    "긴급 상황",
                    format!("{name}님: {}", kind.description()),
                )
                .for_senior(id)
            }
            None => NewAlert::new(AlertCategory::Error, "긴급 상황", kind.description()),
        };
        warn!(senior_id = ?senior_id, kind = ?kind, "Emergency reported");
        self.alerts.record(alert).await;
    }

    /// Normalize and persist a sensor payload. Unknown shapes are dropped.
    ///
    /// A bulk payload replaces the snapshot; the other shapes merge into it.
    #[instrument(skip(self, raw))]
    pub async fn on_sensor_push(&self, raw: &Value) -> Option<i64> {
        let payload = match SensorPayload::classify(raw) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Dropping sensor payload");
                return None;
            }
        };

        let replace = matches!(payload, SensorPayload::Bulk { .. });
        let (senior_id, incoming) = payload.normalize();

        let mut snapshot = if replace {
            SensorSnapshot::new()
        } else {
            self.sensor_snapshot(senior_id).await
        };
        snapshot.extend(incoming);

        if let Err(e) = self.store.save(&keys::sensors(senior_id), &snapshot).await {
            warn!(senior_id, error = %e, "Failed to persist sensor snapshot");
        }
        debug!(senior_id, sensors = snapshot.len(), "Sensor snapshot updated");
        self.sensors.insert(senior_id, snapshot.clone());
        self.feed.publish(MonitorEvent::SensorsUpdated {
            senior_id,
            sensors: snapshot,
        });
        Some(senior_id)
    }

    /// Latest known sensor snapshot, falling back to the persisted copy.
    pub async fn sensor_snapshot(&self, senior_id: i64) -> SensorSnapshot {
        if let Some(snapshot) = self.sensors.get(&senior_id) {
            return snapshot.clone();
        }
        let snapshot: SensorSnapshot = self.store.load_or_default(&keys::sensors(senior_id)).await;
        if !snapshot.is_empty() {
            self.sensors.insert(senior_id, snapshot.clone());
        }
        snapshot
    }

    /// Subset matching `filter`, in list order.
    pub fn filtered_by(&self, filter: StatusFilter) -> Vec<Senior> {
        self.seniors
            .read()
            .iter()
            .map(|entry| entry.read().clone())
            .filter(|senior| filter.matches(senior.status))
            .collect()
    }

    pub fn get(&self, senior_id: i64) -> Option<Senior> {
        self.entry(senior_id).map(|entry| entry.read().clone())
    }

    pub fn len(&self) -> usize {
        self.seniors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seniors.read().is_empty()
    }

    /// Delete through the backend, then drop the entry.
    ///
    /// `Ok(false)` when the backend refused or could not be reached; the
    /// list is left untouched in both cases.
    #[instrument(skip(self))]
    pub async fn remove_senior(&self, senior_id: i64) -> Result<bool, AppError> {
        let acknowledged = match self.directory.delete_senior(senior_id).await {
            Ok(acknowledged) => acknowledged,
            Err(e) if e.is_connectivity() => {
                warn!(senior_id, error = %e, "Backend unreachable, deletion skipped");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        if !acknowledged {
            return Ok(false);
        }

        self.seniors.write().retain(|entry| entry.read().id != senior_id);
        self.sensors.remove(&senior_id);
        if let Err(e) = self.store.remove(&keys::sensors(senior_id)).await {
            warn!(senior_id, error = %e, "Failed to drop persisted sensor snapshot");
        }
        {
            let mut cache = self.overrides.lock().await;
            if cache.remove(&senior_id).is_some() {
                self.persist_overrides(&cache).await;
            }
        }

        info!(senior_id, "Senior removed");
        self.feed.publish(MonitorEvent::SeniorRemoved { senior_id });
        Ok(true)
    }

    pub async fn profile_image(&self, senior_id: i64) -> Result<Vec<u8>, AppError> {
        self.directory.profile_image(senior_id).await
    }

    /// Current override for one senior, if any.
    pub async fn override_for(&self, senior_id: i64) -> Option<StatusOverride> {
        self.overrides.lock().await.get(&senior_id).copied()
    }
}

fn status_alert(senior_id: i64, name: &str, status: RiskStatus) -> NewAlert {
    let category = match status {
        RiskStatus::Danger => AlertCategory::Error,
        RiskStatus::Caution => AlertCategory::Warning,
        RiskStatus::Safe => AlertCategory::Success,
    };
    NewAlert::new(
        category,
        "상태 변경",
        format!("{name}님의 상태가 '{}'(으)로 변경되었습니다", status.label()),
    )
    .for_senior(senior_id)
}
