//! Alert Service
//!
//! Newest-first alert feed with time-window deduplication, persisted whole
//! after every change and capped to the configured capacity.

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::feed::{EventFeed, MonitorEvent};
use crate::config::AlertSettings;
use crate::domain::{Alert, NewAlert};
use crate::infrastructure::metrics;
use crate::infrastructure::store::{keys, JsonStore};

pub struct AlertSink {
    alerts: Mutex<Vec<Alert>>,
    store: JsonStore,
    settings: AlertSettings,
    feed: EventFeed,
}

impl AlertSink {
    /// Restore the persisted feed. A corrupt copy starts an empty feed.
    pub async fn hydrate(store: JsonStore, settings: AlertSettings, feed: EventFeed) -> Self {
        let mut alerts: Vec<Alert> = store.load_or_default(keys::ALERT_FEED).await;
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        alerts.truncate(settings.capacity);
        info!(count = alerts.len(), "Alert feed restored");

        Self {
            alerts: Mutex::new(alerts),
            store,
            settings,
            feed,
        }
    }

    fn dedup_window(&self) -> Duration {
        Duration::seconds(self.settings.dedup_window_secs as i64)
    }

    /// Record an alert. Returns `None` when it duplicates a recent one.
    pub async fn record(&self, alert: NewAlert) -> Option<Alert> {
        self.record_at(alert, Utc::now()).await
    }

    pub async fn record_at(&self, alert: NewAlert, now: DateTime<Utc>) -> Option<Alert> {
        let window = self.dedup_window();
        let mut alerts = self.alerts.lock().await;

        let duplicate = alerts
            .iter()
            .filter(|existing| now.signed_duration_since(existing.created_at) < window)
            .any(|existing| existing.is_duplicate_of(&alert));
        metrics::record_alert(!duplicate);
        if duplicate {
            debug!(title = %alert.title, senior_id = ?alert.senior_id, "Duplicate alert suppressed");
            return None;
        }

        let recorded = alert.into_alert(Uuid::new_v4(), now);
        alerts.insert(0, recorded.clone());
        alerts.truncate(self.settings.capacity);
        self.persist(&alerts).await;
        let unread = unread(&alerts);
        drop(alerts);

        info!(
            alert_id = %recorded.id,
            category = ?recorded.category,
            title = %recorded.title,
            "Alert recorded"
        );
        self.feed.publish(MonitorEvent::AlertRecorded(recorded.clone()));
        self.feed.publish(MonitorEvent::AlertsChanged { unread });
        Some(recorded)
    }

    /// Returns `false` when no alert has that id.
    pub async fn mark_read(&self, id: Uuid) -> bool {
        let mut alerts = self.alerts.lock().await;
        let Some(alert) = alerts.iter_mut().find(|a| a.id == id) else {
            return false;
        };
        if !alert.read {
            alert.read = true;
            self.persist(&alerts).await;
            self.feed.publish(MonitorEvent::AlertsChanged { unread: unread(&alerts) });
        }
        true
    }

    /// Returns how many alerts changed.
    pub async fn mark_all_read(&self) -> usize {
        let mut alerts = self.alerts.lock().await;
        let mut changed = 0;
        for alert in alerts.iter_mut().filter(|a| !a.read) {
            alert.read = true;
            changed += 1;
        }
        if changed > 0 {
            self.persist(&alerts).await;
            self.feed.publish(MonitorEvent::AlertsChanged { unread: 0 });
        }
        changed
    }

    pub async fn clear(&self) {
        let mut alerts = self.alerts.lock().await;
        alerts.clear();
        if let Err(e) = self.store.remove(keys::ALERT_FEED).await {
            warn!(error = %e, "Failed to clear persisted alert feed");
        }
        self.feed.publish(MonitorEvent::AlertsChanged { unread: 0 });
    }

    pub async fn unread_count(&self) -> usize {
        unread(&self.alerts.lock().await)
    }

    /// Newest first.
    pub async fn list(&self) -> Vec<Alert> {
        self.alerts.lock().await.clone()
    }

    async fn persist(&self, alerts: &[Alert]) {
        if let Err(e) = self.store.save(keys::ALERT_FEED, &alerts).await {
            warn!(error = %e, "Failed to persist alert feed");
        }
    }
}

fn unread(alerts: &[Alert]) -> usize {
    alerts.iter().filter(|a| !a.read).count()
}
