//! Broadcast of state changes to UI bridge listeners.

use serde::Serialize;
use tokio::sync::broadcast;

use super::media_service::SessionSnapshot;
use crate::domain::{Alert, ChannelStatus, Senior, SensorSnapshot};

const FEED_CAPACITY: usize = 256;

/// Change notification pushed to `/events` listeners.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MonitorEvent {
    SeniorsReloaded { count: usize },
    SeniorUpdated(Senior),
    SeniorRemoved { senior_id: i64 },
    SensorsUpdated { senior_id: i64, sensors: SensorSnapshot },
    AlertRecorded(Alert),
    AlertsChanged { unread: usize },
    ChannelChanged { status: ChannelStatus },
    SessionChanged(SessionSnapshot),
}

/// Fan-out of [`MonitorEvent`]s. Slow listeners lose the oldest events.
#[derive(Clone)]
pub struct EventFeed {
    tx: broadcast::Sender<MonitorEvent>,
}

impl EventFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: MonitorEvent) {
        // No listeners is the normal case when no UI is attached.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventFeed {
    fn default() -> Self {
        Self::new()
    }
}
