//! Push Router
//!
//! Subscribes to the server's push events and feeds them, in arrival order,
//! through one queue into the reconciler and the alert sink.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::alert_service::AlertSink;
use super::status_service::StatusReconciler;
use crate::domain::events::{client, local, server};
use crate::domain::{
    AlertCategory, ChannelEvent, EmergencyKind, NewAlert, RiskStatus, SignalingChannel,
    SubscriptionSet,
};

const ROUTED_EVENTS: [&str; 9] = [
    server::SENIOR_STATUS_CHANGE,
    server::EMERGENCY_SITUATION,
    server::SENSOR_LOG,
    server::SENSOR_STATUS_CHANGE,
    server::SENSOR_EVENT,
    server::REQUEST_SAFETY_CHECK,
    server::SAFETY_CHECK_FAILED,
    server::AUTH_SUCCESS,
    local::CONNECT,
];

/// Read an id that may arrive as a number or a numeric string.
fn id_field(payload: &Value, field: &str) -> Option<i64> {
    match payload.get(field)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Payloads sometimes arrive JSON-encoded.
fn decoded(payload: Option<&Value>) -> Option<Value> {
    match payload? {
        Value::String(s) if s.trim_start().starts_with('{') => serde_json::from_str(s).ok(),
        other => Some(other.clone()),
    }
}

/// `{ senior_id, status }` push, status as a Korean or English label.
pub fn parse_status_push(payload: Option<&Value>) -> Option<(i64, RiskStatus)> {
    let payload = decoded(payload)?;
    let senior_id = id_field(&payload, "senior_id")?;
    let label = payload.get("status")?.as_str()?;
    Some((senior_id, RiskStatus::resolve(label)))
}

/// Emergency pushes may carry nothing at all.
pub fn parse_emergency_push(payload: Option<&Value>) -> (Option<i64>, EmergencyKind) {
    let Some(payload) = decoded(payload) else {
        return (None, EmergencyKind::Other(String::new()));
    };
    if let Some(code) = payload.as_str() {
        return (None, EmergencyKind::from_code(code));
    }

    let senior_id = id_field(&payload, "senior_id");
    let kind = ["emergency_type", "code", "type"]
        .iter()
        .find_map(|field| payload.get(*field).and_then(Value::as_str))
        .map(EmergencyKind::from_code)
        .or_else(|| {
            payload
                .get("message")
                .and_then(Value::as_str)
                .map(|message| EmergencyKind::Other(message.to_string()))
        })
        .unwrap_or_else(|| EmergencyKind::Other(String::new()));
    (senior_id, kind)
}

/// Routes push events into the reconciler until dropped.
pub struct PushRouter {
    _subscriptions: SubscriptionSet,
    worker: JoinHandle<()>,
}

impl PushRouter {
    pub fn attach(
        channel: Arc<dyn SignalingChannel>,
        reconciler: Arc<StatusReconciler>,
        alerts: Arc<AlertSink>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<ChannelEvent>();

        let mut subscriptions = SubscriptionSet::new();
        for event in ROUTED_EVENTS {
            let tx = tx.clone();
            subscriptions.push(channel.subscribe(
                event,
                Arc::new(move |event: &ChannelEvent| {
                    let _ = tx.send(event.clone());
                }),
            ));
        }

        let worker = tokio::spawn(route(rx, channel, reconciler, alerts));
        info!(events = ROUTED_EVENTS.len(), "Push router attached");

        Self {
            _subscriptions: subscriptions,
            worker,
        }
    }
}

impl Drop for PushRouter {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn route(
    mut rx: mpsc::UnboundedReceiver<ChannelEvent>,
    channel: Arc<dyn SignalingChannel>,
    reconciler: Arc<StatusReconciler>,
    alerts: Arc<AlertSink>,
) {
    while let Some(event) = rx.recv().await {
        match event.name.as_str() {
            server::SENIOR_STATUS_CHANGE => match parse_status_push(event.payload()) {
                Some((senior_id, status)) => reconciler.on_status_push(senior_id, status).await,
                None => warn!(payload = ?event.payload(), "Unreadable status push"),
            },
            server::EMERGENCY_SITUATION => {
                let (senior_id, kind) = parse_emergency_push(event.payload());
                reconciler.on_emergency_push(senior_id, kind).await;
            }
            server::SENSOR_LOG | server::SENSOR_STATUS_CHANGE | server::SENSOR_EVENT => {
                match decoded(event.payload()) {
                    Some(payload) => {
                        reconciler.on_sensor_push(&payload).await;
                    }
                    None => debug!(event = %event.name, "Sensor push without payload"),
                }
            }
            server::REQUEST_SAFETY_CHECK => match event.ack_id {
                Some(ack_id) => {
                    if !channel.ack(ack_id, vec![json!({ "status": "ok" })]) {
                        warn!(ack_id, "Could not answer safety check");
                    }
                }
                None => debug!("Safety check without ack id"),
            },
            server::SAFETY_CHECK_FAILED => {
                let senior_id = decoded(event.payload()).and_then(|p| id_field(&p, "senior_id"));
                let mut alert = NewAlert::new(
                    AlertCategory::Warning,
                    "안전 점검 실패",
                    "기기가 안전 점검에 응답하지 않았습니다",
                );
                if let Some(id) = senior_id {
                    alert = alert.for_senior(id);
                }
                alerts.record(alert).await;
            }
            server::AUTH_SUCCESS => info!("Realtime channel authenticated"),
            local::CONNECT => {
                channel.emit(client::REQUEST_ALL_STATUS, Vec::new());
            }
            other => debug!(event = other, "Unrouted event"),
        }
    }
}

/// Periodically ask for a full status push and refresh the list.
pub fn spawn_status_poller(
    channel: Arc<dyn SignalingChannel>,
    reconciler: Arc<StatusReconciler>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately and startup already loaded the list.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            channel.emit(client::REQUEST_ALL_STATUS, Vec::new());
            if let Err(e) = reconciler.load_initial().await {
                warn!(error = %e, "Periodic senior refresh failed");
            }
        }
    })
}
