//! Realtime channel types and the signaling port.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

/// One inbound named event.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEvent {
    pub name: String,
    pub args: Vec<Value>,
    /// Present when the sender expects an acknowledgement.
    pub ack_id: Option<u64>,
}

impl ChannelEvent {
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
            ack_id: None,
        }
    }

    /// First argument, or `None` when the event carried no payload.
    pub fn payload(&self) -> Option<&Value> {
        self.args.first()
    }
}

/// Handler invoked once per inbound event, in arrival order.
pub type EventHandler = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

/// Connection status of the realtime channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

/// Handle for one registered handler. Dropping or disposing it removes the handler.
#[must_use = "dropping a subscription unregisters its handler"]
pub struct Subscription {
    event: String,
    id: u64,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(event: impl Into<String>, id: u64, release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            event: event.into(),
            id,
            release: Some(Box::new(release)),
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Unregister now.
    pub fn dispose(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("id", &self.id)
            .field("active", &self.release.is_some())
            .finish()
    }
}

/// Group of subscriptions disposed together.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn dispose(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.dispose();
        }
    }
}

impl Drop for SubscriptionSet {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Named-event pub/sub over the realtime channel.
pub trait SignalingChannel: Send + Sync {
    /// Register `handler` for `event`. Several handlers per event all fire.
    fn subscribe(&self, event: &str, handler: EventHandler) -> Subscription;

    /// Fire-and-forget send. Returns `false` when the event was dropped
    /// because the channel is not connected.
    fn emit(&self, event: &str, args: Vec<Value>) -> bool;

    /// Answer an inbound event that asked for an acknowledgement.
    fn ack(&self, ack_id: u64, args: Vec<Value>) -> bool;

    fn status(&self) -> ChannelStatus;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_dispose_runs_release_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let subscription = Subscription::new("server:new_offer", 1, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        subscription.dispose();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_set_disposes_all() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut set = SubscriptionSet::new();
        for id in 0..3 {
            let counter = released.clone();
            set.push(Subscription::new("x", id, move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        set.dispose();
        assert!(set.is_empty());
        assert_eq!(released.load(Ordering::SeqCst), 3);

        drop(set);
        assert_eq!(released.load(Ordering::SeqCst), 3);
    }
}
