//! Application Services
//!
//! Business logic services that coordinate domain operations.
//!
//! ## Available Services
//!
//! - **StatusReconciler**: senior list, status overrides, sensor snapshots
//! - **AlertSink**: deduplicated, persisted alert feed
//! - **MediaSessionRegistry**: live video negotiation per senior
//! - **PushRouter**: server push events into the reconciler
//! - **EventFeed**: change notifications for UI listeners

pub mod alert_service;
pub mod feed;
pub mod media_service;
pub mod push_router;
pub mod status_service;

pub use alert_service::AlertSink;
pub use feed::{EventFeed, MonitorEvent};
pub use media_service::{ErrorCallback, MediaSessionHandle, MediaSessionRegistry, SessionSnapshot};
pub use push_router::{spawn_status_poller, PushRouter};
pub use status_service::{StatusFilter, StatusOverride, StatusReconciler};
