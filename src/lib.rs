//! # Senior Safe Library
//!
//! Caregiver-side realtime core for elder-care remote monitoring:
//! - Realtime channel to the backend (Socket.IO over a single WebSocket)
//! - Live video negotiation with a senior's device (WebRTC answerer)
//! - Status reconciliation of monitored seniors with push updates
//! - Deduplicated, persisted alert feed
//! - Local HTTP/WebSocket bridge exposing all of it to a UI
//!
//! ## Architecture
//!
//! - **Domain Layer**: entities, wire event names and port traits
//! - **Application Layer**: reconciler, alert sink, media sessions, push router
//! - **Infrastructure Layer**: realtime transport, WebRTC, backend client, stores, metrics
//! - **Presentation Layer**: HTTP handlers and the event feed WebSocket
//!
//! ## Module Structure
//!
//! ```text
//! senior_safe/
//! +-- config/         Configuration management
//! +-- domain/         Entities, events and ports
//! +-- application/    Services and DTOs
//! +-- infrastructure/ Channel, peer, HTTP client, store and metrics implementations
//! +-- presentation/   HTTP routes and WebSocket handlers
//! +-- shared/         Errors and validation helpers
//! ```

// Configuration module
pub mod config;

// Domain layer - Core types and ports
pub mod domain;

// Application layer - Services
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
