//! Health Check Handlers
//!
//! Provides health check endpoints for liveness and readiness probes.
//!
//! # Endpoints
//! - `GET /health` - Basic health check
//! - `GET /health/live` - Liveness probe (is the process running?)
//! - `GET /health/ready` - Readiness probe (channel connected, store reachable?)

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::time::Instant;

use crate::domain::{ChannelStatus, SignalingChannel};
use crate::startup::AppState;

/// Process start time for uptime calculation
static SERVER_START: Lazy<Instant> = Lazy::new(Instant::now);
static SERVER_START_TIME: Lazy<DateTime<Utc>> = Lazy::new(Utc::now);

/// Initialize the start time (call during startup)
pub fn init_server_start() {
    Lazy::force(&SERVER_START);
    Lazy::force(&SERVER_START_TIME);
}

/// Basic health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Detailed health check response
#[derive(Debug, Serialize)]
pub struct DetailedHealthResponse {
    pub status: HealthStatus,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub started_at: String,
    pub checks: HealthChecks,
}

/// Individual component health checks
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub channel: ServiceHealth,
    pub store: ServiceHealth,
    pub events: EventFeedHealth,
}

/// Health status for individual components
#[derive(Debug, Serialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// UI event feed health
#[derive(Debug, Serialize)]
pub struct EventFeedHealth {
    pub status: HealthStatus,
    pub listeners: usize,
    pub live_sessions: usize,
}

/// Overall health status
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Simple liveness response
#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
}

/// Basic health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Liveness probe - checks if the process is running
pub async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse { status: "alive" })
}

/// Readiness probe
/// Returns 200 if ready, 503 if the store is unavailable
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = SERVER_START.elapsed().as_secs();
    let started_at = SERVER_START_TIME.to_rfc3339();

    let channel_health = check_channel(state.channel.status());
    let store_health = check_store(&state).await;

    let events = EventFeedHealth {
        status: HealthStatus::Healthy,
        listeners: state.feed.listener_count(),
        live_sessions: state.sessions.list().len(),
    };

    let overall_status = determine_overall_status(&store_health, &channel_health);

    let response = DetailedHealthResponse {
        status: overall_status,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: uptime,
        started_at,
        checks: HealthChecks {
            channel: channel_health,
            store: store_health,
            events,
        },
    };

    let status_code = match overall_status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(response))
}

fn check_channel(status: ChannelStatus) -> ServiceHealth {
    match status {
        ChannelStatus::Connected => ServiceHealth {
            status: HealthStatus::Healthy,
            latency_ms: None,
            message: None,
        },
        other => ServiceHealth {
            status: HealthStatus::Degraded,
            latency_ms: None,
            message: Some(format!("Realtime channel is {}", other.as_str())),
        },
    }
}

/// Check store availability and latency
async fn check_store(state: &AppState) -> ServiceHealth {
    let start = Instant::now();
    match state.store.ping().await {
        Ok(()) => {
            let latency = start.elapsed().as_millis() as u64;
            ServiceHealth {
                status: if latency < 50 {
                    HealthStatus::Healthy
                } else {
                    HealthStatus::Degraded
                },
                latency_ms: Some(latency),
                message: None,
            }
        }
        Err(e) => ServiceHealth {
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            message: Some(format!("{} store unavailable: {}", state.store.backend(), e)),
        },
    }
}

/// Determine overall health based on individual checks
fn determine_overall_status(store: &ServiceHealth, channel: &ServiceHealth) -> HealthStatus {
    // Without a store nothing can be persisted
    if store.status == HealthStatus::Unhealthy {
        return HealthStatus::Unhealthy;
    }

    if store.status == HealthStatus::Degraded || channel.status != HealthStatus::Healthy {
        return HealthStatus::Degraded;
    }

    HealthStatus::Healthy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_serialization() {
        let status = HealthStatus::Healthy;
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, "\"healthy\"");
    }

    #[test]
    fn test_disconnected_channel_degrades() {
        let health = check_channel(ChannelStatus::Disconnected);
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.message.as_deref(), Some("Realtime channel is disconnected"));
    }

    #[test]
    fn test_determine_overall_status() {
        let healthy = ServiceHealth {
            status: HealthStatus::Healthy,
            latency_ms: Some(1),
            message: None,
        };
        let degraded = check_channel(ChannelStatus::Connecting);
        let unhealthy = ServiceHealth {
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            message: Some("Connection failed".to_string()),
        };

        assert_eq!(determine_overall_status(&healthy, &healthy), HealthStatus::Healthy);
        assert_eq!(determine_overall_status(&healthy, &degraded), HealthStatus::Degraded);
        assert_eq!(determine_overall_status(&unhealthy, &healthy), HealthStatus::Unhealthy);
    }
}
