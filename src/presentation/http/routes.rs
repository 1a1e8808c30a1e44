//! Route Configuration
//!
//! Configures all HTTP routes of the UI bridge.

use axum::{
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Router,
};

use super::handlers;
use crate::infrastructure::metrics;
use crate::presentation::middleware::track_metrics;
use crate::presentation::websocket::ws_handler;
use crate::startup::AppState;

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_routes())
        // UI event feed
        .route("/events", get(ws_handler))
        // Health check endpoints
        .route("/health", get(handlers::health::health_check))
        .route("/health/live", get(handlers::health::liveness))
        .route("/health/ready", get(handlers::health::readiness))
        // Prometheus metrics endpoint
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(track_metrics))
        .with_state(state)
}

/// Prometheus metrics endpoint handler
async fn metrics_handler() -> impl IntoResponse {
    let metrics = metrics::gather_metrics();
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics,
    )
}

/// API v1 routes
fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/channel", channel_routes())
        .nest("/seniors", senior_routes())
        .nest("/alerts", alert_routes())
        .nest("/sessions", session_routes())
}

fn channel_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::channel::get_channel))
        .route("/connect", post(handlers::channel::connect_channel))
        .route("/disconnect", post(handlers::channel::disconnect_channel))
}

fn senior_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::seniors::list_seniors))
        .route("/refresh", post(handlers::seniors::refresh_seniors))
        .route(
            "/{senior_id}",
            get(handlers::seniors::get_senior).delete(handlers::seniors::delete_senior),
        )
        .route("/{senior_id}/sensors", get(handlers::seniors::get_sensors))
        .route("/{senior_id}/profile-image", get(handlers::seniors::get_profile_image))
}

fn alert_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::alerts::list_alerts)
                .post(handlers::alerts::record_alert)
                .delete(handlers::alerts::clear_alerts),
        )
        .route("/read-all", post(handlers::alerts::mark_all_read))
        .route("/{alert_id}/read", post(handlers::alerts::mark_read))
}

fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::sessions::list_sessions))
        .route(
            "/{senior_id}",
            get(handlers::sessions::get_session)
                .post(handlers::sessions::open_session)
                .delete(handlers::sessions::close_session),
        )
}
