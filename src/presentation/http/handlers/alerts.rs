//! Alert Handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use crate::application::dto::request::RecordAlertRequest;
use crate::application::dto::response::{AlertListResponse, CountResponse};
use crate::shared::error::AppError;
use crate::shared::validation::validated;
use crate::startup::AppState;

/// Alert feed, newest first
pub async fn list_alerts(State(state): State<AppState>) -> Json<AlertListResponse> {
    let alerts = state.alerts.list().await;
    let unread = alerts.iter().filter(|a| !a.read).count();
    Json(AlertListResponse { alerts, unread })
}

/// Record an alert raised by the UI. A duplicate inside the window is
/// answered with 204.
pub async fn record_alert(
    State(state): State<AppState>,
    Json(body): Json<RecordAlertRequest>,
) -> Result<Response, AppError> {
    let body = validated(body)?;

    Ok(match state.alerts.record(body.into()).await {
        Some(alert) => (StatusCode::CREATED, Json(alert)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

/// Mark one alert read
pub async fn mark_read(
    State(state): State<AppState>,
    Path(alert_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.alerts.mark_read(alert_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Alert {alert_id}")))
    }
}

/// Mark every alert read
pub async fn mark_all_read(State(state): State<AppState>) -> Json<CountResponse> {
    let updated = state.alerts.mark_all_read().await;
    Json(CountResponse { updated })
}

/// Drop the whole feed
pub async fn clear_alerts(State(state): State<AppState>) -> StatusCode {
    state.alerts.clear().await;
    StatusCode::NO_CONTENT
}
