//! Senior Handlers

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde_json::json;

use crate::application::dto::request::SeniorQueryParams;
use crate::application::dto::response::{
    CountResponse, DeleteSeniorResponse, SensorListResponse, SeniorListResponse, SeniorResponse,
};
use crate::application::services::StatusFilter;
use crate::domain::events::client;
use crate::domain::SignalingChannel;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// List reconciled seniors, optionally filtered by status
pub async fn list_seniors(
    State(state): State<AppState>,
    Query(params): Query<SeniorQueryParams>,
) -> Result<Json<SeniorListResponse>, AppError> {
    let filter = match params.status.as_deref() {
        None => StatusFilter::All,
        Some(raw) => StatusFilter::parse(raw)
            .ok_or_else(|| AppError::BadRequest(format!("Unknown status filter: {raw}")))?,
    };

    Ok(Json(state.reconciler.filtered_by(filter).into()))
}

/// Re-fetch the senior list from the backend
pub async fn refresh_seniors(
    State(state): State<AppState>,
) -> Result<Json<CountResponse>, AppError> {
    let updated = state.reconciler.load_initial().await?;
    Ok(Json(CountResponse { updated }))
}

/// Get one senior
pub async fn get_senior(
    State(state): State<AppState>,
    Path(senior_id): Path<i64>,
) -> Result<Json<SeniorResponse>, AppError> {
    state
        .reconciler
        .get(senior_id)
        .map(|senior| Json(senior.into()))
        .ok_or_else(|| AppError::NotFound(format!("Senior {senior_id}")))
}

/// Delete a senior through the backend
pub async fn delete_senior(
    State(state): State<AppState>,
    Path(senior_id): Path<i64>,
) -> Result<Json<DeleteSeniorResponse>, AppError> {
    let removed = state.reconciler.remove_senior(senior_id).await?;
    Ok(Json(DeleteSeniorResponse { senior_id, removed }))
}

/// Latest sensor readings, and ask the server for a fresh push
pub async fn get_sensors(
    State(state): State<AppState>,
    Path(senior_id): Path<i64>,
) -> Json<SensorListResponse> {
    state
        .channel
        .emit(client::REQUEST_SENSOR_STATUS, vec![json!(senior_id)]);
    let snapshot = state.reconciler.sensor_snapshot(senior_id).await;
    Json(SensorListResponse::new(senior_id, snapshot))
}

/// Profile image bytes
pub async fn get_profile_image(
    State(state): State<AppState>,
    Path(senior_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let bytes = state.reconciler.profile_image(senior_id).await?;
    Ok(([(header::CONTENT_TYPE, image_content_type(&bytes))], bytes))
}

fn image_content_type(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_content_type_sniffing() {
        assert_eq!(image_content_type(&[0x89, b'P', b'N', b'G', 0x0D]), "image/png");
        assert_eq!(image_content_type(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(image_content_type(b"hello"), "application/octet-stream");
    }
}
