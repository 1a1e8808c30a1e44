//! Live Video Session Handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::application::services::SessionSnapshot;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// Open a viewing session, or nudge the live one
pub async fn open_session(
    State(state): State<AppState>,
    Path(senior_id): Path<i64>,
) -> (StatusCode, Json<SessionSnapshot>) {
    (StatusCode::ACCEPTED, Json(state.sessions.open(senior_id)))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(senior_id): Path<i64>,
) -> Result<Json<SessionSnapshot>, AppError> {
    state
        .sessions
        .snapshot(senior_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Session for senior {senior_id}")))
}

pub async fn close_session(
    State(state): State<AppState>,
    Path(senior_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if state.sessions.close(senior_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Session for senior {senior_id}")))
    }
}

pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionSnapshot>> {
    Json(state.sessions.list())
}
