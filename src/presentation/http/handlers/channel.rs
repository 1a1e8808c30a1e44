//! Realtime Channel Handlers

use axum::{extract::State, http::StatusCode, Json};

use crate::application::dto::response::ChannelResponse;
use crate::domain::SignalingChannel;
use crate::shared::error::AppError;
use crate::startup::AppState;

fn describe(state: &AppState) -> ChannelResponse {
    let status = state.channel.status();
    ChannelResponse {
        status: status.as_str().to_string(),
        connected: state.channel.is_connected(),
        socket_id: state.channel.socket_id(),
    }
}

/// Current channel status
pub async fn get_channel(State(state): State<AppState>) -> Json<ChannelResponse> {
    Json(describe(&state))
}

/// Connect with the configured endpoint and credential. Reuses a live connection.
pub async fn connect_channel(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<ChannelResponse>), AppError> {
    state
        .channel
        .connect(&state.settings.backend.socket_url, &state.settings.backend.access_token)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(describe(&state))))
}

pub async fn disconnect_channel(State(state): State<AppState>) -> Json<ChannelResponse> {
    state.channel.disconnect();
    Json(describe(&state))
}
