//! Application Error Types
//!
//! Centralized error handling with Axum integration.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Channel not connected")]
    NotConnected,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Negotiation error: {0}")]
    Negotiation(String),

    #[error("Backend returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("WebRTC error: {0}")]
    WebRtc(#[from] webrtc::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// True when the failure means the backend could not be reached at all.
    pub fn is_connectivity(&self) -> bool {
        match self {
            AppError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            AppError::Transport(_) | AppError::NotConnected => true,
            _ => false,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, 10001, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, 10002, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, 10003, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, 10005, msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, 10007, msg.clone()),
            AppError::NotConnected => (
                StatusCode::SERVICE_UNAVAILABLE,
                10008,
                "Realtime channel is not connected".into(),
            ),
            AppError::Transport(msg) => {
                tracing::warn!("Transport error: {}", msg);
                (StatusCode::BAD_GATEWAY, 10009, msg.clone())
            }
            AppError::Negotiation(msg) => {
                tracing::warn!("Negotiation error: {}", msg);
                (StatusCode::BAD_GATEWAY, 10010, msg.clone())
            }
            AppError::Upstream { status, message } => {
                tracing::warn!(status, "Backend error: {}", message);
                (StatusCode::BAD_GATEWAY, 10011, message.clone())
            }
            AppError::Http(e) => {
                tracing::warn!("Backend request failed: {}", e);
                (StatusCode::BAD_GATEWAY, 10011, "Backend unavailable".into())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, 10000, "Internal server error".into())
            }
            AppError::Redis(e) => {
                tracing::error!("Redis error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, 10000, "Internal server error".into())
            }
            AppError::WebRtc(e) => {
                tracing::error!("WebRTC error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, 10000, "Internal server error".into())
            }
            AppError::Serialization(e) => {
                tracing::error!("Serialization error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, 10000, "Internal server error".into())
            }
            AppError::Io(e) => {
                tracing::error!("I/O error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, 10000, "Internal server error".into())
            }
        };

        let body = ErrorResponse { code, message };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404() {
        let response = AppError::NotFound("senior 7".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_not_connected_maps_to_503() {
        let response = AppError::NotConnected.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_transport_is_connectivity() {
        assert!(AppError::Transport("reset".into()).is_connectivity());
        assert!(!AppError::NotFound("x".into()).is_connectivity());
    }
}
