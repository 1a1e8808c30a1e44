//! Request DTOs
//!
//! Data structures for UI bridge request bodies and query strings.

use serde::Deserialize;
use validator::Validate;

use crate::domain::{AlertCategory, NewAlert};

/// Ad-hoc alert raised by the UI layer
#[derive(Debug, Deserialize, Validate)]
pub struct RecordAlertRequest {
    pub category: AlertCategory,

    #[validate(length(min = 1, max = 100, message = "Title must be 1-100 characters"))]
    pub title: String,

    #[validate(length(max = 500, message = "Message must be at most 500 characters"))]
    #[serde(default)]
    pub message: String,

    #[validate(range(min = 1, message = "Senior id must be positive"))]
    pub senior_id: Option<i64>,
}

impl From<RecordAlertRequest> for NewAlert {
    fn from(request: RecordAlertRequest) -> Self {
        let alert = NewAlert::new(request.category, request.title, request.message);
        match request.senior_id {
            Some(id) => alert.for_senior(id),
            None => alert,
        }
    }
}

/// Senior list query parameters
#[derive(Debug, Default, Deserialize)]
pub struct SeniorQueryParams {
    /// `all`, `danger`, `caution`, `safe` or a Korean label
    pub status: Option<String>,
}
