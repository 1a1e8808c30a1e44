//! Response DTOs
//!
//! Data structures for UI bridge response bodies.

use serde::Serialize;

use crate::domain::{Alert, HealthInfo, Senior, SensorRecord, SensorSnapshot};

/// Senior response
#[derive(Debug, Serialize)]
pub struct SeniorResponse {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub birth_date: Option<String>,
    pub status: String,
    /// Korean display label
    pub status_label: String,
    pub status_source: String,
    pub health_info: Vec<String>,
    pub device_id: Option<String>,
    pub profile_image: Option<String>,
}

impl From<Senior> for SeniorResponse {
    fn from(senior: Senior) -> Self {
        let status_source = match serde_json::to_value(senior.status_source) {
            Ok(serde_json::Value::String(source)) => source,
            _ => String::new(),
        };
        let health_info = match senior.health_info {
            HealthInfo::Absent => Vec::new(),
            HealthInfo::Text(text) => vec![text],
            HealthInfo::List(entries) => entries,
        };

        Self {
            id: senior.id,
            name: senior.name,
            address: senior.address,
            birth_date: senior.birth_date.map(|d| d.format("%Y-%m-%d").to_string()),
            status: senior.status.as_str().to_string(),
            status_label: senior.status.label().to_string(),
            status_source,
            health_info,
            device_id: senior.device_id,
            profile_image: senior.profile_image,
        }
    }
}

/// Senior list response
#[derive(Debug, Serialize)]
pub struct SeniorListResponse {
    pub seniors: Vec<SeniorResponse>,
    pub total: usize,
}

impl From<Vec<Senior>> for SeniorListResponse {
    fn from(seniors: Vec<Senior>) -> Self {
        let seniors: Vec<SeniorResponse> = seniors.into_iter().map(Into::into).collect();
        Self {
            total: seniors.len(),
            seniors,
        }
    }
}

/// Senior deletion result
#[derive(Debug, Serialize)]
pub struct DeleteSeniorResponse {
    pub senior_id: i64,
    /// `false` when the backend was unreachable or refused
    pub removed: bool,
}

/// Sensor snapshot response
#[derive(Debug, Serialize)]
pub struct SensorListResponse {
    pub senior_id: i64,
    pub sensors: Vec<SensorRecord>,
}

impl SensorListResponse {
    pub fn new(senior_id: i64, snapshot: SensorSnapshot) -> Self {
        Self {
            senior_id,
            sensors: snapshot.into_values().collect(),
        }
    }
}

/// Alert feed response
#[derive(Debug, Serialize)]
pub struct AlertListResponse {
    pub alerts: Vec<Alert>,
    pub unread: usize,
}

/// Number of entries an operation touched
#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub updated: usize,
}

/// Realtime channel state
#[derive(Debug, Serialize)]
pub struct ChannelResponse {
    pub status: String,
    pub connected: bool,
    pub socket_id: Option<String>,
}
