//! Sensor readings and the inbound payload classifier.
//!
//! Three payload shapes reach the client:
//!
//! ```text
//! bulk     { senior_id, sensors: [{ sensor_id?, sensor_type, location, value, last_updated }] }
//! single   { senior_id, sensor_id?, sensor_type, location, value, last_updated }
//! api key  { api_key, senior_id, sensor_data: [{ sensor_type: "door_bedroom", sensor_value, timestamp }] }
//! ```
//!
//! All of them normalize to a [`SensorSnapshot`] keyed by `{sensor_type}_{location}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One sensor reading in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorRecord {
    #[serde(default)]
    pub sensor_id: Option<String>,
    pub sensor_type: String,
    pub location: String,
    pub value: bool,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl SensorRecord {
    /// Canonical key, `{sensor_type}_{location}`.
    pub fn key(&self) -> String {
        format!("{}_{}", self.sensor_type, self.location)
    }
}

/// Latest reading per sensor key for one senior.
pub type SensorSnapshot = BTreeMap<String, SensorRecord>;

/// Why a payload was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SensorPayloadError {
    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload has no senior id")]
    MissingSeniorId,

    #[error("unrecognized sensor payload shape")]
    UnrecognizedShape,

    #[error("malformed sensor entry: {0}")]
    MalformedEntry(String),
}

/// A classified sensor payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorPayload {
    Bulk { senior_id: i64, sensors: Vec<SensorRecord> },
    Single { senior_id: i64, sensor: SensorRecord },
    ApiKey { senior_id: i64, sensors: Vec<SensorRecord> },
}

impl SensorPayload {
    /// Decide which of the known shapes `raw` is.
    pub fn classify(raw: &Value) -> Result<Self, SensorPayloadError> {
        let object = raw.as_object().ok_or(SensorPayloadError::NotAnObject)?;

        if let Some(entries) = object.get("sensor_data") {
            let entries = entries
                .as_array()
                .ok_or(SensorPayloadError::UnrecognizedShape)?;
            let senior_id = senior_id_of(object).ok_or(SensorPayloadError::MissingSeniorId)?;
            let sensors = entries
                .iter()
                .map(api_key_entry)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Self::ApiKey { senior_id, sensors });
        }

        if let Some(entries) = object.get("sensors") {
            let entries = entries
                .as_array()
                .ok_or(SensorPayloadError::UnrecognizedShape)?;
            let senior_id = senior_id_of(object).ok_or(SensorPayloadError::MissingSeniorId)?;
            let sensors = entries
                .iter()
                .map(|entry| {
                    entry
                        .as_object()
                        .ok_or_else(|| SensorPayloadError::MalformedEntry(entry.to_string()))
                        .and_then(canonical_entry)
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Self::Bulk { senior_id, sensors });
        }

        if object.contains_key("sensor_type") {
            let senior_id = senior_id_of(object).ok_or(SensorPayloadError::MissingSeniorId)?;
            let sensor = canonical_entry(object)?;
            return Ok(Self::Single { senior_id, sensor });
        }

        Err(SensorPayloadError::UnrecognizedShape)
    }

    pub fn senior_id(&self) -> i64 {
        match self {
            Self::Bulk { senior_id, .. }
            | Self::Single { senior_id, .. }
            | Self::ApiKey { senior_id, .. } => *senior_id,
        }
    }

    /// Canonical snapshot for the payload's senior.
    pub fn normalize(self) -> (i64, SensorSnapshot) {
        let (senior_id, sensors) = match self {
            Self::Bulk { senior_id, sensors } | Self::ApiKey { senior_id, sensors } => {
                (senior_id, sensors)
            }
            Self::Single { senior_id, sensor } => (senior_id, vec![sensor]),
        };
        let snapshot = sensors.into_iter().map(|s| (s.key(), s)).collect();
        (senior_id, snapshot)
    }
}

fn senior_id_of(object: &Map<String, Value>) -> Option<i64> {
    match object.get("senior_id")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Accepts `true`/`false`, `0`/`1` and their string forms.
fn flexible_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "1" | "true" | "on" | "open" => Some(true),
            "0" | "false" | "off" | "closed" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn canonical_entry(object: &Map<String, Value>) -> Result<SensorRecord, SensorPayloadError> {
    let malformed = || SensorPayloadError::MalformedEntry(Value::Object(object.clone()).to_string());

    let sensor_type = string_field(object, "sensor_type").ok_or_else(malformed)?;
    let location = string_field(object, "location").ok_or_else(malformed)?;
    let value = object
        .get("value")
        .and_then(flexible_bool)
        .ok_or_else(malformed)?;

    Ok(SensorRecord {
        sensor_id: string_field(object, "sensor_id"),
        sensor_type,
        location,
        value,
        last_updated: string_field(object, "last_updated"),
        description: string_field(object, "event_description"),
    })
}

fn api_key_entry(entry: &Value) -> Result<SensorRecord, SensorPayloadError> {
    let malformed = || SensorPayloadError::MalformedEntry(entry.to_string());
    let object = entry.as_object().ok_or_else(malformed)?;

    let combined = string_field(object, "sensor_type").ok_or_else(malformed)?;
    let (sensor_type, location) = match string_field(object, "location") {
        Some(location) => (combined, location),
        None => match combined.split_once('_') {
            Some((kind, location)) => (kind.to_string(), location.to_string()),
            None => (combined, "unknown".to_string()),
        },
    };
    let value = object
        .get("sensor_value")
        .or_else(|| object.get("value"))
        .and_then(flexible_bool)
        .ok_or_else(malformed)?;

    Ok(SensorRecord {
        sensor_id: string_field(object, "sensor_id"),
        sensor_type,
        location,
        value,
        last_updated: string_field(object, "timestamp")
            .or_else(|| string_field(object, "last_updated")),
        description: string_field(object, "event_description"),
    })
}
