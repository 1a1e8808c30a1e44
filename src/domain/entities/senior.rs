//! Monitored senior entity, risk status and the directory port.
//!
//! The backend delivers `health_info` in three shapes (plain string, array of
//! strings, or a JSON-encoded string of either). [`HealthInfo::classify`] is the
//! single place that ambiguity is resolved.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::shared::error::AppError;

/// Risk status shown for a senior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskStatus {
    Danger,
    Caution,
    #[default]
    Safe,
}

const DANGER_KEYWORDS: [&str; 2] = ["위험", "danger"];
const CAUTION_KEYWORDS: [&str; 3] = ["주의", "caution", "warning"];

impl RiskStatus {
    /// Exact label match, Korean or English. Returns `None` for anything else.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "위험" | "danger" => Some(Self::Danger),
            "주의" | "caution" | "warning" => Some(Self::Caution),
            "안전" | "safe" => Some(Self::Safe),
            _ => None,
        }
    }

    /// Keyword rule: any danger keyword wins, then any caution keyword,
    /// otherwise safe. Never fails.
    pub fn from_keywords(text: &str) -> Self {
        let lowered = text.to_lowercase();
        if DANGER_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            Self::Danger
        } else if CAUTION_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            Self::Caution
        } else {
            Self::Safe
        }
    }

    /// Exact label when possible, keyword rule otherwise. Labels such as
    /// `알수없음` fall through to safe.
    pub fn resolve(label: &str) -> Self {
        Self::parse(label).unwrap_or_else(|| Self::from_keywords(label))
    }

    /// Display label used in user-facing text.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Danger => "위험",
            Self::Caution => "주의",
            Self::Safe => "안전",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Danger => "danger",
            Self::Caution => "caution",
            Self::Safe => "safe",
        }
    }
}

impl std::fmt::Display for RiskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raw health information after ingress classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(untagged)]
pub enum HealthInfo {
    #[default]
    Absent,
    Text(String),
    List(Vec<String>),
}

impl HealthInfo {
    /// Resolve whichever shape the backend sent into one representation.
    pub fn classify(raw: Option<&Value>) -> Self {
        match raw {
            None | Some(Value::Null) => Self::Absent,
            Some(Value::String(s)) => Self::classify_text(s),
            Some(Value::Array(items)) => Self::from_items(items),
            Some(other) => Self::Text(other.to_string()),
        }
    }

    fn classify_text(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Self::Absent;
        }
        if trimmed.starts_with('[') || trimmed.starts_with('"') {
            match serde_json::from_str::<Value>(trimmed) {
                Ok(Value::Array(items)) => return Self::from_items(&items),
                Ok(Value::String(inner)) => return Self::classify_text(&inner),
                _ => {}
            }
        }
        Self::Text(trimmed.to_string())
    }

    fn from_items(items: &[Value]) -> Self {
        let entries: Vec<String> = items
            .iter()
            .filter_map(|item| match item {
                Value::Null => None,
                Value::String(s) => Some(s.trim().to_string()),
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect();

        if entries.is_empty() {
            Self::Absent
        } else {
            Self::List(entries)
        }
    }

    /// Default status derived from the payload by the keyword rule.
    pub fn derived_status(&self) -> RiskStatus {
        match self {
            Self::Absent => RiskStatus::Safe,
            Self::Text(text) => RiskStatus::from_keywords(text),
            Self::List(entries) => RiskStatus::from_keywords(&entries.join(" ")),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl<'de> Deserialize<'de> for HealthInfo {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(Self::classify(raw.as_ref()))
    }
}

/// Where the current status of a senior came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StatusSource {
    #[default]
    HealthInfo,
    Override,
    Push,
}

/// A senior under remote monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Senior {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub birth_date: Option<NaiveDate>,
    pub status: RiskStatus,
    pub status_source: StatusSource,
    pub health_info: HealthInfo,
    pub device_id: Option<String>,
    pub profile_image: Option<String>,
}

impl Senior {
    /// Create a senior whose status is derived from its health information.
    pub fn new(id: i64, name: impl Into<String>, health_info: HealthInfo) -> Self {
        let status = health_info.derived_status();
        Self {
            id,
            name: name.into(),
            address: String::new(),
            birth_date: None,
            status,
            status_source: StatusSource::HealthInfo,
            health_info,
            device_id: None,
            profile_image: None,
        }
    }

    /// Apply a status and record where it came from.
    pub fn apply_status(&mut self, status: RiskStatus, source: StatusSource) {
        self.status = status;
        self.status_source = source;
    }
}

/// External directory of seniors owned by the backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SeniorDirectory: Send + Sync {
    /// Full list of seniors assigned to the caregiver.
    async fn list_seniors(&self) -> Result<Vec<Senior>, AppError>;

    /// One senior, or `None` when the backend does not know the id.
    async fn get_senior(&self, id: i64) -> Result<Option<Senior>, AppError>;

    /// Delete a senior. `Ok(true)` means the backend acknowledged it.
    async fn delete_senior(&self, id: i64) -> Result<bool, AppError>;

    /// Profile image bytes.
    async fn profile_image(&self, id: i64) -> Result<Vec<u8>, AppError>;
}
