//! Alert entity and emergency codes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Alert category, mirrors the feed's badge colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCategory {
    Success,
    Warning,
    Error,
    Info,
}

/// One user-facing notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub category: AlertCategory,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub senior_id: Option<i64>,
    pub read: bool,
}

impl Alert {
    /// Same (title, message, senior id) as a pending alert.
    pub fn is_duplicate_of(&self, candidate: &NewAlert) -> bool {
        self.title == candidate.title
            && self.message == candidate.message
            && self.senior_id == candidate.senior_id
    }
}

/// Alert content before the sink assigns an id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAlert {
    pub category: AlertCategory,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub senior_id: Option<i64>,
}

impl NewAlert {
    pub fn new(category: AlertCategory, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category,
            title: title.into(),
            message: message.into(),
            senior_id: None,
        }
    }

    pub fn for_senior(mut self, senior_id: i64) -> Self {
        self.senior_id = Some(senior_id);
        self
    }

    pub fn into_alert(self, id: Uuid, created_at: DateTime<Utc>) -> Alert {
        Alert {
            id,
            category: self.category,
            title: self.title,
            message: self.message,
            created_at,
            senior_id: self.senior_id,
            read: false,
        }
    }
}

/// Emergency codes reported by the monitoring hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmergencyKind {
    /// E-001
    EmergencyStop,
    /// E-002
    ObstacleCollision,
    /// E-003
    FallDetected,
    /// E-004
    LowBatteryShutdown,
    Other(String),
}

impl EmergencyKind {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "E-001" => Self::EmergencyStop,
            "E-002" => Self::ObstacleCollision,
            "E-003" => Self::FallDetected,
            "E-004" => Self::LowBatteryShutdown,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::EmergencyStop => "비상 정지 버튼이 눌렸습니다",
            Self::ObstacleCollision => "장애물 충돌이 감지되었습니다",
            Self::FallDetected => "낙상이 감지되었습니다",
            Self::LowBatteryShutdown => "배터리 부족으로 기기가 종료되었습니다",
            Self::Other(text) if text.is_empty() => "긴급 상황이 발생했습니다",
            Self::Other(text) => text,
        }
    }
}
