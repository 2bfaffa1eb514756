//! Security alert and anomaly-signal models.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Alert severity, ordered least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "LOW",
            AlertSeverity::Medium => "MEDIUM",
            AlertSeverity::High => "HIGH",
            AlertSeverity::Critical => "CRITICAL",
        }
    }
}

/// Independent signals raised while inspecting a freshly created session.
/// Signals accumulate; a session can fire several at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalySignal {
    NewDevice,
    NewLocation,
    RapidLocationChange,
    MultipleConcurrentSessions,
}

impl AnomalySignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalySignal::NewDevice => "NEW_DEVICE",
            AnomalySignal::NewLocation => "NEW_LOCATION",
            AnomalySignal::RapidLocationChange => "RAPID_LOCATION_CHANGE",
            AnomalySignal::MultipleConcurrentSessions => "MULTIPLE_CONCURRENT_SESSIONS",
        }
    }
}

/// Alert record handed to the external alerting collaborator. Storage and
/// resolution workflow belong to that collaborator, not this engine.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityAlert {
    pub alert_id: Uuid,
    pub user_id: Uuid,
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub description: String,
    /// Structured context (signal list, session metadata, anomaly details).
    pub details: serde_json::Value,
    pub is_resolved: bool,
}

impl SecurityAlert {
    pub fn new(
        user_id: Uuid,
        alert_type: impl Into<String>,
        severity: AlertSeverity,
        description: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            alert_id: Uuid::new_v4(),
            user_id,
            alert_type: alert_type.into(),
            severity,
            description: description.into(),
            details,
            is_resolved: false,
        }
    }
}
