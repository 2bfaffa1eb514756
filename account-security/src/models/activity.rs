//! Activity-log records and behavioral baseline snapshots.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One entry from the append-only activity log. The engine only reads
/// these; writes happen in the application layers that perform the actions.
#[derive(Debug, Clone)]
pub struct ActivityEvent {
    pub user_id: Uuid,
    pub action: String,
    pub occurred_utc: DateTime<Utc>,
}

impl ActivityEvent {
    pub fn new(user_id: Uuid, action: impl Into<String>, occurred_utc: DateTime<Utc>) -> Self {
        Self {
            user_id,
            action: action.into(),
            occurred_utc,
        }
    }
}

/// Periodic statistical summary of a user's activity. The latest snapshot
/// per user is authoritative.
#[derive(Debug, Clone, Serialize)]
pub struct BehavioralBaseline {
    pub baseline_id: Uuid,
    pub user_id: Uuid,
    pub avg_activity_per_day: f64,
    /// Most frequent action names, highest count first.
    pub common_actions: Vec<String>,
    /// Hours of day (0-23) carrying more than a 5% share of activity.
    pub typical_hours: Vec<u32>,
    pub data_points: u64,
    pub created_utc: DateTime<Utc>,
}
