//! Behavioral baselining and deviation scoring.
//!
//! Reads the append-only activity log, builds hourly/weekday/action
//! distributions over an observation window, and scores deviations against
//! a historical baseline drawn from the 90 days preceding the window. Runs
//! out-of-band; never sits on the authentication critical path.

use chrono::{Datelike, Duration, Timelike, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Result, SecurityError};
use crate::models::{ActivityEvent, AlertSeverity, BehavioralBaseline};
use crate::store::SecurityStore;

pub const DEFAULT_WINDOW_DAYS: u32 = 30;
/// Historical baseline is drawn from this many days preceding the window.
pub const HISTORY_DAYS: i64 = 90;
/// Minimum historical entries before anomaly detection runs at all.
pub const MIN_HISTORY_EVENTS: usize = 10;
/// Minimum trailing-90-day entries required to persist a baseline.
pub const BASELINE_MIN_EVENTS: u64 = 50;

const TOP_ACTIONS: usize = 20;
const BASELINE_TOP_ACTIONS: usize = 10;
/// Hour-of-day share (percent) above which an hour counts as typical.
const TYPICAL_HOUR_SHARE: f64 = 5.0;
/// Window volume above this multiple of the historical average is unusual.
const VOLUME_MULTIPLIER: f64 = 2.0;
/// Mean-hour drift beyond this many hours is an unusual time pattern.
const TIME_DRIFT_HOURS: f64 = 4.0;

/// Actions whose presence in the top-20 adds risk.
const SENSITIVE_ACTIONS: [&str; 4] = ["DELETE", "EXPORT", "BULK_DOWNLOAD", "PERMISSION_CHANGE"];

const RISK_HIGH: u8 = 70;
const RISK_MODERATE: u8 = 40;

/// One histogram bucket (hour of day or day of week).
#[derive(Debug, Clone, Serialize)]
pub struct BucketStat {
    pub bucket: u32,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionStat {
    pub action: String,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BehaviorAnomalyKind {
    UnusualActivityVolume,
    NewActions,
    UnusualTimePattern,
}

impl BehaviorAnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorAnomalyKind::UnusualActivityVolume => "UNUSUAL_ACTIVITY_VOLUME",
            BehaviorAnomalyKind::NewActions => "NEW_ACTIONS",
            BehaviorAnomalyKind::UnusualTimePattern => "UNUSUAL_TIME_PATTERN",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BehaviorAnomaly {
    pub kind: BehaviorAnomalyKind,
    pub severity: AlertSeverity,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub user_id: Uuid,
    pub window_days: u32,
    pub total_events: u64,
    /// 24 buckets, hour 0 first.
    pub hourly_distribution: Vec<BucketStat>,
    /// 7 buckets, Sunday first.
    pub weekday_distribution: Vec<BucketStat>,
    pub top_actions: Vec<ActionStat>,
    pub anomalies: Vec<BehaviorAnomaly>,
    pub risk_score: u8,
    pub recommendations: Vec<String>,
}

/// Analysis either produces a report or reports that the user has no
/// activity in the window. The latter is an expected outcome, not an error.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    InsufficientData,
    Report(AnalysisReport),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BaselineOutcome {
    InsufficientData { found: u64, required: u64 },
    Created(BehavioralBaseline),
}

pub struct BehaviorBaselineEngine {
    store: Arc<dyn SecurityStore>,
}

impl BehaviorBaselineEngine {
    pub fn new(store: Arc<dyn SecurityStore>) -> Self {
        Self { store }
    }

    /// Analyze a user's activity over the last `window_days` (default 30).
    ///
    /// Supports cooperative cancellation between scan phases since
    /// historical windows can be large.
    pub async fn analyze(
        &self,
        user_id: Uuid,
        window_days: Option<u32>,
        cancel: Option<&CancellationToken>,
    ) -> Result<AnalysisOutcome> {
        let window_days = window_days.unwrap_or(DEFAULT_WINDOW_DAYS).max(1);
        let now = Utc::now();
        let window_start = now - Duration::days(window_days as i64);

        let events = self
            .store
            .activity_events(user_id, window_start, now)
            .await?;
        if events.is_empty() {
            return Ok(AnalysisOutcome::InsufficientData);
        }
        check_cancelled(cancel)?;

        let total = events.len() as u64;
        let hourly_distribution = hour_histogram(&events);
        let weekday_distribution = weekday_histogram(&events);
        let top_actions = action_table(&events, TOP_ACTIONS);

        let history_start = window_start - Duration::days(HISTORY_DAYS);
        let history = self
            .store
            .activity_events(user_id, history_start, window_start)
            .await?;
        check_cancelled(cancel)?;

        let anomalies = if history.len() >= MIN_HISTORY_EVENTS {
            detect_anomalies(&events, &history, window_days)
        } else {
            tracing::debug!(
                user_id = %user_id,
                history_events = history.len(),
                "Not enough history for anomaly detection, skipping"
            );
            Vec::new()
        };

        let risk_score = risk_score(&anomalies, &top_actions);
        let recommendations = recommendations(risk_score, &anomalies);

        metrics::histogram!("behavior_risk_score").record(risk_score as f64);
        tracing::info!(
            user_id = %user_id,
            window_days = window_days,
            events = total,
            anomalies = anomalies.len(),
            risk_score = risk_score,
            "Behavior analysis complete"
        );

        Ok(AnalysisOutcome::Report(AnalysisReport {
            user_id,
            window_days,
            total_events: total,
            hourly_distribution,
            weekday_distribution,
            top_actions,
            anomalies,
            risk_score,
            recommendations,
        }))
    }

    /// Snapshot a fresh behavioral baseline from the trailing 90 days.
    /// Requires at least [`BASELINE_MIN_EVENTS`] entries.
    pub async fn create_baseline(&self, user_id: Uuid) -> Result<BaselineOutcome> {
        let now = Utc::now();
        let from = now - Duration::days(HISTORY_DAYS);
        let events = self.store.activity_events(user_id, from, now).await?;

        let found = events.len() as u64;
        if found < BASELINE_MIN_EVENTS {
            return Ok(BaselineOutcome::InsufficientData {
                found,
                required: BASELINE_MIN_EVENTS,
            });
        }

        let common_actions = action_table(&events, BASELINE_TOP_ACTIONS)
            .into_iter()
            .map(|stat| stat.action)
            .collect();
        let typical_hours = hour_histogram(&events)
            .into_iter()
            .filter(|stat| stat.percentage > TYPICAL_HOUR_SHARE)
            .map(|stat| stat.bucket)
            .collect();

        let baseline = BehavioralBaseline {
            baseline_id: Uuid::new_v4(),
            user_id,
            avg_activity_per_day: round2(found as f64 / HISTORY_DAYS as f64),
            common_actions,
            typical_hours,
            data_points: found,
            created_utc: now,
        };
        self.store.insert_baseline(&baseline).await?;

        tracing::info!(
            user_id = %user_id,
            data_points = found,
            "Behavioral baseline created"
        );
        Ok(BaselineOutcome::Created(baseline))
    }
}

fn check_cancelled(cancel: Option<&CancellationToken>) -> Result<()> {
    if cancel.is_some_and(|token| token.is_cancelled()) {
        return Err(SecurityError::Cancelled);
    }
    Ok(())
}

fn hour_histogram(events: &[ActivityEvent]) -> Vec<BucketStat> {
    let mut counts = [0u64; 24];
    for event in events {
        counts[event.occurred_utc.hour() as usize] += 1;
    }
    bucket_stats(&counts, events.len() as u64)
}

/// Day-of-week histogram, bucket 0 = Sunday.
fn weekday_histogram(events: &[ActivityEvent]) -> Vec<BucketStat> {
    let mut counts = [0u64; 7];
    for event in events {
        counts[event.occurred_utc.weekday().num_days_from_sunday() as usize] += 1;
    }
    bucket_stats(&counts, events.len() as u64)
}

fn bucket_stats(counts: &[u64], total: u64) -> Vec<BucketStat> {
    counts
        .iter()
        .enumerate()
        .map(|(bucket, &count)| BucketStat {
            bucket: bucket as u32,
            count,
            percentage: percentage(count, total),
        })
        .collect()
}

fn action_table(events: &[ActivityEvent], limit: usize) -> Vec<ActionStat> {
    // BTreeMap keeps equal-count actions in a deterministic order.
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for event in events {
        *counts.entry(event.action.as_str()).or_insert(0) += 1;
    }
    let total = events.len() as u64;
    let mut stats: Vec<ActionStat> = counts
        .into_iter()
        .map(|(action, count)| ActionStat {
            action: action.to_string(),
            count,
            percentage: percentage(count, total),
        })
        .collect();
    stats.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.action.cmp(&b.action)));
    stats.truncate(limit);
    stats
}

fn detect_anomalies(
    window: &[ActivityEvent],
    history: &[ActivityEvent],
    window_days: u32,
) -> Vec<BehaviorAnomaly> {
    let mut anomalies = Vec::new();

    let window_avg = window.len() as f64 / window_days as f64;
    let history_avg = history.len() as f64 / HISTORY_DAYS as f64;
    if history_avg > 0.0 && window_avg > history_avg * VOLUME_MULTIPLIER {
        anomalies.push(BehaviorAnomaly {
            kind: BehaviorAnomalyKind::UnusualActivityVolume,
            severity: AlertSeverity::Medium,
            description: format!(
                "Daily activity ({:.1}/day) is more than double the historical average ({:.1}/day)",
                window_avg, history_avg
            ),
        });
    }

    let known: HashSet<&str> = history.iter().map(|e| e.action.as_str()).collect();
    let mut new_actions: Vec<&str> = window
        .iter()
        .map(|e| e.action.as_str())
        .filter(|action| !known.contains(action))
        .collect::<HashSet<&str>>()
        .into_iter()
        .collect();
    if !new_actions.is_empty() {
        new_actions.sort_unstable();
        anomalies.push(BehaviorAnomaly {
            kind: BehaviorAnomalyKind::NewActions,
            severity: AlertSeverity::Low,
            description: format!(
                "Actions never seen historically: {}",
                new_actions.join(", ")
            ),
        });
    }

    let window_mean = mean_hour(window);
    let history_mean = mean_hour(history);
    if (window_mean - history_mean).abs() > TIME_DRIFT_HOURS {
        anomalies.push(BehaviorAnomaly {
            kind: BehaviorAnomalyKind::UnusualTimePattern,
            severity: AlertSeverity::Medium,
            description: format!(
                "Mean activity hour shifted from {:.1} to {:.1}",
                history_mean, window_mean
            ),
        });
    }

    anomalies
}

fn mean_hour(events: &[ActivityEvent]) -> f64 {
    if events.is_empty() {
        return 0.0;
    }
    let sum: u64 = events.iter().map(|e| e.occurred_utc.hour() as u64).sum();
    sum as f64 / events.len() as f64
}

fn risk_score(anomalies: &[BehaviorAnomaly], top_actions: &[ActionStat]) -> u8 {
    let mut score: u32 = 0;
    for anomaly in anomalies {
        score += match anomaly.severity {
            AlertSeverity::Critical => 30,
            AlertSeverity::High => 20,
            AlertSeverity::Medium => 10,
            AlertSeverity::Low => 5,
        };
    }
    for stat in top_actions {
        let action = stat.action.to_uppercase();
        if SENSITIVE_ACTIONS.iter().any(|s| action.contains(s)) {
            score += 5;
        }
    }
    score.min(100) as u8
}

fn recommendations(risk_score: u8, anomalies: &[BehaviorAnomaly]) -> Vec<String> {
    let mut lines = Vec::new();
    if risk_score > RISK_HIGH {
        lines.push(
            "High risk: review this account's recent activity and consider requiring \
             re-authentication"
                .to_string(),
        );
    } else if risk_score > RISK_MODERATE {
        lines.push("Moderate risk: monitor this account's activity more closely".to_string());
    }

    // One recommendation per anomaly kind, however many instances fired.
    let kinds: Vec<BehaviorAnomalyKind> = {
        let mut seen = HashSet::new();
        anomalies
            .iter()
            .map(|a| a.kind)
            .filter(|kind| seen.insert(*kind))
            .collect()
    };
    for kind in kinds {
        lines.push(match kind {
            BehaviorAnomalyKind::UnusualActivityVolume => {
                "Verify that the increase in activity volume is expected for this user".to_string()
            }
            BehaviorAnomalyKind::NewActions => {
                "Confirm the newly observed action types match the user's responsibilities"
                    .to_string()
            }
            BehaviorAnomalyKind::UnusualTimePattern => {
                "Check whether activity outside the user's usual hours is legitimate".to_string()
            }
        });
    }
    lines
}

fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(count as f64 / total as f64 * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
