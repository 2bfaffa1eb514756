//! Session anomaly detection.
//!
//! Runs synchronously inside session creation but is side-effect-only:
//! signals become one bundled alert plus a user notification, dispatched
//! fire-and-forget. Detection failures are logged and swallowed; they never
//! block a login.

use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;

use crate::geo::is_resolved_location;
use crate::models::{AlertSeverity, AnomalySignal, SecurityAlert, UserSession};
use crate::services::alerts::{AlertDispatcher, UserNotification};
use crate::store::{SecurityStore, StoreError};

/// History considered when judging a new session.
pub const RECENT_WINDOW_DAYS: i64 = 7;
pub const RECENT_SESSION_LIMIT: u32 = 10;

/// Active sessions on other devices needed to flag concurrent use.
const CONCURRENT_DEVICE_THRESHOLD: usize = 2;

const HOUR_SECONDS: i64 = 3600;

pub struct SessionAnomalyDetector {
    store: Arc<dyn SecurityStore>,
    dispatcher: AlertDispatcher,
}

impl SessionAnomalyDetector {
    pub fn new(store: Arc<dyn SecurityStore>, dispatcher: AlertDispatcher) -> Self {
        Self { store, dispatcher }
    }

    /// Inspect a freshly created session and emit an alert when anything
    /// fires. Never fails the caller.
    pub async fn inspect(&self, session: &UserSession) -> Vec<AnomalySignal> {
        let signals = match self.detect(session).await {
            Ok(signals) => signals,
            Err(e) => {
                tracing::error!(
                    user_id = %session.user_id,
                    error = %e,
                    "Session anomaly detection failed; continuing login"
                );
                return Vec::new();
            }
        };

        if !signals.is_empty() {
            metrics::counter!("session_anomalies_total").increment(signals.len() as u64);
            self.emit(session, &signals);
        }
        signals
    }

    /// Evaluate all rules independently; signals accumulate.
    async fn detect(&self, session: &UserSession) -> Result<Vec<AnomalySignal>, StoreError> {
        let now = Utc::now();
        let since = now - Duration::days(RECENT_WINDOW_DAYS);
        let recent = self
            .store
            .recent_sessions(
                session.user_id,
                since,
                RECENT_SESSION_LIMIT,
                Some(session.session_id),
            )
            .await?;

        let mut signals = Vec::new();

        if !recent
            .iter()
            .any(|r| r.device_fingerprint == session.device_fingerprint)
        {
            signals.push(AnomalySignal::NewDevice);
        }

        if is_resolved_location(&session.location)
            && !recent.iter().any(|r| r.location == session.location)
        {
            signals.push(AnomalySignal::NewLocation);
        }

        // `recent` is ordered newest-first, so the head is the most recent
        // prior session.
        if let Some(previous) = recent.first() {
            let delta = (session.created_utc - previous.created_utc).num_seconds();
            if is_resolved_location(&previous.location)
                && is_resolved_location(&session.location)
                && previous.location != session.location
                && delta < HOUR_SECONDS
            {
                signals.push(AnomalySignal::RapidLocationChange);
            }
        }

        let active = self
            .store
            .list_active_sessions(session.user_id, now)
            .await?;
        let other_devices = active
            .iter()
            .filter(|s| {
                s.session_id != session.session_id
                    && s.device_fingerprint != session.device_fingerprint
            })
            .count();
        if other_devices >= CONCURRENT_DEVICE_THRESHOLD {
            signals.push(AnomalySignal::MultipleConcurrentSessions);
        }

        Ok(signals)
    }

    fn emit(&self, session: &UserSession, signals: &[AnomalySignal]) {
        let names: Vec<&str> = signals.iter().map(|s| s.as_str()).collect();
        tracing::warn!(
            user_id = %session.user_id,
            session_id = %session.session_id,
            signals = ?names,
            "Session anomaly detected"
        );

        let alert = SecurityAlert::new(
            session.user_id,
            "SESSION_ANOMALY",
            AlertSeverity::Medium,
            format!("Unusual sign-in activity detected: {}", names.join(", ")),
            json!({
                "signals": names,
                "session_id": session.session_id,
                "ip_address": session.ip_address,
                "location": session.location,
                "device_fingerprint": session.device_fingerprint,
                "device_type": session.device_type,
            }),
        );
        let notification = UserNotification {
            subject: "New sign-in to your account".to_string(),
            body: format!(
                "We noticed a sign-in from {} ({}) that looks different from your usual \
                 activity. If this was not you, terminate your active sessions and change \
                 your password.",
                session.location, session.device_type
            ),
        };
        self.dispatcher.dispatch(alert, Some(notification));
    }
}
