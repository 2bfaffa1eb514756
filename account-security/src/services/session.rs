//! Session lifecycle: creation with cap enforcement, activity tracking,
//! termination, and expiry sweeping.
//!
//! The count-then-evict-then-insert sequence runs under a per-user lock so
//! two concurrent logins cannot both pass the cap check. Eviction
//! terminates the oldest active session by creation time; rows are never
//! deleted.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Result, SecurityError};
use crate::geo::{resolve_location, GeoResolver};
use crate::models::{UserRef, UserSession};
use crate::services::anomaly::SessionAnomalyDetector;
use crate::services::policy::PolicyResolver;
use crate::store::SecurityStore;
use crate::utils::crypto::device_fingerprint;
use crate::utils::locks::UserLocks;

pub struct SessionRegistry {
    store: Arc<dyn SecurityStore>,
    resolver: Arc<PolicyResolver>,
    geo: Arc<dyn GeoResolver>,
    anomaly: Arc<SessionAnomalyDetector>,
    locks: UserLocks,
    session_ttl_hours: i64,
}

impl SessionRegistry {
    pub fn new(
        store: Arc<dyn SecurityStore>,
        resolver: Arc<PolicyResolver>,
        geo: Arc<dyn GeoResolver>,
        anomaly: Arc<SessionAnomalyDetector>,
        session_ttl_hours: i64,
    ) -> Self {
        Self {
            store,
            resolver,
            geo,
            anomaly,
            locks: UserLocks::new(),
            session_ttl_hours,
        }
    }

    /// Create a session for a successful login.
    ///
    /// Enforces the resolved policy's concurrent-session cap by evicting
    /// the oldest active session, then runs anomaly detection on the new
    /// session. Anomaly signals only emit alerts; they never fail creation.
    pub async fn create_session(
        &self,
        user: &UserRef,
        ip_address: &str,
        user_agent: &str,
        token: &str,
    ) -> Result<UserSession> {
        let fingerprint = device_fingerprint(ip_address, user_agent);
        let location = resolve_location(self.geo.as_ref(), ip_address).await;

        let session = {
            let _guard = self.locks.acquire(user.user_id).await;
            let now = Utc::now();

            let policy = self.resolver.resolve(user, None).await?;
            if let Some(cap) = policy.and_then(|p| p.max_concurrent_sessions) {
                let active = self.store.count_active_sessions(user.user_id, now).await?;
                if cap > 0 && active >= cap as u64 {
                    self.evict_oldest(user.user_id).await?;
                }
            }

            let session = UserSession::new(
                user.user_id,
                token.to_string(),
                ip_address.to_string(),
                user_agent.to_string(),
                fingerprint,
                location,
                self.session_ttl_hours,
            );
            self.store.insert_session(&session).await?;
            session
        };

        metrics::counter!("sessions_created_total").increment(1);
        tracing::info!(
            user_id = %user.user_id,
            session_id = %session.session_id,
            location = %session.location,
            device_type = %session.device_type,
            "Session created"
        );

        self.anomaly.inspect(&session).await;
        Ok(session)
    }

    async fn evict_oldest(&self, user_id: Uuid) -> Result<()> {
        let now = Utc::now();
        if let Some(oldest) = self.store.oldest_active_session(user_id, now).await? {
            self.store
                .terminate_session(oldest.session_id, now)
                .await?;
            metrics::counter!("sessions_evicted_total").increment(1);
            tracing::info!(
                user_id = %user_id,
                session_id = %oldest.session_id,
                created_utc = %oldest.created_utc,
                "Evicted oldest session to enforce concurrency cap"
            );
        }
        Ok(())
    }

    /// Active, unexpired sessions ordered by last activity descending.
    pub async fn list_active(&self, user_id: Uuid) -> Result<Vec<UserSession>> {
        Ok(self
            .store
            .list_active_sessions(user_id, Utc::now())
            .await?)
    }

    /// Refresh a session's last-activity timestamp.
    pub async fn touch(&self, session_id: Uuid) -> Result<()> {
        let touched = self.store.touch_session(session_id, Utc::now()).await?;
        if !touched {
            return Err(SecurityError::NotFound("session".to_string()));
        }
        Ok(())
    }

    /// Terminate one session on behalf of `acting_user_id`.
    ///
    /// Non-administrative callers can only terminate their own sessions;
    /// a foreign session id reads as not found to avoid disclosure.
    /// Terminating an already-inactive session is a no-op.
    pub async fn terminate(
        &self,
        session_id: Uuid,
        acting_user_id: Uuid,
        admin: bool,
    ) -> Result<()> {
        let session = self
            .store
            .find_session(session_id)
            .await?
            .ok_or_else(|| SecurityError::NotFound("session".to_string()))?;
        if !admin && session.user_id != acting_user_id {
            return Err(SecurityError::NotFound("session".to_string()));
        }

        let terminated = self.store.terminate_session(session_id, Utc::now()).await?;
        if terminated {
            metrics::counter!("sessions_terminated_total").increment(1);
            tracing::info!(
                session_id = %session_id,
                user_id = %session.user_id,
                acting_user_id = %acting_user_id,
                admin = admin,
                "Session terminated"
            );
        }
        Ok(())
    }

    /// Terminate all of a user's active sessions, optionally sparing one
    /// (the session performing the request). Returns how many were ended.
    pub async fn terminate_all(&self, user_id: Uuid, except: Option<Uuid>) -> Result<u64> {
        let terminated = self
            .store
            .terminate_sessions_for_user(user_id, except, Utc::now())
            .await?;
        if terminated > 0 {
            metrics::counter!("sessions_terminated_total").increment(terminated);
            tracing::info!(
                user_id = %user_id,
                terminated = terminated,
                "Bulk session termination"
            );
        }
        Ok(terminated)
    }

    /// Flip every session past its expiry to inactive. A single conditional
    /// bulk update: idempotent and safe to run concurrently with logins,
    /// terminations, and itself.
    pub async fn sweep_expired(&self) -> Result<u64> {
        let swept = self.store.sweep_expired_sessions(Utc::now()).await?;
        if swept > 0 {
            metrics::counter!("sessions_swept_total").increment(swept);
            tracing::info!(swept = swept, "Expired sessions swept");
        }
        Ok(swept)
    }

    /// Run the expiry sweep on an interval until cancelled. Intended to be
    /// spawned by the host application.
    pub async fn run_sweeper(&self, every: StdDuration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Session sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_expired().await {
                        tracing::error!(error = %e, "Session sweep failed");
                    }
                }
            }
        }
    }
}
