//! Persistent-store collaborator.
//!
//! The engine depends on an abstract [`SecurityStore`] injected at
//! construction; [`PgSecurityStore`] backs it with Postgres and
//! [`MemoryStore`] keeps everything in process for tests and embedded use.
//! Read paths may be wrapped in [`with_read_retry`]; writes that must not be
//! silently duplicated surface transient failures immediately.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgSecurityStore;

use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    AccountLockout, ActivityEvent, BehavioralBaseline, FailedLoginAttempt, PasswordPolicy,
    UserRef, UserSession,
};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Transient infrastructure failure; the read-path retry wrapper and
    /// callers may retry with backoff.
    #[error("store unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),

    /// Uniqueness violation (e.g. duplicate active policy name).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Abstract persistence surface for the entities the engine owns or reads.
///
/// Ownership boundaries (who writes what) are enforced by this trait's
/// shape: password history, the user directory, and the activity log have
/// read-only methods because other subsystems own their writes.
#[async_trait]
pub trait SecurityStore: Send + Sync {
    // ==================== Password Policies ====================

    /// Insert a policy. Fails with `Conflict` when an active policy with
    /// the same name or the same scope key already exists.
    async fn insert_policy(&self, policy: &PasswordPolicy) -> Result<(), StoreError>;

    /// Update a policy in place. `NotFound` when the id is unknown.
    async fn update_policy(&self, policy: &PasswordPolicy) -> Result<(), StoreError>;

    async fn find_policy(&self, policy_id: Uuid) -> Result<Option<PasswordPolicy>, StoreError>;

    async fn find_active_policy_by_name(
        &self,
        name: &str,
    ) -> Result<Option<PasswordPolicy>, StoreError>;

    async fn find_active_role_policy(
        &self,
        role_id: Uuid,
    ) -> Result<Option<PasswordPolicy>, StoreError>;

    async fn find_active_org_policy(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<PasswordPolicy>, StoreError>;

    async fn find_active_system_policy(&self) -> Result<Option<PasswordPolicy>, StoreError>;

    async fn list_policies(&self) -> Result<Vec<PasswordPolicy>, StoreError>;

    // ==================== User Directory (read-only) ====================

    /// All users with their organization and ordered role attachments, as
    /// needed for policy resolution and compliance reporting.
    async fn list_user_refs(&self) -> Result<Vec<UserRef>, StoreError>;

    // ==================== Password History (read-only) ====================

    /// Newest-first password hashes for a user, capped at `limit`.
    async fn recent_password_hashes(
        &self,
        user_id: Uuid,
        limit: u32,
    ) -> Result<Vec<String>, StoreError>;

    /// Timestamp of the user's most recent password change, if any.
    async fn newest_password_change(
        &self,
        user_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    // ==================== Failed Attempts & Lockouts ====================

    async fn insert_failed_attempt(&self, attempt: &FailedLoginAttempt) -> Result<(), StoreError>;

    async fn count_failed_attempts_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Remove all failed attempts for a user (full reset on success).
    async fn clear_failed_attempts(&self, user_id: Uuid) -> Result<u64, StoreError>;

    async fn insert_lockout(&self, lockout: &AccountLockout) -> Result<(), StoreError>;

    /// The lockout with the latest `locked_until` still in the future, if
    /// any.
    async fn find_active_lockout(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<AccountLockout>, StoreError>;

    async fn count_locked_users(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    // ==================== Sessions ====================

    async fn insert_session(&self, session: &UserSession) -> Result<(), StoreError>;

    async fn find_session(&self, session_id: Uuid) -> Result<Option<UserSession>, StoreError>;

    /// Active, unexpired sessions ordered by last activity descending.
    async fn list_active_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<UserSession>, StoreError>;

    async fn count_active_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Oldest active session by creation time (the eviction candidate).
    async fn oldest_active_session(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<UserSession>, StoreError>;

    /// Sessions created since `since`, newest first, capped at `limit`,
    /// optionally excluding one session id (the one being inspected).
    async fn recent_sessions(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
        limit: u32,
        exclude: Option<Uuid>,
    ) -> Result<Vec<UserSession>, StoreError>;

    /// Update a session's last-activity timestamp. False when the session
    /// does not exist or is no longer active.
    async fn touch_session(&self, session_id: Uuid, now: DateTime<Utc>)
        -> Result<bool, StoreError>;

    /// Flip a session inactive and stamp termination. False when already
    /// inactive or unknown.
    async fn terminate_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Terminate every active session for a user, optionally sparing one.
    /// Returns the number of sessions terminated.
    async fn terminate_sessions_for_user(
        &self,
        user_id: Uuid,
        except: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Bulk-terminate all sessions past expiry. A single conditional
    /// update: idempotent and safe to run concurrently.
    async fn sweep_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    // ==================== Activity Log (read-only) & Baselines ====================

    /// Activity entries for a user in `[from, to)`, ascending by time.
    async fn activity_events(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ActivityEvent>, StoreError>;

    async fn insert_baseline(&self, baseline: &BehavioralBaseline) -> Result<(), StoreError>;

    async fn latest_baseline(
        &self,
        user_id: Uuid,
    ) -> Result<Option<BehavioralBaseline>, StoreError>;
}

/// Run a read-path store operation with bounded exponential backoff.
///
/// Only transient failures are retried; conflicts and missing rows return
/// immediately. Total retry time is capped so lockout checks and policy
/// resolution stay bounded on the login path.
pub async fn with_read_retry<T, F, Fut>(operation: &str, f: F) -> Result<T, StoreError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let policy = ExponentialBackoff {
        initial_interval: Duration::from_millis(50),
        max_elapsed_time: Some(Duration::from_secs(2)),
        ..Default::default()
    };

    retry(policy, || async {
        f().await.map_err(|e| {
            if e.is_transient() {
                tracing::warn!(
                    operation = operation,
                    error = %e,
                    "Transient store failure, retrying with backoff"
                );
                backoff::Error::transient(e)
            } else {
                backoff::Error::permanent(e)
            }
        })
    })
    .await
}
