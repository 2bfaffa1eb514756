//! Brute-force lockout state machine.
//!
//! Failed attempts accumulate in a rolling 24-hour window. Reaching the
//! resolved policy's threshold creates a lockout record; success clears the
//! window entirely. Failure recording and the threshold check-then-act are
//! serialized per user to prevent lost updates between concurrent logins.

use chrono::{Duration, Utc};
use std::sync::Arc;

use crate::error::{Result, SecurityError};
use crate::models::{AccountLockout, FailedLoginAttempt, FailureOutcome, LockoutStatus, UserRef};
use crate::services::policy::PolicyResolver;
use crate::store::{with_read_retry, SecurityStore};
use crate::utils::locks::UserLocks;

/// Attempts are only counted within this rolling window.
pub const FAILURE_WINDOW_HOURS: i64 = 24;

pub struct LockoutEngine {
    store: Arc<dyn SecurityStore>,
    resolver: Arc<PolicyResolver>,
    locks: UserLocks,
    default_lockout_minutes: i64,
}

impl LockoutEngine {
    pub fn new(
        store: Arc<dyn SecurityStore>,
        resolver: Arc<PolicyResolver>,
        default_lockout_minutes: i64,
    ) -> Self {
        Self {
            store,
            resolver,
            locks: UserLocks::new(),
            default_lockout_minutes,
        }
    }

    /// Current lockout state for a user.
    ///
    /// Never creates a lockout. `remaining_attempts` is computed against
    /// the currently resolved policy, even for attempts recorded under an
    /// earlier policy.
    pub async fn check_lockout(&self, user: &UserRef) -> Result<LockoutStatus> {
        let now = Utc::now();
        let active = with_read_retry("find_active_lockout", || {
            self.store.find_active_lockout(user.user_id, now)
        })
        .await?;
        if let Some(lockout) = active {
            return Ok(LockoutStatus::locked(lockout.locked_until));
        }

        let policy = self.resolver.resolve(user, None).await?;
        let Some(threshold) = policy.and_then(|p| p.lockout_threshold) else {
            return Ok(LockoutStatus::unlocked(None));
        };

        let since = now - Duration::hours(FAILURE_WINDOW_HOURS);
        let failures = with_read_retry("count_failed_attempts_since", || {
            self.store.count_failed_attempts_since(user.user_id, since)
        })
        .await?;
        Ok(LockoutStatus::unlocked(Some(
            threshold.saturating_sub(failures as u32),
        )))
    }

    /// Like [`check_lockout`](Self::check_lockout) but collapses a locked
    /// account into [`SecurityError::LockedOut`] for login flows.
    pub async fn ensure_not_locked(&self, user: &UserRef) -> Result<LockoutStatus> {
        let status = self.check_lockout(user).await?;
        match status.locked_until {
            Some(until) if status.is_locked => Err(SecurityError::LockedOut { until }),
            _ => Ok(status),
        }
    }

    /// Record a failed authentication attempt.
    ///
    /// With no lockout threshold on the resolved policy this is just the
    /// append. Otherwise, reaching the threshold inside the window creates
    /// a lockout and signals the caller to clear the account-active flag
    /// (`deactivate_account`); account state itself is owned elsewhere.
    pub async fn record_failure(&self, user: &UserRef) -> Result<FailureOutcome> {
        let _guard = self.locks.acquire(user.user_id).await;
        let now = Utc::now();

        self.store
            .insert_failed_attempt(&FailedLoginAttempt {
                user_id: user.user_id,
                attempted_utc: now,
            })
            .await?;

        let since = now - Duration::hours(FAILURE_WINDOW_HOURS);
        let failures = self
            .store
            .count_failed_attempts_since(user.user_id, since)
            .await? as u32;

        let policy = self.resolver.resolve(user, None).await?;
        let Some(threshold) = policy.as_ref().and_then(|p| p.lockout_threshold) else {
            return Ok(FailureOutcome {
                attempts_in_window: failures,
                lockout: None,
                deactivate_account: false,
            });
        };

        if failures < threshold {
            tracing::debug!(
                user_id = %user.user_id,
                failures = failures,
                threshold = threshold,
                "Failed login attempt recorded"
            );
            return Ok(FailureOutcome {
                attempts_in_window: failures,
                lockout: None,
                deactivate_account: false,
            });
        }

        let duration_minutes = policy
            .as_ref()
            .and_then(|p| p.lockout_duration_minutes)
            .map(|m| m as i64)
            .unwrap_or(self.default_lockout_minutes);
        let lockout = AccountLockout::new(
            user.user_id,
            now + Duration::minutes(duration_minutes),
            format!(
                "{} failed login attempts within {} hours",
                failures, FAILURE_WINDOW_HOURS
            ),
        );
        // Write path: transient store failures surface immediately so a
        // lockout is never silently duplicated.
        self.store.insert_lockout(&lockout).await?;

        metrics::counter!("account_lockouts_total").increment(1);
        tracing::warn!(
            user_id = %user.user_id,
            failures = failures,
            locked_until = %lockout.locked_until,
            "Account locked after repeated failed logins"
        );

        Ok(FailureOutcome {
            attempts_in_window: failures,
            lockout: Some(lockout),
            deactivate_account: true,
        })
    }

    /// Record a successful authentication: clears every failed attempt for
    /// the user (full reset, not a decrement).
    pub async fn record_success(&self, user_id: uuid::Uuid) -> Result<u64> {
        let _guard = self.locks.acquire(user_id).await;
        let cleared = self.store.clear_failed_attempts(user_id).await?;
        if cleared > 0 {
            tracing::debug!(
                user_id = %user_id,
                cleared = cleared,
                "Failed login attempts cleared after successful authentication"
            );
        }
        Ok(cleared)
    }
}
