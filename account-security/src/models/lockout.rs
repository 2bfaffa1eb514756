//! Failed-attempt and lockout models for the brute-force state machine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A single failed authentication attempt. Append-only; only attempts
/// inside the rolling window count toward lockout.
#[derive(Debug, Clone)]
pub struct FailedLoginAttempt {
    pub user_id: Uuid,
    pub attempted_utc: DateTime<Utc>,
}

/// A lockout record. Users accumulate these over time; an account is locked
/// iff a record exists with `locked_until` in the future.
#[derive(Debug, Clone, Serialize)]
pub struct AccountLockout {
    pub lockout_id: Uuid,
    pub user_id: Uuid,
    pub locked_until: DateTime<Utc>,
    pub reason: String,
}

impl AccountLockout {
    pub fn new(user_id: Uuid, locked_until: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            lockout_id: Uuid::new_v4(),
            user_id,
            locked_until,
            reason: reason.into(),
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.locked_until > now
    }
}

/// Result of a lockout check.
#[derive(Debug, Clone, Serialize)]
pub struct LockoutStatus {
    pub is_locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<DateTime<Utc>>,
    /// Attempts left before lockout under the currently resolved policy.
    /// None when the policy does not enable lockout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_attempts: Option<u32>,
}

impl LockoutStatus {
    pub fn unlocked(remaining_attempts: Option<u32>) -> Self {
        Self {
            is_locked: false,
            locked_until: None,
            remaining_attempts,
        }
    }

    pub fn locked(until: DateTime<Utc>) -> Self {
        Self {
            is_locked: true,
            locked_until: Some(until),
            remaining_attempts: Some(0),
        }
    }
}

/// Outcome of recording a failed attempt. `deactivate_account` tells the
/// caller to clear the account-active flag; the engine signals the side
/// effect rather than performing it (account state is owned elsewhere).
#[derive(Debug, Clone)]
pub struct FailureOutcome {
    pub attempts_in_window: u32,
    pub lockout: Option<AccountLockout>,
    pub deactivate_account: bool,
}
