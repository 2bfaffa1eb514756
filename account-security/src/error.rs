//! Error taxonomy for the account security engine.
//!
//! Expected outcomes (failed validation, locked accounts, insufficient
//! history) are modeled as typed results on the services that produce them;
//! the variants here exist for callers that want to collapse those outcomes
//! into an error channel, plus the genuinely exceptional cases.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::store::StoreError;

/// Result type alias used across the engine.
pub type Result<T> = std::result::Result<T, SecurityError>;

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Password failed policy validation. Carries the full structured error
    /// list, not a single message.
    #[error("password does not meet policy requirements")]
    ValidationFailed(Vec<String>),

    /// Login attempted against a currently locked account.
    #[error("account is locked until {until}")]
    LockedOut { until: DateTime<Utc> },

    /// Transient persistent-store failure. Retryable by the caller.
    #[error("store unavailable: {0}")]
    Store(#[source] anyhow::Error),

    #[error("hash provider failure: {0}")]
    Hash(#[source] anyhow::Error),

    /// The caller cancelled a long-running analysis.
    #[error("operation cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),
}

impl SecurityError {
    /// Whether the caller may retry the failed operation with backoff.
    ///
    /// Only transient store unavailability qualifies; validation, lockout,
    /// and lookup failures are terminal outcomes for that call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SecurityError::Store(_))
    }
}

impl From<StoreError> for SecurityError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(e) => SecurityError::Store(e),
            StoreError::Conflict(msg) => SecurityError::Conflict(msg),
            StoreError::NotFound(what) => SecurityError::NotFound(what),
        }
    }
}
