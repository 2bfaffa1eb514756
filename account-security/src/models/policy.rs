//! Password policy model - scoped validation and lockout parameters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a policy applies. At most one active policy exists per scope key;
/// the system scope is the fallback for users with no role or organization
/// binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "id")]
pub enum PolicyScope {
    System,
    Organization(Uuid),
    Role(Uuid),
}

impl PolicyScope {
    pub fn as_kind(&self) -> &'static str {
        match self {
            PolicyScope::System => "system",
            PolicyScope::Organization(_) => "organization",
            PolicyScope::Role(_) => "role",
        }
    }

    pub fn scope_id(&self) -> Option<Uuid> {
        match self {
            PolicyScope::System => None,
            PolicyScope::Organization(id) | PolicyScope::Role(id) => Some(*id),
        }
    }
}

/// Password policy entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordPolicy {
    pub policy_id: Uuid,
    /// Unique among active policies.
    pub name: String,
    pub scope: PolicyScope,
    pub min_length: u32,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_numbers: bool,
    pub require_special_chars: bool,
    /// How many prior password hashes are disallowed for reuse. Zero
    /// disables the reuse check.
    pub prevent_reuse: u32,
    /// Days before a password must be rotated. None disables expiry.
    pub max_age_days: Option<u32>,
    /// Failed attempts within the rolling window before lockout. None
    /// disables lockout entirely.
    pub lockout_threshold: Option<u32>,
    /// Lockout duration in minutes. Falls back to the configured default
    /// when a threshold is set without a duration.
    pub lockout_duration_minutes: Option<u32>,
    /// Cap on concurrently active sessions; exceeding logins evict the
    /// oldest active session. None disables the cap.
    pub max_concurrent_sessions: Option<u32>,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
}

impl PasswordPolicy {
    /// Create a policy with the baseline requirements (8 chars, mixed case
    /// and numbers). Callers adjust fields from there.
    pub fn new(name: impl Into<String>, scope: PolicyScope) -> Self {
        Self {
            policy_id: Uuid::new_v4(),
            name: name.into(),
            scope,
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_numbers: true,
            require_special_chars: false,
            prevent_reuse: 0,
            max_age_days: None,
            lockout_threshold: None,
            lockout_duration_minutes: None,
            max_concurrent_sessions: None,
            is_active: true,
            created_utc: Utc::now(),
        }
    }
}

/// One prior password hash for a user. Append-only; reuse checks walk these
/// newest-first.
#[derive(Debug, Clone)]
pub struct PasswordHistoryEntry {
    pub user_id: Uuid,
    pub password_hash: String,
    pub created_utc: DateTime<Utc>,
}
