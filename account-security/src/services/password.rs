//! Password validation and strength scoring.
//!
//! Two branches: with a resolved policy, each satisfied rule adds a fixed
//! weight and the ceiling shrinks when the policy disables a requirement;
//! without a policy, hard-coded baseline rules apply. Validity is driven by
//! the error list alone; the score is advisory.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::error::{Result, SecurityError};
use crate::models::PasswordPolicy;
use crate::store::SecurityStore;
use crate::utils::crypto::PasswordHashProvider;

// Policy-branch weights.
const WEIGHT_LENGTH: u8 = 20;
const WEIGHT_UPPERCASE: u8 = 15;
const WEIGHT_LOWERCASE: u8 = 15;
const WEIGHT_NUMBERS: u8 = 15;
const WEIGHT_SPECIAL: u8 = 15;
const WEIGHT_NO_COMMON_PATTERN: u8 = 10;
const WEIGHT_NOT_REUSED: u8 = 10;

// Degraded-mode weights when no policy applies.
const FALLBACK_MIN_LENGTH: usize = 8;
const FALLBACK_WEIGHT_LENGTH: u8 = 30;
const FALLBACK_WEIGHT_UPPERCASE: u8 = 25;
const FALLBACK_WEIGHT_LOWERCASE: u8 = 25;
const FALLBACK_WEIGHT_NUMBERS: u8 = 20;

const SPECIAL_CHARS: &str = "!@#$%^&*()-_=+[]{}|\\;:'\",.<>/?`~";

/// Low-entropy substrings rejected outright.
const DENIED_WORDS: [&str; 3] = ["password", "qwerty", "admin"];

/// Outcome of validating a candidate password.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    /// Advisory strength score, 0-100.
    pub score: u8,
}

pub struct PasswordValidator {
    store: Arc<dyn SecurityStore>,
    hasher: Arc<dyn PasswordHashProvider>,
}

impl PasswordValidator {
    pub fn new(store: Arc<dyn SecurityStore>, hasher: Arc<dyn PasswordHashProvider>) -> Self {
        Self { store, hasher }
    }

    /// Validate a candidate against a policy (or the degraded defaults).
    ///
    /// The reuse check runs only when a user id is supplied and the policy
    /// prevents reuse; it compares the candidate against the newest
    /// `prevent_reuse` stored hashes through the slow-hash collaborator.
    pub async fn validate(
        &self,
        candidate: &str,
        policy: Option<&PasswordPolicy>,
        user_id: Option<Uuid>,
    ) -> Result<ValidationReport> {
        let Some(policy) = policy else {
            return Ok(validate_fallback(candidate));
        };

        let mut errors = Vec::new();
        let mut score: u8 = 0;

        if candidate.chars().count() >= policy.min_length as usize {
            score += WEIGHT_LENGTH;
        } else {
            errors.push(format!(
                "Password must be at least {} characters long",
                policy.min_length
            ));
        }

        if policy.require_uppercase {
            if candidate.chars().any(|c| c.is_ascii_uppercase()) {
                score += WEIGHT_UPPERCASE;
            } else {
                errors.push("Password must contain at least one uppercase letter".to_string());
            }
        }

        if policy.require_lowercase {
            if candidate.chars().any(|c| c.is_ascii_lowercase()) {
                score += WEIGHT_LOWERCASE;
            } else {
                errors.push("Password must contain at least one lowercase letter".to_string());
            }
        }

        if policy.require_numbers {
            if candidate.chars().any(|c| c.is_ascii_digit()) {
                score += WEIGHT_NUMBERS;
            } else {
                errors.push("Password must contain at least one number".to_string());
            }
        }

        if policy.require_special_chars {
            if candidate.chars().any(|c| SPECIAL_CHARS.contains(c)) {
                score += WEIGHT_SPECIAL;
            } else {
                errors.push("Password must contain at least one special character".to_string());
            }
        }

        if let Some(pattern) = common_pattern(candidate) {
            errors.push(format!("Password contains a common pattern: {}", pattern));
        } else {
            score += WEIGHT_NO_COMMON_PATTERN;
        }

        if policy.prevent_reuse > 0 {
            if let Some(user_id) = user_id {
                if self.is_reused(candidate, user_id, policy.prevent_reuse).await? {
                    errors.push(format!(
                        "Password matches one of your last {} passwords",
                        policy.prevent_reuse
                    ));
                } else {
                    score += WEIGHT_NOT_REUSED;
                }
            }
        }

        Ok(ValidationReport {
            is_valid: errors.is_empty(),
            errors,
            score,
        })
    }

    /// Validate and collapse a failed report into
    /// [`SecurityError::ValidationFailed`].
    pub async fn enforce(
        &self,
        candidate: &str,
        policy: Option<&PasswordPolicy>,
        user_id: Option<Uuid>,
    ) -> Result<ValidationReport> {
        let report = self.validate(candidate, policy, user_id).await?;
        if report.is_valid {
            Ok(report)
        } else {
            Err(SecurityError::ValidationFailed(report.errors))
        }
    }

    async fn is_reused(&self, candidate: &str, user_id: Uuid, prevent_reuse: u32) -> Result<bool> {
        let hashes = self
            .store
            .recent_password_hashes(user_id, prevent_reuse)
            .await?;
        // Constant-time verification happens inside the hash provider.
        Ok(hashes.iter().any(|hash| self.hasher.verify(candidate, hash)))
    }
}

/// Degraded-mode validation when no policy resolves anywhere.
fn validate_fallback(candidate: &str) -> ValidationReport {
    let mut errors = Vec::new();
    let mut score: u8 = 0;

    if candidate.chars().count() >= FALLBACK_MIN_LENGTH {
        score += FALLBACK_WEIGHT_LENGTH;
    } else {
        errors.push(format!(
            "Password must be at least {} characters long",
            FALLBACK_MIN_LENGTH
        ));
    }
    if candidate.chars().any(|c| c.is_ascii_uppercase()) {
        score += FALLBACK_WEIGHT_UPPERCASE;
    } else {
        errors.push("Password must contain at least one uppercase letter".to_string());
    }
    if candidate.chars().any(|c| c.is_ascii_lowercase()) {
        score += FALLBACK_WEIGHT_LOWERCASE;
    } else {
        errors.push("Password must contain at least one lowercase letter".to_string());
    }
    if candidate.chars().any(|c| c.is_ascii_digit()) {
        score += FALLBACK_WEIGHT_NUMBERS;
    } else {
        errors.push("Password must contain at least one number".to_string());
    }

    if let Some(pattern) = common_pattern(candidate) {
        errors.push(format!("Password contains a common pattern: {}", pattern));
    }

    ValidationReport {
        is_valid: errors.is_empty(),
        errors,
        score,
    }
}

/// Returns a description of the first low-entropy pattern found, if any.
fn common_pattern(candidate: &str) -> Option<&'static str> {
    let lowered = candidate.to_lowercase();
    for word in DENIED_WORDS {
        if lowered.contains(word) {
            return Some("a commonly used word");
        }
    }
    if has_sequential_digits(candidate) {
        return Some("sequential digits");
    }
    if has_repeated_run(candidate) {
        return Some("repeated characters");
    }
    None
}

/// Three or more consecutive ascending digits, e.g. "123" or "789".
fn has_sequential_digits(candidate: &str) -> bool {
    let chars: Vec<char> = candidate.chars().collect();
    chars.windows(3).any(|w| {
        w.iter().all(|c| c.is_ascii_digit())
            && w[1] as u32 == w[0] as u32 + 1
            && w[2] as u32 == w[1] as u32 + 1
    })
}

/// The same character three or more times in a row.
fn has_repeated_run(candidate: &str) -> bool {
    let chars: Vec<char> = candidate.chars().collect();
    chars.windows(3).any(|w| w[0] == w[1] && w[1] == w[2])
}
