//! Password policy resolution.
//!
//! Precedence, first match wins: explicit policy id (if active), the first
//! active policy among the user's roles in attachment order, the user's
//! organization policy, the system policy. Resolving to nothing is a
//! defined degraded mode, not an error; the validator falls back to
//! hard-coded baseline rules.

use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Result, SecurityError};
use crate::models::{PasswordPolicy, UserRef};
use crate::store::{with_read_retry, SecurityStore};

pub struct PolicyResolver {
    store: Arc<dyn SecurityStore>,
}

impl PolicyResolver {
    pub fn new(store: Arc<dyn SecurityStore>) -> Self {
        Self { store }
    }

    /// Resolve the applicable policy for a user.
    ///
    /// Returns `Ok(None)` when no policy applies anywhere in the chain.
    pub async fn resolve(
        &self,
        user: &UserRef,
        explicit_policy_id: Option<Uuid>,
    ) -> Result<Option<PasswordPolicy>> {
        if let Some(policy_id) = explicit_policy_id {
            let found =
                with_read_retry("find_policy", || self.store.find_policy(policy_id)).await?;
            match found {
                Some(policy) if policy.is_active => return Ok(Some(policy)),
                _ => {
                    tracing::debug!(
                        policy_id = %policy_id,
                        "Explicit policy missing or inactive, falling back to scope chain"
                    );
                }
            }
        }

        for role_id in &user.role_ids {
            let found = with_read_retry("find_active_role_policy", || {
                self.store.find_active_role_policy(*role_id)
            })
            .await?;
            if let Some(policy) = found {
                return Ok(Some(policy));
            }
        }

        if let Some(org_id) = user.organization_id {
            let found = with_read_retry("find_active_org_policy", || {
                self.store.find_active_org_policy(org_id)
            })
            .await?;
            if let Some(policy) = found {
                return Ok(Some(policy));
            }
        }

        let system = with_read_retry("find_active_system_policy", || {
            self.store.find_active_system_policy()
        })
        .await?;
        if system.is_none() {
            tracing::debug!(user_id = %user.user_id, "No policy applies, using degraded defaults");
        }
        Ok(system)
    }

    /// Whether the user's password is past the resolved policy's max age.
    ///
    /// No policy, no max age, or no recorded password change all mean "not
    /// expired".
    pub async fn is_password_expired(&self, user: &UserRef) -> Result<bool> {
        let Some(policy) = self.resolve(user, None).await? else {
            return Ok(false);
        };
        let Some(max_age_days) = policy.max_age_days else {
            return Ok(false);
        };
        let changed = with_read_retry("newest_password_change", || {
            self.store.newest_password_change(user.user_id)
        })
        .await?;
        match changed {
            Some(changed_utc) => {
                Ok(Utc::now() - changed_utc > Duration::days(max_age_days as i64))
            }
            None => Ok(false),
        }
    }

    /// Create a policy. Duplicate active names or scope keys conflict.
    pub async fn create_policy(&self, policy: PasswordPolicy) -> Result<PasswordPolicy> {
        self.store.insert_policy(&policy).await?;
        tracing::info!(
            policy_id = %policy.policy_id,
            name = %policy.name,
            scope = policy.scope.as_kind(),
            "Password policy created"
        );
        Ok(policy)
    }

    pub async fn update_policy(&self, policy: PasswordPolicy) -> Result<PasswordPolicy> {
        self.store.update_policy(&policy).await?;
        tracing::info!(policy_id = %policy.policy_id, name = %policy.name, "Password policy updated");
        Ok(policy)
    }

    pub async fn get_policy(&self, policy_id: Uuid) -> Result<PasswordPolicy> {
        with_read_retry("find_policy", || self.store.find_policy(policy_id))
            .await?
            .ok_or_else(|| SecurityError::NotFound("policy".to_string()))
    }

    pub async fn list_policies(&self) -> Result<Vec<PasswordPolicy>> {
        Ok(with_read_retry("list_policies", || self.store.list_policies()).await?)
    }
}
