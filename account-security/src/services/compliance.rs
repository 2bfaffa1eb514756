//! Password compliance reporting across the user base.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::error::Result;
use crate::services::policy::PolicyResolver;
use crate::store::SecurityStore;

/// Aggregate compliance snapshot.
///
/// `expired_passwords` and `never_rotated` are disjoint: a user with no
/// history cannot also be expired. Compliant users are everyone else.
#[derive(Debug, Clone, Serialize)]
pub struct ComplianceReport {
    pub total_users: u64,
    pub compliant_users: u64,
    pub expired_passwords: u64,
    /// Users with no password history under management.
    pub never_rotated: u64,
    pub locked_accounts: u64,
    pub compliance_percentage: f64,
}

pub struct ComplianceService {
    store: Arc<dyn SecurityStore>,
    resolver: Arc<PolicyResolver>,
}

impl ComplianceService {
    pub fn new(store: Arc<dyn SecurityStore>, resolver: Arc<PolicyResolver>) -> Self {
        Self { store, resolver }
    }

    pub async fn get_report(&self) -> Result<ComplianceReport> {
        let now = Utc::now();
        let users = self.store.list_user_refs().await?;
        let total_users = users.len() as u64;

        let mut expired_passwords = 0u64;
        let mut never_rotated = 0u64;
        for user in &users {
            let changed = self.store.newest_password_change(user.user_id).await?;
            let Some(changed_utc) = changed else {
                never_rotated += 1;
                continue;
            };
            let policy = self.resolver.resolve(user, None).await?;
            if let Some(max_age_days) = policy.and_then(|p| p.max_age_days) {
                if now - changed_utc > Duration::days(max_age_days as i64) {
                    expired_passwords += 1;
                }
            }
        }

        let locked_accounts = self.store.count_locked_users(now).await?;
        let compliant_users = total_users - expired_passwords - never_rotated;
        let compliance_percentage = if total_users == 0 {
            100.0
        } else {
            round2(compliant_users as f64 / total_users as f64 * 100.0)
        };

        tracing::info!(
            total_users = total_users,
            compliant_users = compliant_users,
            expired_passwords = expired_passwords,
            never_rotated = never_rotated,
            locked_accounts = locked_accounts,
            "Compliance report generated"
        );

        Ok(ComplianceReport {
            total_users,
            compliant_users,
            expired_passwords,
            never_rotated,
            locked_accounts,
            compliance_percentage,
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
