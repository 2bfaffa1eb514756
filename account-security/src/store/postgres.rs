//! PostgreSQL store implementation.
//!
//! Runtime-checked sqlx queries over the engine-owned tables (see
//! `migrations/`) plus read-only queries against the externally owned
//! `users`, `user_roles`, `password_history`, and `activity_log` tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use uuid::Uuid;

use super::{SecurityStore, StoreError};
use crate::config::DatabaseConfig;
use crate::models::{
    AccountLockout, ActivityEvent, BehavioralBaseline, FailedLoginAttempt, PasswordPolicy,
    PolicyScope, UserRef, UserSession,
};

/// Connection acquisition is bounded so no engine operation can suspend
/// indefinitely on an unavailable store.
const ACQUIRE_TIMEOUT_SECS: u64 = 5;

/// Postgres-backed [`SecurityStore`].
#[derive(Clone)]
pub struct PgSecurityStore {
    pool: PgPool,
}

impl PgSecurityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a bounded pool.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(ACQUIRE_TIMEOUT_SECS))
            .connect(&config.url)
            .await
            .map_err(|e| StoreError::Unavailable(anyhow::anyhow!(e)))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the engine-owned schema.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(anyhow::anyhow!(e)))
    }

    /// Health check - ping the database.
    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(map_sqlx)
    }
}

fn map_sqlx(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(db.message().to_string())
        }
        _ => StoreError::Unavailable(anyhow::anyhow!(err)),
    }
}

#[derive(FromRow)]
struct PolicyRow {
    policy_id: Uuid,
    name: String,
    scope_kind: String,
    scope_id: Option<Uuid>,
    min_length: i32,
    require_uppercase: bool,
    require_lowercase: bool,
    require_numbers: bool,
    require_special_chars: bool,
    prevent_reuse: i32,
    max_age_days: Option<i32>,
    lockout_threshold: Option<i32>,
    lockout_duration_minutes: Option<i32>,
    max_concurrent_sessions: Option<i32>,
    is_active: bool,
    created_utc: DateTime<Utc>,
}

fn row_to_policy(row: PolicyRow) -> Result<PasswordPolicy, StoreError> {
    let scope = match (row.scope_kind.as_str(), row.scope_id) {
        ("system", _) => PolicyScope::System,
        ("organization", Some(id)) => PolicyScope::Organization(id),
        ("role", Some(id)) => PolicyScope::Role(id),
        (kind, id) => {
            return Err(StoreError::Unavailable(anyhow::anyhow!(
                "invalid policy scope row: kind={}, id={:?}",
                kind,
                id
            )))
        }
    };
    Ok(PasswordPolicy {
        policy_id: row.policy_id,
        name: row.name,
        scope,
        min_length: row.min_length as u32,
        require_uppercase: row.require_uppercase,
        require_lowercase: row.require_lowercase,
        require_numbers: row.require_numbers,
        require_special_chars: row.require_special_chars,
        prevent_reuse: row.prevent_reuse as u32,
        max_age_days: row.max_age_days.map(|v| v as u32),
        lockout_threshold: row.lockout_threshold.map(|v| v as u32),
        lockout_duration_minutes: row.lockout_duration_minutes.map(|v| v as u32),
        max_concurrent_sessions: row.max_concurrent_sessions.map(|v| v as u32),
        is_active: row.is_active,
        created_utc: row.created_utc,
    })
}

#[derive(FromRow)]
struct LockoutRow {
    lockout_id: Uuid,
    user_id: Uuid,
    locked_until: DateTime<Utc>,
    reason: String,
}

impl From<LockoutRow> for AccountLockout {
    fn from(row: LockoutRow) -> Self {
        Self {
            lockout_id: row.lockout_id,
            user_id: row.user_id,
            locked_until: row.locked_until,
            reason: row.reason,
        }
    }
}

#[derive(FromRow)]
struct BaselineRow {
    baseline_id: Uuid,
    user_id: Uuid,
    avg_activity_per_day: f64,
    common_actions: Vec<String>,
    typical_hours: Vec<i32>,
    data_points: i64,
    created_utc: DateTime<Utc>,
}

impl From<BaselineRow> for BehavioralBaseline {
    fn from(row: BaselineRow) -> Self {
        Self {
            baseline_id: row.baseline_id,
            user_id: row.user_id,
            avg_activity_per_day: row.avg_activity_per_day,
            common_actions: row.common_actions,
            typical_hours: row.typical_hours.into_iter().map(|h| h as u32).collect(),
            data_points: row.data_points as u64,
            created_utc: row.created_utc,
        }
    }
}

#[async_trait]
impl SecurityStore for PgSecurityStore {
    async fn insert_policy(&self, policy: &PasswordPolicy) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO password_policies (
                policy_id, name, scope_kind, scope_id, min_length,
                require_uppercase, require_lowercase, require_numbers, require_special_chars,
                prevent_reuse, max_age_days, lockout_threshold, lockout_duration_minutes,
                max_concurrent_sessions, is_active, created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(policy.policy_id)
        .bind(&policy.name)
        .bind(policy.scope.as_kind())
        .bind(policy.scope.scope_id())
        .bind(policy.min_length as i32)
        .bind(policy.require_uppercase)
        .bind(policy.require_lowercase)
        .bind(policy.require_numbers)
        .bind(policy.require_special_chars)
        .bind(policy.prevent_reuse as i32)
        .bind(policy.max_age_days.map(|v| v as i32))
        .bind(policy.lockout_threshold.map(|v| v as i32))
        .bind(policy.lockout_duration_minutes.map(|v| v as i32))
        .bind(policy.max_concurrent_sessions.map(|v| v as i32))
        .bind(policy.is_active)
        .bind(policy.created_utc)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn update_policy(&self, policy: &PasswordPolicy) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE password_policies SET
                name = $2, scope_kind = $3, scope_id = $4, min_length = $5,
                require_uppercase = $6, require_lowercase = $7, require_numbers = $8,
                require_special_chars = $9, prevent_reuse = $10, max_age_days = $11,
                lockout_threshold = $12, lockout_duration_minutes = $13,
                max_concurrent_sessions = $14, is_active = $15
            WHERE policy_id = $1
            "#,
        )
        .bind(policy.policy_id)
        .bind(&policy.name)
        .bind(policy.scope.as_kind())
        .bind(policy.scope.scope_id())
        .bind(policy.min_length as i32)
        .bind(policy.require_uppercase)
        .bind(policy.require_lowercase)
        .bind(policy.require_numbers)
        .bind(policy.require_special_chars)
        .bind(policy.prevent_reuse as i32)
        .bind(policy.max_age_days.map(|v| v as i32))
        .bind(policy.lockout_threshold.map(|v| v as i32))
        .bind(policy.lockout_duration_minutes.map(|v| v as i32))
        .bind(policy.max_concurrent_sessions.map(|v| v as i32))
        .bind(policy.is_active)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("policy".to_string()));
        }
        Ok(())
    }

    async fn find_policy(&self, policy_id: Uuid) -> Result<Option<PasswordPolicy>, StoreError> {
        let row = sqlx::query_as::<_, PolicyRow>(
            "SELECT * FROM password_policies WHERE policy_id = $1",
        )
        .bind(policy_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row.map(row_to_policy).transpose()
    }

    async fn find_active_policy_by_name(
        &self,
        name: &str,
    ) -> Result<Option<PasswordPolicy>, StoreError> {
        let row = sqlx::query_as::<_, PolicyRow>(
            "SELECT * FROM password_policies WHERE name = $1 AND is_active = true",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row.map(row_to_policy).transpose()
    }

    async fn find_active_role_policy(
        &self,
        role_id: Uuid,
    ) -> Result<Option<PasswordPolicy>, StoreError> {
        let row = sqlx::query_as::<_, PolicyRow>(
            r#"
            SELECT * FROM password_policies
            WHERE scope_kind = 'role' AND scope_id = $1 AND is_active = true
            "#,
        )
        .bind(role_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row.map(row_to_policy).transpose()
    }

    async fn find_active_org_policy(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<PasswordPolicy>, StoreError> {
        let row = sqlx::query_as::<_, PolicyRow>(
            r#"
            SELECT * FROM password_policies
            WHERE scope_kind = 'organization' AND scope_id = $1 AND is_active = true
            "#,
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row.map(row_to_policy).transpose()
    }

    async fn find_active_system_policy(&self) -> Result<Option<PasswordPolicy>, StoreError> {
        let row = sqlx::query_as::<_, PolicyRow>(
            "SELECT * FROM password_policies WHERE scope_kind = 'system' AND is_active = true",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row.map(row_to_policy).transpose()
    }

    async fn list_policies(&self) -> Result<Vec<PasswordPolicy>, StoreError> {
        let rows =
            sqlx::query_as::<_, PolicyRow>("SELECT * FROM password_policies ORDER BY name")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx)?;
        rows.into_iter().map(row_to_policy).collect()
    }

    async fn list_user_refs(&self) -> Result<Vec<UserRef>, StoreError> {
        let users: Vec<(Uuid, Option<Uuid>)> =
            sqlx::query_as("SELECT user_id, organization_id FROM users")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx)?;

        // Role order is attachment order; it drives policy precedence.
        let roles: Vec<(Uuid, Uuid)> = sqlx::query_as(
            "SELECT user_id, role_id FROM user_roles ORDER BY user_id, attached_utc",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let mut refs: Vec<UserRef> = users
            .into_iter()
            .map(|(user_id, organization_id)| UserRef {
                user_id,
                organization_id,
                role_ids: Vec::new(),
            })
            .collect();
        for (user_id, role_id) in roles {
            if let Some(user) = refs.iter_mut().find(|u| u.user_id == user_id) {
                user.role_ids.push(role_id);
            }
        }
        Ok(refs)
    }

    async fn recent_password_hashes(
        &self,
        user_id: Uuid,
        limit: u32,
    ) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT password_hash FROM password_history
            WHERE user_id = $1
            ORDER BY created_utc DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(rows.into_iter().map(|(hash,)| hash).collect())
    }

    async fn newest_password_change(
        &self,
        user_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let row: Option<(DateTime<Utc>,)> = sqlx::query_as(
            r#"
            SELECT created_utc FROM password_history
            WHERE user_id = $1
            ORDER BY created_utc DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(row.map(|(ts,)| ts))
    }

    async fn insert_failed_attempt(&self, attempt: &FailedLoginAttempt) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO failed_login_attempts (user_id, attempted_utc) VALUES ($1, $2)",
        )
        .bind(attempt.user_id)
        .bind(attempt.attempted_utc)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn count_failed_attempts_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM failed_login_attempts WHERE user_id = $1 AND attempted_utc >= $2",
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(count as u64)
    }

    async fn clear_failed_attempts(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM failed_login_attempts WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }

    async fn insert_lockout(&self, lockout: &AccountLockout) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO account_lockouts (lockout_id, user_id, locked_until, reason)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(lockout.lockout_id)
        .bind(lockout.user_id)
        .bind(lockout.locked_until)
        .bind(&lockout.reason)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn find_active_lockout(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<AccountLockout>, StoreError> {
        let row = sqlx::query_as::<_, LockoutRow>(
            r#"
            SELECT lockout_id, user_id, locked_until, reason FROM account_lockouts
            WHERE user_id = $1 AND locked_until > $2
            ORDER BY locked_until DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(row.map(AccountLockout::from))
    }

    async fn count_locked_users(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(DISTINCT user_id) FROM account_lockouts WHERE locked_until > $1",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(count as u64)
    }

    async fn insert_session(&self, session: &UserSession) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO user_sessions (
                session_id, user_id, token, ip_address, user_agent, device_fingerprint,
                device_type, browser, os, location, created_utc, last_activity_utc,
                expires_utc, is_active, terminated_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(session.session_id)
        .bind(session.user_id)
        .bind(&session.token)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(&session.device_fingerprint)
        .bind(&session.device_type)
        .bind(&session.browser)
        .bind(&session.os)
        .bind(&session.location)
        .bind(session.created_utc)
        .bind(session.last_activity_utc)
        .bind(session.expires_utc)
        .bind(session.is_active)
        .bind(session.terminated_utc)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn find_session(&self, session_id: Uuid) -> Result<Option<UserSession>, StoreError> {
        sqlx::query_as::<_, UserSession>("SELECT * FROM user_sessions WHERE session_id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)
    }

    async fn list_active_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<UserSession>, StoreError> {
        sqlx::query_as::<_, UserSession>(
            r#"
            SELECT * FROM user_sessions
            WHERE user_id = $1 AND is_active = true AND expires_utc > $2
            ORDER BY last_activity_utc DESC
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)
    }

    async fn count_active_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM user_sessions
            WHERE user_id = $1 AND is_active = true AND expires_utc > $2
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(count as u64)
    }

    async fn oldest_active_session(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<UserSession>, StoreError> {
        sqlx::query_as::<_, UserSession>(
            r#"
            SELECT * FROM user_sessions
            WHERE user_id = $1 AND is_active = true AND expires_utc > $2
            ORDER BY created_utc ASC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)
    }

    async fn recent_sessions(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
        limit: u32,
        exclude: Option<Uuid>,
    ) -> Result<Vec<UserSession>, StoreError> {
        sqlx::query_as::<_, UserSession>(
            r#"
            SELECT * FROM user_sessions
            WHERE user_id = $1 AND created_utc >= $2 AND ($3::uuid IS NULL OR session_id <> $3)
            ORDER BY created_utc DESC
            LIMIT $4
            "#,
        )
        .bind(user_id)
        .bind(since)
        .bind(exclude)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)
    }

    async fn touch_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE user_sessions SET last_activity_utc = $2 WHERE session_id = $1 AND is_active = true",
        )
        .bind(session_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn terminate_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE user_sessions SET is_active = false, terminated_utc = $2
            WHERE session_id = $1 AND is_active = true
            "#,
        )
        .bind(session_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn terminate_sessions_for_user(
        &self,
        user_id: Uuid,
        except: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE user_sessions SET is_active = false, terminated_utc = $3
            WHERE user_id = $1 AND is_active = true AND ($2::uuid IS NULL OR session_id <> $2)
            "#,
        )
        .bind(user_id)
        .bind(except)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }

    async fn sweep_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE user_sessions SET is_active = false, terminated_utc = $1
            WHERE is_active = true AND expires_utc <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }

    async fn activity_events(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ActivityEvent>, StoreError> {
        let rows: Vec<(Uuid, String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT user_id, action, occurred_utc FROM activity_log
            WHERE user_id = $1 AND occurred_utc >= $2 AND occurred_utc < $3
            ORDER BY occurred_utc ASC
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(rows
            .into_iter()
            .map(|(user_id, action, occurred_utc)| ActivityEvent {
                user_id,
                action,
                occurred_utc,
            })
            .collect())
    }

    async fn insert_baseline(&self, baseline: &BehavioralBaseline) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO behavioral_baselines (
                baseline_id, user_id, avg_activity_per_day, common_actions,
                typical_hours, data_points, created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(baseline.baseline_id)
        .bind(baseline.user_id)
        .bind(baseline.avg_activity_per_day)
        .bind(&baseline.common_actions)
        .bind(
            baseline
                .typical_hours
                .iter()
                .map(|h| *h as i32)
                .collect::<Vec<i32>>(),
        )
        .bind(baseline.data_points as i64)
        .bind(baseline.created_utc)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn latest_baseline(
        &self,
        user_id: Uuid,
    ) -> Result<Option<BehavioralBaseline>, StoreError> {
        let row = sqlx::query_as::<_, BaselineRow>(
            r#"
            SELECT * FROM behavioral_baselines
            WHERE user_id = $1
            ORDER BY created_utc DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(row.map(BehavioralBaseline::from))
    }
}
