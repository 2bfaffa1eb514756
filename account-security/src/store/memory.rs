//! In-memory store implementation.
//!
//! Backs the engine in tests and embedded deployments. All state sits
//! behind one async `RwLock`, so every method is a single atomic step,
//! including the conditional bulk update in `sweep_expired_sessions`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{SecurityStore, StoreError};
use crate::models::{
    AccountLockout, ActivityEvent, BehavioralBaseline, FailedLoginAttempt, PasswordHistoryEntry,
    PasswordPolicy, UserRef, UserSession,
};

#[derive(Default)]
struct State {
    policies: Vec<PasswordPolicy>,
    users: Vec<UserRef>,
    password_history: Vec<PasswordHistoryEntry>,
    failed_attempts: Vec<FailedLoginAttempt>,
    lockouts: Vec<AccountLockout>,
    sessions: HashMap<Uuid, UserSession>,
    activity: Vec<ActivityEvent>,
    baselines: Vec<BehavioralBaseline>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Seeding helpers for data this engine only reads. The owning
    // subsystems write these in production.

    pub async fn add_user(&self, user: UserRef) {
        self.state.write().await.users.push(user);
    }

    pub async fn add_password_history(
        &self,
        user_id: Uuid,
        password_hash: impl Into<String>,
        created_utc: DateTime<Utc>,
    ) {
        self.state
            .write()
            .await
            .password_history
            .push(PasswordHistoryEntry {
                user_id,
                password_hash: password_hash.into(),
                created_utc,
            });
    }

    pub async fn add_activity(&self, event: ActivityEvent) {
        self.state.write().await.activity.push(event);
    }
}

#[async_trait]
impl SecurityStore for MemoryStore {
    async fn insert_policy(&self, policy: &PasswordPolicy) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if policy.is_active {
            for existing in state.policies.iter().filter(|p| p.is_active) {
                if existing.name == policy.name {
                    return Err(StoreError::Conflict(format!(
                        "active policy named '{}' already exists",
                        policy.name
                    )));
                }
                if existing.scope == policy.scope {
                    return Err(StoreError::Conflict(format!(
                        "active policy for scope {} already exists",
                        existing.scope.as_kind()
                    )));
                }
            }
        }
        state.policies.push(policy.clone());
        Ok(())
    }

    async fn update_policy(&self, policy: &PasswordPolicy) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        match state
            .policies
            .iter_mut()
            .find(|p| p.policy_id == policy.policy_id)
        {
            Some(slot) => {
                *slot = policy.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound("policy".to_string())),
        }
    }

    async fn find_policy(&self, policy_id: Uuid) -> Result<Option<PasswordPolicy>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .policies
            .iter()
            .find(|p| p.policy_id == policy_id)
            .cloned())
    }

    async fn find_active_policy_by_name(
        &self,
        name: &str,
    ) -> Result<Option<PasswordPolicy>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .policies
            .iter()
            .find(|p| p.is_active && p.name == name)
            .cloned())
    }

    async fn find_active_role_policy(
        &self,
        role_id: Uuid,
    ) -> Result<Option<PasswordPolicy>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .policies
            .iter()
            .find(|p| p.is_active && p.scope == crate::models::PolicyScope::Role(role_id))
            .cloned())
    }

    async fn find_active_org_policy(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<PasswordPolicy>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .policies
            .iter()
            .find(|p| {
                p.is_active && p.scope == crate::models::PolicyScope::Organization(organization_id)
            })
            .cloned())
    }

    async fn find_active_system_policy(&self) -> Result<Option<PasswordPolicy>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .policies
            .iter()
            .find(|p| p.is_active && p.scope == crate::models::PolicyScope::System)
            .cloned())
    }

    async fn list_policies(&self) -> Result<Vec<PasswordPolicy>, StoreError> {
        Ok(self.state.read().await.policies.clone())
    }

    async fn list_user_refs(&self) -> Result<Vec<UserRef>, StoreError> {
        Ok(self.state.read().await.users.clone())
    }

    async fn recent_password_hashes(
        &self,
        user_id: Uuid,
        limit: u32,
    ) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().await;
        let mut entries: Vec<&PasswordHistoryEntry> = state
            .password_history
            .iter()
            .filter(|e| e.user_id == user_id)
            .collect();
        entries.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        Ok(entries
            .into_iter()
            .take(limit as usize)
            .map(|e| e.password_hash.clone())
            .collect())
    }

    async fn newest_password_change(
        &self,
        user_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .password_history
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.created_utc)
            .max())
    }

    async fn insert_failed_attempt(&self, attempt: &FailedLoginAttempt) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .failed_attempts
            .push(attempt.clone());
        Ok(())
    }

    async fn count_failed_attempts_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .failed_attempts
            .iter()
            .filter(|a| a.user_id == user_id && a.attempted_utc >= since)
            .count() as u64)
    }

    async fn clear_failed_attempts(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let before = state.failed_attempts.len();
        state.failed_attempts.retain(|a| a.user_id != user_id);
        Ok((before - state.failed_attempts.len()) as u64)
    }

    async fn insert_lockout(&self, lockout: &AccountLockout) -> Result<(), StoreError> {
        self.state.write().await.lockouts.push(lockout.clone());
        Ok(())
    }

    async fn find_active_lockout(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<AccountLockout>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .lockouts
            .iter()
            .filter(|l| l.user_id == user_id && l.is_active(now))
            .max_by_key(|l| l.locked_until)
            .cloned())
    }

    async fn count_locked_users(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let state = self.state.read().await;
        let mut locked: Vec<Uuid> = state
            .lockouts
            .iter()
            .filter(|l| l.is_active(now))
            .map(|l| l.user_id)
            .collect();
        locked.sort();
        locked.dedup();
        Ok(locked.len() as u64)
    }

    async fn insert_session(&self, session: &UserSession) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .sessions
            .insert(session.session_id, session.clone());
        Ok(())
    }

    async fn find_session(&self, session_id: Uuid) -> Result<Option<UserSession>, StoreError> {
        Ok(self.state.read().await.sessions.get(&session_id).cloned())
    }

    async fn list_active_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<UserSession>, StoreError> {
        let state = self.state.read().await;
        let mut sessions: Vec<UserSession> = state
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.is_live(now))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_activity_utc.cmp(&a.last_activity_utc));
        Ok(sessions)
    }

    async fn count_active_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.is_live(now))
            .count() as u64)
    }

    async fn oldest_active_session(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<UserSession>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.is_live(now))
            .min_by_key(|s| s.created_utc)
            .cloned())
    }

    async fn recent_sessions(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
        limit: u32,
        exclude: Option<Uuid>,
    ) -> Result<Vec<UserSession>, StoreError> {
        let state = self.state.read().await;
        let mut sessions: Vec<UserSession> = state
            .sessions
            .values()
            .filter(|s| {
                s.user_id == user_id
                    && s.created_utc >= since
                    && Some(s.session_id) != exclude
            })
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        sessions.truncate(limit as usize);
        Ok(sessions)
    }

    async fn touch_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        match state.sessions.get_mut(&session_id) {
            Some(session) if session.is_active => {
                session.last_activity_utc = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn terminate_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        match state.sessions.get_mut(&session_id) {
            Some(session) if session.is_active => {
                session.is_active = false;
                session.terminated_utc = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn terminate_sessions_for_user(
        &self,
        user_id: Uuid,
        except: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let mut terminated = 0;
        for session in state.sessions.values_mut() {
            if session.user_id == user_id
                && session.is_active
                && Some(session.session_id) != except
            {
                session.is_active = false;
                session.terminated_utc = Some(now);
                terminated += 1;
            }
        }
        Ok(terminated)
    }

    async fn sweep_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let mut swept = 0;
        for session in state.sessions.values_mut() {
            if session.is_active && session.expires_utc <= now {
                session.is_active = false;
                session.terminated_utc = Some(now);
                swept += 1;
            }
        }
        Ok(swept)
    }

    async fn activity_events(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ActivityEvent>, StoreError> {
        let state = self.state.read().await;
        let mut events: Vec<ActivityEvent> = state
            .activity
            .iter()
            .filter(|e| e.user_id == user_id && e.occurred_utc >= from && e.occurred_utc < to)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.occurred_utc.cmp(&b.occurred_utc));
        Ok(events)
    }

    async fn insert_baseline(&self, baseline: &BehavioralBaseline) -> Result<(), StoreError> {
        self.state.write().await.baselines.push(baseline.clone());
        Ok(())
    }

    async fn latest_baseline(
        &self,
        user_id: Uuid,
    ) -> Result<Option<BehavioralBaseline>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .baselines
            .iter()
            .filter(|b| b.user_id == user_id)
            .max_by_key(|b| b.created_utc)
            .cloned())
    }
}
