//! Account security and session risk engine.
//!
//! Resolves and enforces password policy, tracks failed logins through an
//! account-lockout state machine, manages authenticated session lifecycle
//! with device and location anomaly detection, and builds per-user
//! behavioral baselines for risk scoring.
//!
//! The engine owns no transport: HTTP/gRPC surfaces, credential
//! verification, notification delivery, and geolocation lookups are
//! collaborators injected at construction. [`SecurityEngine`] is the
//! composition root; everything is plain structs wired explicitly.

pub mod config;
pub mod error;
pub mod geo;
pub mod models;
pub mod observability;
pub mod services;
pub mod store;
pub mod utils;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::SecurityConfig;
use crate::error::Result;
use crate::geo::GeoResolver;
use crate::models::{FailureOutcome, LockoutStatus, PasswordPolicy, UserRef, UserSession};
use crate::services::{
    AlertDispatcher, AlertSink, AnalysisOutcome, BaselineOutcome, BehaviorBaselineEngine,
    ComplianceReport, ComplianceService, LockoutEngine, PasswordValidator, PolicyResolver,
    SessionAnomalyDetector, SessionRegistry, ValidationReport,
};
use crate::store::SecurityStore;
use crate::utils::crypto::PasswordHashProvider;

/// Composition root wiring the engines over shared collaborators.
pub struct SecurityEngine {
    resolver: Arc<PolicyResolver>,
    validator: PasswordValidator,
    lockout: LockoutEngine,
    sessions: SessionRegistry,
    behavior: BehaviorBaselineEngine,
    compliance: ComplianceService,
}

impl SecurityEngine {
    pub fn new(
        store: Arc<dyn SecurityStore>,
        hasher: Arc<dyn PasswordHashProvider>,
        geo: Arc<dyn GeoResolver>,
        alerts: Arc<dyn AlertSink>,
        config: &SecurityConfig,
    ) -> Self {
        let resolver = Arc::new(PolicyResolver::new(store.clone()));
        let dispatcher = AlertDispatcher::new(alerts);
        let anomaly = Arc::new(SessionAnomalyDetector::new(store.clone(), dispatcher));
        Self {
            validator: PasswordValidator::new(store.clone(), hasher),
            lockout: LockoutEngine::new(
                store.clone(),
                resolver.clone(),
                config.default_lockout_minutes,
            ),
            sessions: SessionRegistry::new(
                store.clone(),
                resolver.clone(),
                geo,
                anomaly,
                config.session_ttl_hours,
            ),
            behavior: BehaviorBaselineEngine::new(store.clone()),
            compliance: ComplianceService::new(store, resolver.clone()),
            resolver,
        }
    }

    // ==================== Policy ====================

    pub async fn resolve_policy(
        &self,
        user: &UserRef,
        explicit_policy_id: Option<Uuid>,
    ) -> Result<Option<PasswordPolicy>> {
        self.resolver.resolve(user, explicit_policy_id).await
    }

    pub async fn create_policy(&self, policy: PasswordPolicy) -> Result<PasswordPolicy> {
        self.resolver.create_policy(policy).await
    }

    pub async fn update_policy(&self, policy: PasswordPolicy) -> Result<PasswordPolicy> {
        self.resolver.update_policy(policy).await
    }

    pub async fn get_policy(&self, policy_id: Uuid) -> Result<PasswordPolicy> {
        self.resolver.get_policy(policy_id).await
    }

    pub async fn list_policies(&self) -> Result<Vec<PasswordPolicy>> {
        self.resolver.list_policies().await
    }

    /// Validate a candidate password for a user under their resolved
    /// policy (or the degraded defaults when none applies).
    pub async fn validate_password(
        &self,
        user: &UserRef,
        candidate: &str,
    ) -> Result<ValidationReport> {
        let policy = self.resolver.resolve(user, None).await?;
        self.validator
            .validate(candidate, policy.as_ref(), Some(user.user_id))
            .await
    }

    pub async fn is_password_expired(&self, user: &UserRef) -> Result<bool> {
        self.resolver.is_password_expired(user).await
    }

    // ==================== Lockout ====================

    pub async fn check_account_lockout(&self, user: &UserRef) -> Result<LockoutStatus> {
        self.lockout.check_lockout(user).await
    }

    pub async fn record_failed_attempt(&self, user: &UserRef) -> Result<FailureOutcome> {
        self.lockout.record_failure(user).await
    }

    pub async fn record_successful_attempt(&self, user_id: Uuid) -> Result<u64> {
        self.lockout.record_success(user_id).await
    }

    // ==================== Sessions ====================

    pub async fn create_session(
        &self,
        user: &UserRef,
        ip_address: &str,
        user_agent: &str,
        token: &str,
    ) -> Result<UserSession> {
        self.sessions
            .create_session(user, ip_address, user_agent, token)
            .await
    }

    pub async fn list_active_sessions(&self, user_id: Uuid) -> Result<Vec<UserSession>> {
        self.sessions.list_active(user_id).await
    }

    pub async fn touch_session(&self, session_id: Uuid) -> Result<()> {
        self.sessions.touch(session_id).await
    }

    pub async fn terminate_session(
        &self,
        session_id: Uuid,
        acting_user_id: Uuid,
        admin: bool,
    ) -> Result<()> {
        self.sessions
            .terminate(session_id, acting_user_id, admin)
            .await
    }

    pub async fn terminate_all_sessions(
        &self,
        user_id: Uuid,
        except: Option<Uuid>,
    ) -> Result<u64> {
        self.sessions.terminate_all(user_id, except).await
    }

    pub async fn sweep_expired_sessions(&self) -> Result<u64> {
        self.sessions.sweep_expired().await
    }

    // ==================== Behavior ====================

    pub async fn analyze_user_behavior(
        &self,
        user_id: Uuid,
        window_days: Option<u32>,
        cancel: Option<&CancellationToken>,
    ) -> Result<AnalysisOutcome> {
        self.behavior.analyze(user_id, window_days, cancel).await
    }

    pub async fn create_baseline(&self, user_id: Uuid) -> Result<BaselineOutcome> {
        self.behavior.create_baseline(user_id).await
    }

    // ==================== Compliance ====================

    pub async fn get_compliance_report(&self) -> Result<ComplianceReport> {
        self.compliance.get_report().await
    }

    // Direct access to the underlying services for hosts that need more
    // than the facade (e.g. spawning the session sweeper).

    pub fn policy_resolver(&self) -> &PolicyResolver {
        &self.resolver
    }

    pub fn password_validator(&self) -> &PasswordValidator {
        &self.validator
    }

    pub fn lockout_engine(&self) -> &LockoutEngine {
        &self.lockout
    }

    pub fn session_registry(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn behavior_engine(&self) -> &BehaviorBaselineEngine {
        &self.behavior
    }
}
