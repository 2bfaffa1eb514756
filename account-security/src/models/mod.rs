//! Entity models for the account security engine.

mod activity;
mod alert;
mod lockout;
mod policy;
mod session;

pub use activity::{ActivityEvent, BehavioralBaseline};
pub use alert::{AlertSeverity, AnomalySignal, SecurityAlert};
pub use lockout::{AccountLockout, FailedLoginAttempt, FailureOutcome, LockoutStatus};
pub use policy::{PasswordHistoryEntry, PasswordPolicy, PolicyScope};
pub use session::{DeviceInfo, SessionInfo, UserSession};

use uuid::Uuid;

/// Minimal view of a user as the engine needs it: identity, organization,
/// and roles in the order they were attached (role order drives policy
/// precedence).
#[derive(Debug, Clone)]
pub struct UserRef {
    pub user_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub role_ids: Vec<Uuid>,
}

impl UserRef {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            organization_id: None,
            role_ids: Vec::new(),
        }
    }

    pub fn with_organization(mut self, organization_id: Uuid) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    pub fn with_roles(mut self, role_ids: Vec<Uuid>) -> Self {
        self.role_ids = role_ids;
        self
    }
}
