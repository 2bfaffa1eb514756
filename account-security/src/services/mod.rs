//! Services layer: the five engines plus alerting and compliance.

pub mod alerts;
pub mod anomaly;
pub mod behavior;
pub mod compliance;
pub mod lockout;
pub mod password;
pub mod policy;
pub mod session;

pub use alerts::{AlertDispatcher, AlertSink, NoopAlertSink, UserNotification};
pub use anomaly::SessionAnomalyDetector;
pub use behavior::{
    AnalysisOutcome, AnalysisReport, BaselineOutcome, BehaviorAnomaly, BehaviorAnomalyKind,
    BehaviorBaselineEngine,
};
pub use compliance::{ComplianceReport, ComplianceService};
pub use lockout::LockoutEngine;
pub use password::{PasswordValidator, ValidationReport};
pub use policy::PolicyResolver;
pub use session::SessionRegistry;
