//! User session model and device classification.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Authenticated session entity. Sessions are never physically deleted;
/// termination and expiry flip `is_active` and the row stays for audit.
#[derive(Debug, Clone, FromRow)]
pub struct UserSession {
    pub session_id: Uuid,
    pub user_id: Uuid,
    /// Opaque token issued by the authentication flow. Never logged.
    pub token: String,
    pub ip_address: String,
    pub user_agent: String,
    /// Fuzzy device-identity hash of ip + user agent. Not a security
    /// boundary; collisions are acceptable.
    pub device_fingerprint: String,
    pub device_type: String,
    pub browser: String,
    pub os: String,
    /// Resolved location label, or the "Unknown" / "Local Network"
    /// sentinels.
    pub location: String,
    pub created_utc: DateTime<Utc>,
    pub last_activity_utc: DateTime<Utc>,
    pub expires_utc: DateTime<Utc>,
    pub is_active: bool,
    pub terminated_utc: Option<DateTime<Utc>>,
}

impl UserSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: Uuid,
        token: String,
        ip_address: String,
        user_agent: String,
        device_fingerprint: String,
        location: String,
        ttl_hours: i64,
    ) -> Self {
        let now = Utc::now();
        let device = DeviceInfo::from_user_agent(&user_agent);
        Self {
            session_id: Uuid::new_v4(),
            user_id,
            token,
            ip_address,
            user_agent,
            device_fingerprint,
            device_type: device.device_type,
            browser: device.browser,
            os: device.os,
            location,
            created_utc: now,
            last_activity_utc: now,
            expires_utc: now + Duration::hours(ttl_hours),
            is_active: true,
            terminated_utc: None,
        }
    }

    /// Active and not past its expiry.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_utc > now
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_utc <= now
    }
}

/// Display-only device attributes derived from the user-agent string.
/// Best-effort classification; unknown shapes fall back to "Unknown".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_type: String,
    pub browser: String,
    pub os: String,
}

impl DeviceInfo {
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_lowercase();

        let device_type = if ua.contains("ipad") || ua.contains("tablet") {
            "Tablet"
        } else if ua.contains("mobile") || ua.contains("iphone") || ua.contains("android") {
            "Mobile"
        } else if ua.is_empty() {
            "Unknown"
        } else {
            "Desktop"
        };

        // Order matters: Edge and Chrome both advertise "chrome", Chrome and
        // Safari both advertise "safari".
        let browser = if ua.contains("edg/") || ua.contains("edge") {
            "Edge"
        } else if ua.contains("firefox") {
            "Firefox"
        } else if ua.contains("chrome") || ua.contains("chromium") {
            "Chrome"
        } else if ua.contains("safari") {
            "Safari"
        } else {
            "Unknown"
        };

        let os = if ua.contains("windows") {
            "Windows"
        } else if ua.contains("iphone") || ua.contains("ipad") || ua.contains("ios") {
            "iOS"
        } else if ua.contains("mac os") || ua.contains("macintosh") {
            "macOS"
        } else if ua.contains("android") {
            "Android"
        } else if ua.contains("linux") {
            "Linux"
        } else {
            "Unknown"
        };

        Self {
            device_type: device_type.to_string(),
            browser: browser.to_string(),
            os: os.to_string(),
        }
    }
}

/// Session view for API responses (token withheld).
#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub ip_address: String,
    pub device_type: String,
    pub browser: String,
    pub os: String,
    pub location: String,
    pub created_utc: DateTime<Utc>,
    pub last_activity_utc: DateTime<Utc>,
    pub expires_utc: DateTime<Utc>,
}

impl From<UserSession> for SessionInfo {
    fn from(s: UserSession) -> Self {
        Self {
            session_id: s.session_id,
            ip_address: s.ip_address,
            device_type: s.device_type,
            browser: s.browser,
            os: s.os,
            location: s.location,
            created_utc: s.created_utc,
            last_activity_utc: s.last_activity_utc,
            expires_utc: s.expires_utc,
        }
    }
}
