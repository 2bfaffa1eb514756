//! Alert and notification sink collaborator.
//!
//! Delivery transport (email, push, alert storage) lives outside this
//! engine; the hosting application implements [`AlertSink`]. Dispatch is
//! fire-and-forget: the login path must never wait on or fail because of
//! alerting.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::SecurityAlert;

/// External alerting collaborator.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Hand off a security alert for storage and routing.
    async fn publish_alert(&self, alert: SecurityAlert) -> Result<(), anyhow::Error>;

    /// Send a user-facing notification.
    async fn notify_user(
        &self,
        user_id: Uuid,
        subject: &str,
        body: &str,
    ) -> Result<(), anyhow::Error>;
}

/// Sink that drops everything. Useful for embedded deployments and tests
/// that do not assert on alerting.
#[derive(Debug, Clone, Default)]
pub struct NoopAlertSink;

#[async_trait]
impl AlertSink for NoopAlertSink {
    async fn publish_alert(&self, _alert: SecurityAlert) -> Result<(), anyhow::Error> {
        Ok(())
    }

    async fn notify_user(
        &self,
        _user_id: Uuid,
        _subject: &str,
        _body: &str,
    ) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

/// A user-facing notification paired with an alert.
#[derive(Debug, Clone)]
pub struct UserNotification {
    pub subject: String,
    pub body: String,
}

/// Fire-and-forget dispatcher over an [`AlertSink`].
#[derive(Clone)]
pub struct AlertDispatcher {
    sink: Arc<dyn AlertSink>,
}

impl AlertDispatcher {
    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self { sink }
    }

    /// Publish an alert (and optionally notify the user) on a spawned task.
    /// Sink failures are logged and swallowed; they never reach the caller.
    pub fn dispatch(&self, alert: SecurityAlert, notification: Option<UserNotification>) {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let user_id = alert.user_id;
            let alert_type = alert.alert_type.clone();
            if let Err(e) = sink.publish_alert(alert).await {
                tracing::error!(
                    user_id = %user_id,
                    alert_type = %alert_type,
                    error = %e,
                    "Failed to publish security alert"
                );
            }
            if let Some(notification) = notification {
                if let Err(e) = sink
                    .notify_user(user_id, &notification.subject, &notification.body)
                    .await
                {
                    tracing::error!(
                        user_id = %user_id,
                        error = %e,
                        "Failed to send security notification"
                    );
                }
            }
        });
    }
}
