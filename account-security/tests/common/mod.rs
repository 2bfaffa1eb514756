//! Shared fixtures for the integration tests: an in-memory store, a
//! deterministic hash provider, a recording alert sink, and a fixed
//! geolocation resolver.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use account_security::config::SecurityConfig;
use account_security::geo::GeoResolver;
use account_security::models::SecurityAlert;
use account_security::services::AlertSink;
use account_security::store::MemoryStore;
use account_security::utils::crypto::PasswordHashProvider;
use account_security::SecurityEngine;

/// Deterministic stand-in for the slow hash collaborator.
pub struct TestHasher;

impl PasswordHashProvider for TestHasher {
    fn hash(&self, password: &str) -> Result<String, anyhow::Error> {
        Ok(format!("hashed:{}", password))
    }

    fn verify(&self, password: &str, digest: &str) -> bool {
        digest == format!("hashed:{}", password)
    }
}

/// Sink that records everything it receives.
#[derive(Default)]
pub struct RecordingSink {
    pub alerts: Mutex<Vec<SecurityAlert>>,
    pub notifications: Mutex<Vec<(Uuid, String)>>,
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn publish_alert(&self, alert: SecurityAlert) -> Result<(), anyhow::Error> {
        self.alerts.lock().unwrap().push(alert);
        Ok(())
    }

    async fn notify_user(
        &self,
        user_id: Uuid,
        subject: &str,
        _body: &str,
    ) -> Result<(), anyhow::Error> {
        self.notifications
            .lock()
            .unwrap()
            .push((user_id, subject.to_string()));
        Ok(())
    }
}

impl RecordingSink {
    pub fn alert_count(&self) -> usize {
        self.alerts.lock().unwrap().len()
    }

    pub fn notification_count(&self) -> usize {
        self.notifications.lock().unwrap().len()
    }
}

/// Sink that always fails, for verifying that alerting never breaks the
/// login path.
pub struct FailingSink;

#[async_trait]
impl AlertSink for FailingSink {
    async fn publish_alert(&self, _alert: SecurityAlert) -> Result<(), anyhow::Error> {
        Err(anyhow::anyhow!("sink unavailable"))
    }

    async fn notify_user(
        &self,
        _user_id: Uuid,
        _subject: &str,
        _body: &str,
    ) -> Result<(), anyhow::Error> {
        Err(anyhow::anyhow!("sink unavailable"))
    }
}

/// Geolocation resolver backed by a fixed IP-to-label table.
#[derive(Default)]
pub struct FixedGeoResolver {
    table: HashMap<String, String>,
}

impl FixedGeoResolver {
    pub fn with(mut self, ip: &str, location: &str) -> Self {
        self.table.insert(ip.to_string(), location.to_string());
        self
    }
}

#[async_trait]
impl GeoResolver for FixedGeoResolver {
    async fn resolve(&self, ip_address: &str) -> Option<String> {
        self.table.get(ip_address).cloned()
    }
}

pub fn build_engine(
    store: Arc<MemoryStore>,
    geo: Arc<dyn GeoResolver>,
    alerts: Arc<dyn AlertSink>,
) -> SecurityEngine {
    account_security::observability::init_tracing("error");
    SecurityEngine::new(
        store,
        Arc::new(TestHasher),
        geo,
        alerts,
        &SecurityConfig::default(),
    )
}

/// Poll until `check` passes or a short deadline expires. Alert dispatch is
/// fire-and-forget on a spawned task, so tests wait for it to land.
pub async fn wait_until(check: impl Fn() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(check(), "condition not reached within deadline");
}
