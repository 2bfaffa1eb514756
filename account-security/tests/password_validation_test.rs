//! Password validation against resolved policies, including reuse checks.

mod common;

use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use account_security::models::{PasswordPolicy, PolicyScope, UserRef};
use account_security::services::NoopAlertSink;
use account_security::store::MemoryStore;
use account_security::SecurityEngine;

use common::{build_engine, FixedGeoResolver};

fn engine_over(store: Arc<MemoryStore>) -> SecurityEngine {
    build_engine(store, Arc::new(FixedGeoResolver::default()), Arc::new(NoopAlertSink))
}

/// Seed a system policy with prevent_reuse = 3 and a four-entry password
/// history (newest first: pw1, pw2, pw3, pw4).
async fn seed_reuse_fixture(store: &MemoryStore, engine: &SecurityEngine) -> UserRef {
    let mut policy = PasswordPolicy::new("reuse-guard", PolicyScope::System);
    policy.prevent_reuse = 3;
    policy.require_special_chars = false;
    engine.create_policy(policy).await.unwrap();

    let user = UserRef::new(Uuid::new_v4());
    let now = Utc::now();
    for (age_days, password) in [
        (10, "Venus7Mars7a"),
        (20, "Pluto8Comet8b"),
        (30, "Orbit9Lunar5c"),
        (40, "Nadir4Zenith6d"),
    ] {
        store
            .add_password_history(
                user.user_id,
                format!("hashed:{}", password),
                now - Duration::days(age_days),
            )
            .await;
    }
    user
}

#[tokio::test]
async fn test_reuse_of_recent_password_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());
    let user = seed_reuse_fixture(&store, &engine).await;

    // Second-newest password falls inside the prevent_reuse horizon.
    let report = engine
        .validate_password(&user, "Pluto8Comet8b")
        .await
        .unwrap();
    assert!(!report.is_valid);
    assert!(report.errors.iter().any(|e| e.contains("last 3 passwords")));
}

#[tokio::test]
async fn test_reuse_horizon_is_bounded() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());
    let user = seed_reuse_fixture(&store, &engine).await;

    // The fourth-oldest hash sits outside prevent_reuse = 3 and may be
    // reused.
    let report = engine
        .validate_password(&user, "Nadir4Zenith6d")
        .await
        .unwrap();
    assert!(report.is_valid, "errors: {:?}", report.errors);
}

#[tokio::test]
async fn test_fresh_password_earns_the_reuse_weight() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());
    let user = seed_reuse_fixture(&store, &engine).await;

    let report = engine
        .validate_password(&user, "Quasar3Nebula7x")
        .await
        .unwrap();
    assert!(report.is_valid);
    // length 20 + upper 15 + lower 15 + numbers 15 + pattern 10 + reuse 10;
    // special chars disabled so its weight is absent.
    assert_eq!(report.score, 85);
}

#[tokio::test]
async fn test_degraded_mode_applies_baseline_rules() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());
    let user = UserRef::new(Uuid::new_v4());

    // No policy anywhere: 8-char minimum with mixed case and a number.
    let report = engine.validate_password(&user, "Basel1ne").await.unwrap();
    assert!(report.is_valid);
    assert_eq!(report.score, 100);

    let report = engine.validate_password(&user, "nodigits").await.unwrap();
    assert!(!report.is_valid);
}

#[tokio::test]
async fn test_policy_violations_accumulate() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());

    let mut policy = PasswordPolicy::new("strict", PolicyScope::System);
    policy.min_length = 14;
    policy.require_special_chars = true;
    engine.create_policy(policy).await.unwrap();

    let user = UserRef::new(Uuid::new_v4());
    let report = engine.validate_password(&user, "short").await.unwrap();
    assert!(!report.is_valid);
    // Length, uppercase, number, special all missing.
    assert_eq!(report.errors.len(), 4);
}
