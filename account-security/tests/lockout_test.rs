//! Lockout state machine: thresholds, resets, windows, and expiry.

mod common;

use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use account_security::error::SecurityError;
use account_security::models::{
    AccountLockout, FailedLoginAttempt, PasswordPolicy, PolicyScope, UserRef,
};
use account_security::services::NoopAlertSink;
use account_security::store::{MemoryStore, SecurityStore};
use account_security::SecurityEngine;

use common::{build_engine, FixedGeoResolver};

fn engine_over(store: Arc<MemoryStore>) -> SecurityEngine {
    build_engine(store, Arc::new(FixedGeoResolver::default()), Arc::new(NoopAlertSink))
}

async fn install_lockout_policy(engine: &SecurityEngine, threshold: u32) {
    let mut policy = PasswordPolicy::new("lockout", PolicyScope::System);
    policy.lockout_threshold = Some(threshold);
    policy.lockout_duration_minutes = Some(15);
    engine.create_policy(policy).await.unwrap();
}

#[tokio::test]
async fn test_lockout_triggers_exactly_at_threshold() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());
    install_lockout_policy(&engine, 5).await;
    let user = UserRef::new(Uuid::new_v4());

    for expected_remaining in [4u32, 3, 2, 1] {
        let outcome = engine.record_failed_attempt(&user).await.unwrap();
        assert!(outcome.lockout.is_none());
        assert!(!outcome.deactivate_account);

        let status = engine.check_account_lockout(&user).await.unwrap();
        assert!(!status.is_locked);
        assert_eq!(status.remaining_attempts, Some(expected_remaining));
    }

    let outcome = engine.record_failed_attempt(&user).await.unwrap();
    let lockout = outcome.lockout.expect("fifth failure must lock");
    assert!(outcome.deactivate_account);
    assert!(lockout.locked_until > Utc::now());

    let status = engine.check_account_lockout(&user).await.unwrap();
    assert!(status.is_locked);
    assert_eq!(status.locked_until, Some(lockout.locked_until));
    assert_eq!(status.remaining_attempts, Some(0));
}

#[tokio::test]
async fn test_success_resets_the_failure_count() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());
    install_lockout_policy(&engine, 5).await;
    let user = UserRef::new(Uuid::new_v4());

    for _ in 0..3 {
        engine.record_failed_attempt(&user).await.unwrap();
    }
    let cleared = engine.record_successful_attempt(user.user_id).await.unwrap();
    assert_eq!(cleared, 3);

    // The count starts over from zero, not from three.
    let outcome = engine.record_failed_attempt(&user).await.unwrap();
    assert_eq!(outcome.attempts_in_window, 1);
    let status = engine.check_account_lockout(&user).await.unwrap();
    assert_eq!(status.remaining_attempts, Some(4));
}

#[tokio::test]
async fn test_attempts_outside_the_window_do_not_count() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());
    install_lockout_policy(&engine, 5).await;
    let user = UserRef::new(Uuid::new_v4());

    for hours_ago in [25i64, 30, 48] {
        store
            .insert_failed_attempt(&FailedLoginAttempt {
                user_id: user.user_id,
                attempted_utc: Utc::now() - Duration::hours(hours_ago),
            })
            .await
            .unwrap();
    }

    let status = engine.check_account_lockout(&user).await.unwrap();
    assert!(!status.is_locked);
    assert_eq!(status.remaining_attempts, Some(5));
}

#[tokio::test]
async fn test_no_threshold_means_append_only() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());
    // System policy without lockout settings.
    engine
        .create_policy(PasswordPolicy::new("no-lockout", PolicyScope::System))
        .await
        .unwrap();
    let user = UserRef::new(Uuid::new_v4());

    for _ in 0..20 {
        let outcome = engine.record_failed_attempt(&user).await.unwrap();
        assert!(outcome.lockout.is_none());
    }
    let status = engine.check_account_lockout(&user).await.unwrap();
    assert!(!status.is_locked);
    assert_eq!(status.remaining_attempts, None);
}

#[tokio::test]
async fn test_expired_lockout_no_longer_locks() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());
    install_lockout_policy(&engine, 5).await;
    let user = UserRef::new(Uuid::new_v4());

    store
        .insert_lockout(&AccountLockout::new(
            user.user_id,
            Utc::now() - Duration::minutes(1),
            "expired lockout",
        ))
        .await
        .unwrap();

    let status = engine.check_account_lockout(&user).await.unwrap();
    assert!(!status.is_locked);
}

#[tokio::test]
async fn test_check_lockout_never_creates_a_lockout() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());
    install_lockout_policy(&engine, 2).await;
    let user = UserRef::new(Uuid::new_v4());

    // Two stale checks in a row with zero failures recorded.
    for _ in 0..2 {
        let status = engine.check_account_lockout(&user).await.unwrap();
        assert!(!status.is_locked);
        assert_eq!(status.remaining_attempts, Some(2));
    }
}

#[tokio::test]
async fn test_ensure_not_locked_collapses_into_typed_error() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());
    install_lockout_policy(&engine, 1).await;
    let user = UserRef::new(Uuid::new_v4());

    engine.record_failed_attempt(&user).await.unwrap();
    let err = engine
        .lockout_engine()
        .ensure_not_locked(&user)
        .await
        .unwrap_err();
    match err {
        SecurityError::LockedOut { until } => assert!(until > Utc::now()),
        other => panic!("expected LockedOut, got {:?}", other),
    }
}

#[tokio::test]
async fn test_concurrent_failures_never_lose_updates() {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(engine_over(store.clone()));
    install_lockout_policy(&engine, 50).await;
    let user = UserRef::new(Uuid::new_v4());

    let mut handles = Vec::new();
    for _ in 0..10 {
        let engine = engine.clone();
        let user = user.clone();
        handles.push(tokio::spawn(async move {
            engine.record_failed_attempt(&user).await.unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let status = engine.check_account_lockout(&user).await.unwrap();
    assert_eq!(status.remaining_attempts, Some(40));
}
