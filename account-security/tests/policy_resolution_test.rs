//! Policy resolution precedence, conflicts, and password expiry.

mod common;

use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use account_security::error::SecurityError;
use account_security::models::{PasswordPolicy, PolicyScope, UserRef};
use account_security::services::NoopAlertSink;
use account_security::store::MemoryStore;
use account_security::SecurityEngine;

use common::{build_engine, FixedGeoResolver};

fn engine_over(store: Arc<MemoryStore>) -> SecurityEngine {
    build_engine(store, Arc::new(FixedGeoResolver::default()), Arc::new(NoopAlertSink))
}

#[tokio::test]
async fn test_role_policy_wins_over_organization_policy() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());

    let role_id = Uuid::new_v4();
    let org_id = Uuid::new_v4();

    let mut role_policy = PasswordPolicy::new("clinical-staff", PolicyScope::Role(role_id));
    role_policy.min_length = 12;
    engine.create_policy(role_policy).await.unwrap();

    let mut org_policy = PasswordPolicy::new("org-default", PolicyScope::Organization(org_id));
    org_policy.min_length = 8;
    engine.create_policy(org_policy).await.unwrap();

    let user = UserRef::new(Uuid::new_v4())
        .with_organization(org_id)
        .with_roles(vec![role_id]);

    let resolved = engine.resolve_policy(&user, None).await.unwrap().unwrap();
    assert_eq!(resolved.min_length, 12);
    assert_eq!(resolved.scope, PolicyScope::Role(role_id));
}

#[tokio::test]
async fn test_first_role_in_attachment_order_wins() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());

    let first_role = Uuid::new_v4();
    let second_role = Uuid::new_v4();
    engine
        .create_policy(PasswordPolicy::new("first", PolicyScope::Role(first_role)))
        .await
        .unwrap();
    engine
        .create_policy(PasswordPolicy::new("second", PolicyScope::Role(second_role)))
        .await
        .unwrap();

    let user = UserRef::new(Uuid::new_v4()).with_roles(vec![first_role, second_role]);
    let resolved = engine.resolve_policy(&user, None).await.unwrap().unwrap();
    assert_eq!(resolved.name, "first");

    let reversed = UserRef::new(Uuid::new_v4()).with_roles(vec![second_role, first_role]);
    let resolved = engine.resolve_policy(&reversed, None).await.unwrap().unwrap();
    assert_eq!(resolved.name, "second");
}

#[tokio::test]
async fn test_explicit_policy_id_takes_precedence_when_active() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());

    let role_id = Uuid::new_v4();
    engine
        .create_policy(PasswordPolicy::new("role-bound", PolicyScope::Role(role_id)))
        .await
        .unwrap();
    let explicit = engine
        .create_policy(PasswordPolicy::new("explicit", PolicyScope::System))
        .await
        .unwrap();

    let user = UserRef::new(Uuid::new_v4()).with_roles(vec![role_id]);
    let resolved = engine
        .resolve_policy(&user, Some(explicit.policy_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.name, "explicit");
}

#[tokio::test]
async fn test_inactive_explicit_policy_falls_through_to_chain() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());

    let mut inactive = PasswordPolicy::new("retired", PolicyScope::System);
    inactive.is_active = false;
    let inactive = engine.create_policy(inactive).await.unwrap();

    let org_id = Uuid::new_v4();
    engine
        .create_policy(PasswordPolicy::new("org", PolicyScope::Organization(org_id)))
        .await
        .unwrap();

    let user = UserRef::new(Uuid::new_v4()).with_organization(org_id);
    let resolved = engine
        .resolve_policy(&user, Some(inactive.policy_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.name, "org");
}

#[tokio::test]
async fn test_system_policy_is_the_fallback_and_absence_is_degraded_mode() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());

    let user = UserRef::new(Uuid::new_v4());
    // Nothing configured at all: degraded mode, not an error.
    assert!(engine.resolve_policy(&user, None).await.unwrap().is_none());

    engine
        .create_policy(PasswordPolicy::new("system-default", PolicyScope::System))
        .await
        .unwrap();
    let resolved = engine.resolve_policy(&user, None).await.unwrap().unwrap();
    assert_eq!(resolved.name, "system-default");
}

#[tokio::test]
async fn test_duplicate_active_policy_name_conflicts() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());

    engine
        .create_policy(PasswordPolicy::new("dupe", PolicyScope::System))
        .await
        .unwrap();
    let err = engine
        .create_policy(PasswordPolicy::new(
            "dupe",
            PolicyScope::Role(Uuid::new_v4()),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, SecurityError::Conflict(_)));
}

#[tokio::test]
async fn test_policy_updates_are_visible_to_resolution() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());

    let mut policy = engine
        .create_policy(PasswordPolicy::new("evolving", PolicyScope::System))
        .await
        .unwrap();
    policy.min_length = 16;
    engine.update_policy(policy.clone()).await.unwrap();

    let fetched = engine.get_policy(policy.policy_id).await.unwrap();
    assert_eq!(fetched.min_length, 16);

    let user = UserRef::new(Uuid::new_v4());
    let resolved = engine.resolve_policy(&user, None).await.unwrap().unwrap();
    assert_eq!(resolved.min_length, 16);

    // Updating a policy that was never created is a lookup failure.
    let phantom = PasswordPolicy::new("phantom", PolicyScope::Role(Uuid::new_v4()));
    let err = engine.update_policy(phantom).await.unwrap_err();
    assert!(matches!(err, SecurityError::NotFound(_)));

    assert_eq!(engine.list_policies().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_password_expiry_follows_max_age() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());

    let mut policy = PasswordPolicy::new("rotating", PolicyScope::System);
    policy.max_age_days = Some(30);
    engine.create_policy(policy).await.unwrap();

    let stale = UserRef::new(Uuid::new_v4());
    store
        .add_password_history(stale.user_id, "hashed:old", Utc::now() - Duration::days(45))
        .await;
    assert!(engine.is_password_expired(&stale).await.unwrap());

    let fresh = UserRef::new(Uuid::new_v4());
    store
        .add_password_history(fresh.user_id, "hashed:new", Utc::now() - Duration::days(5))
        .await;
    assert!(!engine.is_password_expired(&fresh).await.unwrap());

    // No recorded change means nothing to expire.
    let unmanaged = UserRef::new(Uuid::new_v4());
    assert!(!engine.is_password_expired(&unmanaged).await.unwrap());
}
