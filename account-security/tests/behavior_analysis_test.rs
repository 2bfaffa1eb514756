//! Behavioral analysis, baseline creation, and compliance reporting.

mod common;

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use account_security::error::SecurityError;
use account_security::models::{ActivityEvent, PasswordPolicy, PolicyScope, UserRef};
use account_security::services::{AnalysisOutcome, BaselineOutcome, BehaviorAnomalyKind, NoopAlertSink};
use account_security::store::MemoryStore;
use account_security::SecurityEngine;

use common::{build_engine, FixedGeoResolver};

fn engine_over(store: Arc<MemoryStore>) -> SecurityEngine {
    build_engine(store, Arc::new(FixedGeoResolver::default()), Arc::new(NoopAlertSink))
}

/// Seed `count` events for one user on the day `days_ago` back from now,
/// cycling through the given hours.
async fn seed_events(
    store: &MemoryStore,
    user_id: Uuid,
    action: &str,
    count: usize,
    days_ago: i64,
    hours: &[u32],
) {
    let day = (Utc::now() - Duration::days(days_ago)).date_naive();
    for i in 0..count {
        let hour = hours[i % hours.len()];
        let ts: DateTime<Utc> = day
            .and_hms_opt(hour, (i % 60) as u32, 0)
            .unwrap()
            .and_utc();
        store
            .add_activity(ActivityEvent::new(user_id, action, ts))
            .await;
    }
}

#[tokio::test]
async fn test_zero_activity_is_insufficient_data_not_an_error() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());

    let outcome = engine
        .analyze_user_behavior(Uuid::new_v4(), None, None)
        .await
        .unwrap();
    assert!(matches!(outcome, AnalysisOutcome::InsufficientData));
}

#[tokio::test]
async fn test_report_contains_distributions_and_top_actions() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());
    let user_id = Uuid::new_v4();

    seed_events(&store, user_id, "RECORD_VIEW", 12, 5, &[9, 10]).await;
    seed_events(&store, user_id, "RECORD_EDIT", 4, 4, &[14]).await;

    let outcome = engine
        .analyze_user_behavior(user_id, Some(30), None)
        .await
        .unwrap();
    let report = match outcome {
        AnalysisOutcome::Report(report) => report,
        other => panic!("expected report, got {:?}", other),
    };

    assert_eq!(report.total_events, 16);
    assert_eq!(report.hourly_distribution.len(), 24);
    assert_eq!(report.weekday_distribution.len(), 7);
    assert_eq!(report.top_actions[0].action, "RECORD_VIEW");
    assert_eq!(report.top_actions[0].count, 12);
    assert_eq!(report.top_actions[0].percentage, 75.0);
    // No usable history: anomaly detection skipped, not failed.
    assert!(report.anomalies.is_empty());
}

#[tokio::test]
async fn test_anomalies_against_historical_baseline() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());
    let user_id = Uuid::new_v4();

    // History: 12 quiet morning events spread over the 90 days preceding
    // the window.
    for i in 0..12u32 {
        let ts = (Utc::now() - Duration::days(35 + (i as i64 * 7)))
            .date_naive()
            .and_hms_opt(9, 0, 0)
            .unwrap()
            .and_utc();
        store
            .add_activity(ActivityEvent::new(user_id, "RECORD_VIEW", ts))
            .await;
    }

    // Window: a burst of late-night activity including an action never
    // seen before.
    for i in 0..40u32 {
        let ts = (Utc::now() - Duration::days(1))
            .date_naive()
            .and_hms_opt(23, i % 60, 0)
            .unwrap()
            .and_utc();
        store
            .add_activity(ActivityEvent::new(user_id, "BULK_DOWNLOAD_RECORDS", ts))
            .await;
    }

    let outcome = engine
        .analyze_user_behavior(user_id, Some(30), None)
        .await
        .unwrap();
    let report = match outcome {
        AnalysisOutcome::Report(report) => report,
        other => panic!("expected report, got {:?}", other),
    };

    let kinds: Vec<BehaviorAnomalyKind> = report.anomalies.iter().map(|a| a.kind).collect();
    assert!(kinds.contains(&BehaviorAnomalyKind::UnusualActivityVolume));
    assert!(kinds.contains(&BehaviorAnomalyKind::NewActions));
    assert!(kinds.contains(&BehaviorAnomalyKind::UnusualTimePattern));

    // Two mediums and a low, plus 5 for the sensitive BULK_DOWNLOAD action
    // in the top-20.
    assert_eq!(report.risk_score, 30);
    // One recommendation per anomaly kind; score is below the tier lines.
    assert_eq!(report.recommendations.len(), 3);
}

#[tokio::test]
async fn test_analyze_honors_cancellation() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());
    let user_id = Uuid::new_v4();
    store
        .add_activity(ActivityEvent::new(
            user_id,
            "RECORD_VIEW",
            Utc::now() - Duration::days(2),
        ))
        .await;

    let token = CancellationToken::new();
    token.cancel();
    let err = engine
        .analyze_user_behavior(user_id, None, Some(&token))
        .await
        .unwrap_err();
    assert!(matches!(err, SecurityError::Cancelled));
}

#[tokio::test]
async fn test_baseline_requires_fifty_events() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());
    let user_id = Uuid::new_v4();

    for i in 0..49u32 {
        let ts = Utc::now() - Duration::days((i % 80) as i64) - Duration::hours(1);
        store
            .add_activity(ActivityEvent::new(user_id, "RECORD_VIEW", ts))
            .await;
    }

    match engine.create_baseline(user_id).await.unwrap() {
        BaselineOutcome::InsufficientData { found, required } => {
            assert_eq!(found, 49);
            assert_eq!(required, 50);
        }
        other => panic!("expected insufficient data, got {:?}", other),
    }
}

#[tokio::test]
async fn test_baseline_snapshot_is_persisted() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());
    let user_id = Uuid::new_v4();

    // 60 events at hour 9, 30 at hour 14, over the trailing 90 days.
    // Days start at 1 so no event lands in the future today.
    for i in 0..60u32 {
        let ts = (Utc::now() - Duration::days((i % 85) as i64 + 1))
            .date_naive()
            .and_hms_opt(9, 30, 0)
            .unwrap()
            .and_utc();
        store
            .add_activity(ActivityEvent::new(user_id, "RECORD_VIEW", ts))
            .await;
    }
    for i in 0..30u32 {
        let ts = (Utc::now() - Duration::days((i % 85) as i64 + 1))
            .date_naive()
            .and_hms_opt(14, 15, 0)
            .unwrap()
            .and_utc();
        store
            .add_activity(ActivityEvent::new(user_id, "RECORD_EDIT", ts))
            .await;
    }

    let baseline = match engine.create_baseline(user_id).await.unwrap() {
        BaselineOutcome::Created(baseline) => baseline,
        other => panic!("expected created, got {:?}", other),
    };
    assert_eq!(baseline.data_points, 90);
    assert_eq!(baseline.common_actions[0], "RECORD_VIEW");
    assert!(baseline.typical_hours.contains(&9));
    assert!(baseline.typical_hours.contains(&14));
    assert!(!baseline.typical_hours.contains(&3));

    use account_security::store::SecurityStore;
    let stored = store.latest_baseline(user_id).await.unwrap().unwrap();
    assert_eq!(stored.baseline_id, baseline.baseline_id);
}

#[tokio::test]
async fn test_compliance_report_buckets_users() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());

    let mut policy = PasswordPolicy::new("rotating", PolicyScope::System);
    policy.max_age_days = Some(30);
    engine.create_policy(policy).await.unwrap();

    let fresh = UserRef::new(Uuid::new_v4());
    let expired = UserRef::new(Uuid::new_v4());
    let never = UserRef::new(Uuid::new_v4());
    for user in [&fresh, &expired, &never] {
        store.add_user(user.clone()).await;
    }
    store
        .add_password_history(fresh.user_id, "hashed:a", Utc::now() - Duration::days(3))
        .await;
    store
        .add_password_history(expired.user_id, "hashed:b", Utc::now() - Duration::days(90))
        .await;

    let report = engine.get_compliance_report().await.unwrap();
    assert_eq!(report.total_users, 3);
    assert_eq!(report.compliant_users, 1);
    assert_eq!(report.expired_passwords, 1);
    assert_eq!(report.never_rotated, 1);
    assert_eq!(report.compliance_percentage, 33.33);
}

#[tokio::test]
async fn test_compliance_report_with_no_users_is_fully_compliant() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());

    let report = engine.get_compliance_report().await.unwrap();
    assert_eq!(report.total_users, 0);
    assert_eq!(report.compliance_percentage, 100.0);
}
