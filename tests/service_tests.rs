//! End-to-end scenarios against the rate limiter facade with the local
//! store. Window lengths are shortened through per-call overrides so window
//! rollover can be observed without minute-long sleeps.

use planora_ratelimit::store::local::LocalStore;
use planora_ratelimit::store::RateLimitStore;
use planora_ratelimit::{
    bucket_key, LimitClass, LimitOverride, Limits, RateLimitService,
};
use std::time::Duration;

#[tokio::test]
async fn auth_class_exhausts_after_five_requests() {
    let service = RateLimitService::local(Limits::default());
    let key = bucket_key(LimitClass::Auth, "1.2.3.4", "POST", "/login");

    for expected_remaining in [4, 3, 2, 1, 0] {
        let decision = service.check_limit(&key, LimitClass::Auth, None).await;
        assert!(decision.allowed, "request within the auth quota");
        assert_eq!(decision.remaining, Some(expected_remaining));
    }

    let decision = service.check_limit(&key, LimitClass::Auth, None).await;
    assert!(!decision.allowed, "sixth login attempt must be rejected");
    assert_eq!(decision.remaining, Some(0));
    // 15 minute window, advertised in seconds
    let reset = decision.reset_secs.unwrap();
    assert!(reset >= 1 && reset <= 900);

    service.cleanup().await;
}

#[tokio::test]
async fn default_class_recovers_after_window_rollover() {
    let service = RateLimitService::local(Limits::default());
    let key = bucket_key(LimitClass::Default, "5.6.7.8", "GET", "/events");
    let over = LimitOverride {
        window_ms: Some(500),
        ..Default::default()
    };

    for n in 1..=60 {
        let decision = service
            .check_limit(&key, LimitClass::Default, Some(&over))
            .await;
        assert!(decision.allowed, "request {n} within the default quota");
    }

    let decision = service
        .check_limit(&key, LimitClass::Default, Some(&over))
        .await;
    assert!(!decision.allowed, "request 61 must be rejected");

    tokio::time::sleep(Duration::from_millis(600)).await;

    let decision = service
        .check_limit(&key, LimitClass::Default, Some(&over))
        .await;
    assert!(decision.allowed, "new window admits request 62");
    assert_eq!(
        decision.remaining,
        Some(59),
        "count restarted at 1, independent of the prior window"
    );

    service.cleanup().await;
}

#[tokio::test]
async fn separate_clients_do_not_share_buckets() {
    let service = RateLimitService::local(Limits::default());

    let first = bucket_key(LimitClass::Upload, "1.1.1.1", "POST", "/media");
    let second = bucket_key(LimitClass::Upload, "2.2.2.2", "POST", "/media");

    for _ in 0..10 {
        service.check_limit(&first, LimitClass::Upload, None).await;
    }
    let decision = service.check_limit(&first, LimitClass::Upload, None).await;
    assert!(!decision.allowed);

    let decision = service.check_limit(&second, LimitClass::Upload, None).await;
    assert!(decision.allowed, "other clients keep their full quota");
    assert_eq!(decision.remaining, Some(9));

    service.cleanup().await;
}

#[tokio::test]
async fn classes_do_not_share_buckets() {
    let service = RateLimitService::local(Limits::default());

    let auth_key = bucket_key(LimitClass::Auth, "9.9.9.9", "POST", "/login");
    let api_key = bucket_key(LimitClass::Api, "9.9.9.9", "GET", "/assistant");

    for _ in 0..6 {
        service.check_limit(&auth_key, LimitClass::Auth, None).await;
    }
    let decision = service.check_limit(&auth_key, LimitClass::Auth, None).await;
    assert!(!decision.allowed);

    // Same client, different class: untouched quota
    let decision = service.check_limit(&api_key, LimitClass::Api, None).await;
    assert!(decision.allowed);
    assert_eq!(decision.remaining, Some(99));

    service.cleanup().await;
}

#[tokio::test]
async fn expired_buckets_are_swept_from_the_local_store() {
    let store = LocalStore::with_sweep_interval(Duration::from_millis(50));

    store.increment("default:3.3.3.3:GET:/", 100).await.unwrap();
    store.increment("default:4.4.4.4:GET:/", 100).await.unwrap();
    assert_eq!(store.len(), 2);

    // Past both windows and at least one sweep cycle
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(store.len(), 0, "sweep bounds memory to active windows");

    store.cleanup().await;
}
