//! Rate limiting integration tests
//!
//! Windowed quota accounting across whole routing flows, including
//! window rolls and concurrent acquisition.

use crate::harness::*;
use pretty_assertions::assert_eq;
use relay_core::error::RelayError;
use relay_core::testing::StubBridge;
use relay_core::types::{Capability, ProviderId};
use std::sync::Arc;
use std::time::Duration;

/// A fleet with every credential at quota reports a transient error
#[tokio::test]
async fn test_all_at_quota_reads_as_transient() {
    let metered = capped_provider("metered", 100, &[Capability::Text], 1);
    let bridge = matching_bridge(&metered, StubBridge::healthy());
    let fleet = FleetBuilder::new().provider(metered, bridge.clone()).build();

    fleet.router.route(any_request()).await.expect("budget left");

    let error = fleet
        .router
        .route(any_request())
        .await
        .expect_err("window is drained");

    match &error {
        RelayError::NoCredentialAvailable { providers } => {
            assert_eq!(providers, &vec![ProviderId::from("metered")]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(error.is_transient());
    assert_eq!(bridge.calls(), 1);
}

/// A rolled window hands the budget back without any intervention
#[tokio::test]
async fn test_window_roll_restores_budget() {
    let mut metered = capped_provider("metered", 100, &[Capability::Text], 1);
    metered.rate_limit.window = Duration::from_millis(50);
    let bridge = matching_bridge(&metered, StubBridge::healthy());
    let fleet = FleetBuilder::new().provider(metered, bridge.clone()).build();

    fleet.router.route(any_request()).await.expect("budget left");
    fleet
        .router
        .route(any_request())
        .await
        .expect_err("window is drained");

    tokio::time::sleep(Duration::from_millis(60)).await;

    fleet.router.route(any_request()).await.expect("window rolled");
    assert_eq!(bridge.calls(), 2);
}

/// Concurrent requests spill to the fallback once the quota is gone
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_routes_respect_quota() {
    let metered = capped_provider("metered", 200, &[Capability::Text], 10);
    let fallback = provider("fallback", 100, &[Capability::Text]);
    let metered_bridge = matching_bridge(&metered, StubBridge::healthy());
    let fallback_bridge = matching_bridge(&fallback, StubBridge::healthy());

    let fleet = Arc::new(
        FleetBuilder::new()
            .provider(metered, metered_bridge.clone())
            .provider(fallback, fallback_bridge.clone())
            .build(),
    );

    let mut tasks = Vec::new();
    for _ in 0..40 {
        let fleet = fleet.clone();
        tasks.push(tokio::spawn(async move {
            fleet.router.route(any_request()).await
        }));
    }
    for outcome in futures::future::join_all(tasks).await {
        let response = outcome.expect("task ran").expect("routed");
        assert_eq!(response.attempts, 1);
    }

    // Reserve-then-validate never lets the preferred provider overshoot.
    assert_eq!(metered_bridge.calls(), 10);
    assert_eq!(fallback_bridge.calls(), 30);
}

/// Parallel acquisition grants exactly the configured quota
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_exact_quota_under_parallel_acquire() {
    let hammered = capped_provider("hammered", 100, &[Capability::Text], 50);
    let bridge = matching_bridge(&hammered, StubBridge::healthy());
    let fleet = Arc::new(FleetBuilder::new().provider(hammered, bridge).build());

    let mut tasks = Vec::new();
    for _ in 0..1000 {
        let fleet = fleet.clone();
        tasks.push(tokio::spawn(async move {
            fleet
                .registry
                .acquire(&ProviderId::from("hammered"))
                .is_ok()
        }));
    }

    let mut granted = 0;
    for task in tasks {
        if task.await.expect("task ran") {
            granted += 1;
        }
    }
    assert_eq!(granted, 50);

    let status = fleet.registry.status();
    assert_eq!(status.providers[0].credentials[0].used, 50);
}
