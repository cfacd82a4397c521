//! Circuit breaker integration tests
//!
//! Trip, shed, probe, and recovery lifecycles observed through whole
//! routing flows and the admin surface.

use crate::harness::*;
use pretty_assertions::assert_eq;
use relay_config::HealthConfig;
use relay_core::error::RelayError;
use relay_core::event::RelayEvent;
use relay_core::outcome::DispatchError;
use relay_core::testing::StubBridge;
use relay_core::types::{Capability, HealthState, ProviderId};
use relay_registry::ProbeReport;
use std::sync::Arc;
use std::time::Duration;

/// Health parameters whose circuits stay open until an operator acts
fn manual_recovery_health() -> HealthConfig {
    HealthConfig {
        failure_threshold: 3,
        probe_successes: 1,
        cooldown: Duration::from_secs(60),
        cooldown_cap: Duration::from_secs(120),
        attempt_timeout: Duration::from_millis(200),
    }
}

fn upstream_error() -> DispatchError {
    DispatchError::provider("upstream 500")
}

fn three_failures() -> Vec<Result<serde_json::Value, DispatchError>> {
    vec![
        Err(upstream_error()),
        Err(upstream_error()),
        Err(upstream_error()),
    ]
}

/// Route `times` requests that are all expected to fail
async fn trip(fleet: &Fleet, times: u32) {
    for _ in 0..times {
        fleet
            .router
            .route(any_request())
            .await
            .expect_err("bridge scripted to fail");
    }
}

/// A failure streak opens the circuit and sheds the provider
#[tokio::test]
async fn test_failure_streak_opens_the_circuit() {
    let shaky = provider("shaky", 100, &[Capability::Text]);
    let bridge = matching_bridge(&shaky, StubBridge::failing(upstream_error()));
    let fleet = FleetBuilder::new()
        .provider(shaky, bridge.clone())
        .health(manual_recovery_health())
        .build();

    trip(&fleet, 3).await;

    assert_eq!(
        fleet.sink.count_where(|e| matches!(
            e,
            RelayEvent::CircuitTransition {
                to: HealthState::Open,
                ..
            }
        )),
        1
    );

    let error = fleet
        .router
        .route(any_request())
        .await
        .expect_err("provider is shed");
    assert!(matches!(error, RelayError::NoEligibleProvider { .. }));
    assert_eq!(bridge.calls(), 3);

    let status = fleet.registry.status();
    assert_eq!(status.providers[0].circuit.state, HealthState::Open);
}

/// After the cooldown a successful probe closes the circuit again
#[tokio::test]
async fn test_circuit_recovers_through_a_probe() {
    let flaky = provider("flaky", 100, &[Capability::Text]);
    let bridge = matching_bridge(&flaky, StubBridge::scripted(three_failures()));
    let fleet = FleetBuilder::new().provider(flaky, bridge.clone()).build();

    trip(&fleet, 3).await;
    tokio::time::sleep(Duration::from_millis(60)).await;

    let response = fleet
        .router
        .route(any_request())
        .await
        .expect("probe succeeds");
    assert_eq!(response.provider, ProviderId::from("flaky"));

    assert_eq!(
        fleet.sink.count_where(|e| matches!(
            e,
            RelayEvent::AttemptCompleted {
                probe: true,
                failure: None,
                ..
            }
        )),
        1
    );
    assert_eq!(
        fleet.sink.count_where(|e| matches!(
            e,
            RelayEvent::CircuitTransition {
                to: HealthState::Closed,
                ..
            }
        )),
        1
    );

    // Back to normal traffic, not probes.
    fleet.router.route(any_request()).await.expect("closed again");
    assert_eq!(bridge.calls(), 5);
    assert_eq!(
        fleet.registry.status().providers[0].circuit.state,
        HealthState::Closed
    );
}

/// Each failed probe doubles the cooldown up to the configured cap
#[tokio::test]
async fn test_failed_probe_doubles_the_cooldown() {
    let health = HealthConfig {
        failure_threshold: 3,
        probe_successes: 1,
        cooldown: Duration::from_millis(100),
        cooldown_cap: Duration::from_millis(800),
        attempt_timeout: Duration::from_millis(200),
    };
    let down = provider("down", 100, &[Capability::Text]);
    let bridge = matching_bridge(&down, StubBridge::failing(upstream_error()));
    let fleet = FleetBuilder::new()
        .provider(down, bridge.clone())
        .health(health)
        .build();

    trip(&fleet, 3).await;

    // First window: the probe runs, fails, and doubles the cooldown.
    tokio::time::sleep(Duration::from_millis(120)).await;
    fleet
        .router
        .route(any_request())
        .await
        .expect_err("probe fails");
    assert_eq!(bridge.calls(), 4);

    // The doubled cooldown has not elapsed yet.
    tokio::time::sleep(Duration::from_millis(120)).await;
    let error = fleet
        .router
        .route(any_request())
        .await
        .expect_err("still open");
    assert!(matches!(error, RelayError::NoEligibleProvider { .. }));
    assert_eq!(bridge.calls(), 4);

    // Now it has; the second probe runs, fails, and doubles again.
    tokio::time::sleep(Duration::from_millis(120)).await;
    fleet
        .router
        .route(any_request())
        .await
        .expect_err("second probe fails");
    assert_eq!(bridge.calls(), 5);
    assert_eq!(
        fleet.registry.status().providers[0].circuit.cooldown,
        Duration::from_millis(400)
    );
}

/// Only one request can hold the half-open probe slot
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_probe_slot_under_concurrency() {
    let flaky = provider("flaky", 100, &[Capability::Text]);
    let bridge = matching_bridge(
        &flaky,
        StubBridge::scripted(three_failures()).with_delay(Duration::from_millis(60)),
    );
    let fleet = Arc::new(FleetBuilder::new().provider(flaky, bridge.clone()).build());

    trip(&fleet, 3).await;
    tokio::time::sleep(Duration::from_millis(60)).await;

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let fleet = fleet.clone();
        tasks.push(tokio::spawn(async move {
            fleet.router.route(any_request()).await.is_ok()
        }));
    }
    let mut served = 0;
    for task in tasks {
        if task.await.expect("task ran") {
            served += 1;
        }
    }

    // One winner held the slot; everyone else backed off without
    // dispatching.
    assert_eq!(served, 1);
    assert_eq!(bridge.calls(), 4);
    assert_eq!(
        fleet
            .sink
            .count_where(|e| matches!(e, RelayEvent::AttemptCompleted { probe: true, .. })),
        1
    );
}

/// An operator reset restores a tripped provider to service
#[tokio::test]
async fn test_admin_reset_restores_service() {
    let wedged = provider("wedged", 100, &[Capability::Text]);
    let bridge = matching_bridge(&wedged, StubBridge::scripted(three_failures()));
    let fleet = FleetBuilder::new()
        .provider(wedged, bridge.clone())
        .health(manual_recovery_health())
        .build();

    trip(&fleet, 3).await;
    let error = fleet
        .router
        .route(any_request())
        .await
        .expect_err("provider is shed");
    assert!(matches!(error, RelayError::NoEligibleProvider { .. }));

    fleet
        .registry
        .reset_provider(&ProviderId::from("wedged"))
        .expect("known provider");

    let response = fleet
        .router
        .route(any_request())
        .await
        .expect("back in service");
    assert_eq!(response.provider, ProviderId::from("wedged"));
    assert_eq!(
        fleet
            .sink
            .count_where(|e| matches!(e, RelayEvent::ProviderReset { .. })),
        1
    );

    let status = fleet.registry.status();
    assert_eq!(status.providers[0].circuit.state, HealthState::Closed);
    assert_eq!(status.providers[0].circuit.consecutive_failures, 0);
}

/// Quarantine sheds a healthy provider until an operator intervenes
#[tokio::test]
async fn test_quarantine_sheds_a_healthy_provider() {
    let primary = provider("primary", 200, &[Capability::Text]);
    let backup = provider("backup", 100, &[Capability::Text]);
    let primary_bridge = matching_bridge(&primary, StubBridge::healthy());
    let backup_bridge = matching_bridge(&backup, StubBridge::healthy());

    let fleet = FleetBuilder::new()
        .provider(primary, primary_bridge.clone())
        .provider(backup, backup_bridge.clone())
        .health(manual_recovery_health())
        .build();

    fleet
        .registry
        .quarantine_provider(&ProviderId::from("primary"))
        .expect("known provider");

    let response = fleet.router.route(any_request()).await.expect("backup serves");
    assert_eq!(response.provider, ProviderId::from("backup"));
    assert_eq!(primary_bridge.calls(), 0);
    assert_eq!(backup_bridge.calls(), 1);
    assert_eq!(
        fleet.sink.count_where(|e| matches!(
            e,
            RelayEvent::CircuitTransition {
                from: HealthState::Closed,
                to: HealthState::Open,
                ..
            }
        )),
        1
    );
}

/// The admin probe can close a circuit without routing traffic
#[tokio::test]
async fn test_out_of_band_probe_recovers_circuit() {
    let flaky = provider("flaky", 100, &[Capability::Text]);
    let bridge = matching_bridge(&flaky, StubBridge::scripted(three_failures()));
    let fleet = FleetBuilder::new().provider(flaky, bridge.clone()).build();

    trip(&fleet, 3).await;
    tokio::time::sleep(Duration::from_millis(60)).await;

    let report = fleet
        .registry
        .probe(&ProviderId::from("flaky"))
        .await
        .expect("known provider");
    assert_eq!(report, ProbeReport::Healthy);
    assert_eq!(bridge.probes(), 1);

    let response = fleet
        .router
        .route(any_request())
        .await
        .expect("closed by probe");
    assert_eq!(response.provider, ProviderId::from("flaky"));
    assert_eq!(bridge.calls(), 4);
}
