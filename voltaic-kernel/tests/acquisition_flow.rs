//! Flux d'acquisition de bout en bout : vrai client reqwest contre le stub
//! cloud du devkit (liste, télémétrie, wake, orchestration, scoring).

use std::sync::Arc;
use std::time::Duration;

use voltaic_devkit::builders::TelemetryBuilder;
use voltaic_devkit::cloud_stub::{StubCloud, StubVehicle};
use voltaic_devkit::test_utils::init_test_logging;
use voltaic_kernel::client::{CloudApiClient, TelemetryClient};
use voltaic_kernel::error::TelemetryError;
use voltaic_kernel::models::{Grade, Reachability, WakeLikelihood};
use voltaic_kernel::probe::{wake_likelihood, DeviceStateProbe};
use voltaic_kernel::wake::{AcquireOutcome, CancelToken, WakeConfig, WakeOrchestrator};
use voltaic_kernel::{comparison, scoring, validator};

fn fast_config() -> WakeConfig {
    WakeConfig {
        poll_interval: Duration::from_millis(25),
        wake_timeout: Duration::from_millis(2_000),
        rewake_interval: Duration::from_millis(500),
    }
}

async fn client_for(stub: &StubCloud) -> (CloudApiClient, voltaic_devkit::cloud_stub::StubCloudHandle) {
    let handle = stub.spawn().await.expect("stub cloud must bind");
    let client = CloudApiClient::new(&handle.base_url, "test-token", Duration::from_secs(2));
    (client, handle)
}

#[tokio::test]
async fn test_online_vehicle_direct_fetch_sends_no_wake() {
    init_test_logging();
    let stub = StubCloud::new();
    stub.add_vehicle(StubVehicle::online("veh1", TelemetryBuilder::healthy().build()));
    let (client, _handle) = client_for(&stub).await;

    let orchestrator = WakeOrchestrator::new(Arc::new(client), fast_config());
    let report = orchestrator.acquire("veh1", &CancelToken::detached()).await;

    let AcquireOutcome::Online(raw) = report.outcome else {
        panic!("expected online outcome");
    };
    assert_eq!(report.attempt.attempts_made, 1);
    assert_eq!(stub.wake_commands("veh1"), 0);

    let snapshot = validator::validate(&raw);
    assert_eq!(snapshot.battery_level, 85.0);
    let assessment = scoring::score(&snapshot);
    assert_eq!(assessment.grade, Grade::Excellent);
}

#[tokio::test]
async fn test_asleep_vehicle_wakes_after_polls() {
    init_test_logging();
    let stub = StubCloud::new();
    stub.add_vehicle(StubVehicle::asleep(
        "veh1",
        TelemetryBuilder::healthy().build(),
        1,
    ));
    let (client, _handle) = client_for(&stub).await;

    let orchestrator = WakeOrchestrator::new(Arc::new(client), fast_config());
    let report = orchestrator.acquire("veh1", &CancelToken::detached()).await;

    assert!(matches!(report.outcome, AcquireOutcome::Online(_)));
    assert!(report.attempt.attempts_made >= 2);
    assert!(stub.wake_commands("veh1") >= 1);
    assert!(report.attempt.last_command_sent_at.is_some());
}

#[tokio::test]
async fn test_never_waking_vehicle_times_out() {
    init_test_logging();
    let stub = StubCloud::new();
    stub.add_vehicle(StubVehicle::asleep(
        "veh1",
        TelemetryBuilder::healthy().build(),
        10_000,
    ));
    let (client, _handle) = client_for(&stub).await;

    let config = WakeConfig {
        poll_interval: Duration::from_millis(20),
        wake_timeout: Duration::from_millis(200),
        rewake_interval: Duration::from_millis(60),
    };
    let orchestrator = WakeOrchestrator::new(Arc::new(client), config);
    let report = orchestrator.acquire("veh1", &CancelToken::detached()).await;

    assert!(matches!(report.outcome, AcquireOutcome::TimedOut));
    assert!(stub.wake_commands("veh1") >= 1);
    assert!(stub.fetch_attempts("veh1") >= 2);
}

#[tokio::test]
async fn test_probe_classifies_and_advises() {
    init_test_logging();
    let stub = StubCloud::new();
    stub.add_vehicle(StubVehicle::asleep(
        "veh1",
        TelemetryBuilder::healthy().build(),
        0,
    ));
    let (client, _handle) = client_for(&stub).await;
    let probe = DeviceStateProbe::new(Arc::new(client));

    let state = probe.probe("veh1").await.expect("probe must succeed");
    assert_eq!(state.reachability, Reachability::Asleep);
    assert_eq!(wake_likelihood(&state), WakeLikelihood::High);

    match probe.probe("ghost").await {
        Err(TelemetryError::DeviceNotFound(id)) => assert_eq!(id, "ghost"),
        other => panic!("expected DeviceNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_degraded_payload_is_coerced_not_rejected() {
    init_test_logging();
    let stub = StubCloud::new();
    stub.add_vehicle(StubVehicle::online(
        "veh1",
        TelemetryBuilder::degraded().build(),
    ));
    let (client, _handle) = client_for(&stub).await;

    let raw = client.fetch_snapshot("veh1").await.expect("fetch must succeed");
    let snapshot = validator::validate(&raw);
    // "78" en string est accepté, null devient 0
    assert_eq!(snapshot.battery_level, 78.0);
    assert_eq!(snapshot.odometer_km, 0.0);
    // et le scoring reste total
    let assessment = scoring::score(&snapshot);
    assert!(assessment.overall_score <= 100);
}

#[tokio::test]
async fn test_comparison_degrades_to_synthetic_when_unreachable() {
    init_test_logging();
    let stub = StubCloud::new();
    stub.add_vehicle(StubVehicle::asleep(
        "veh1",
        TelemetryBuilder::healthy().build(),
        10_000,
    ));
    let (client, _handle) = client_for(&stub).await;

    let config = WakeConfig {
        poll_interval: Duration::from_millis(20),
        wake_timeout: Duration::from_millis(150),
        rewake_interval: Duration::from_millis(60),
    };
    let engine = comparison::ComparisonEngine::new(Arc::new(client), config);
    let result = engine.compare("veh1", &CancelToken::detached()).await;

    assert!(result.data_quality.is_synthetic);
    assert_eq!(result.differences.len(), 3);
}

#[tokio::test]
async fn test_comparison_live_vehicle_is_not_synthetic() {
    init_test_logging();
    let stub = StubCloud::new();
    stub.add_vehicle(StubVehicle::online("veh1", TelemetryBuilder::worn().build()));
    let (client, _handle) = client_for(&stub).await;

    let engine = comparison::ComparisonEngine::new(Arc::new(client), fast_config());
    let result = engine.compare("veh1", &CancelToken::detached()).await;

    assert!(!result.data_quality.is_synthetic);
    // 210 000 km : l'historique synthétisé atteint le plafond de sessions
    assert!(result.data_quality.charge_records > 50);
}
