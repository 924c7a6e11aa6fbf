//! Surface REST du kernel : auth par clé API, vues devices, enveloppes
//! d'évaluation. Stub cloud du devkit derrière un vrai kernel servi en local.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use voltaic_devkit::builders::TelemetryBuilder;
use voltaic_devkit::cloud_stub::{StubCloud, StubVehicle};
use voltaic_devkit::test_utils::init_test_logging;
use voltaic_kernel::client::CloudApiClient;
use voltaic_kernel::health::HealthTracker;
use voltaic_kernel::http::{build_router, AppState};
use voltaic_kernel::models::DevicesMap;
use voltaic_kernel::new_state;
use voltaic_kernel::wake::WakeConfig;

const API_KEY: &str = "test-key";

struct TestKernel {
    base_url: String,
    stub: StubCloud,
    _stub_handle: voltaic_devkit::cloud_stub::StubCloudHandle,
}

async fn spawn_kernel(stub: StubCloud) -> TestKernel {
    init_test_logging();
    std::env::set_var("VOLTAIC_API_KEY", API_KEY);

    let stub_handle = stub.spawn().await.expect("stub cloud must bind");
    let client = Arc::new(CloudApiClient::new(
        &stub_handle.base_url,
        "test-token",
        Duration::from_secs(2),
    ));

    let app_state = AppState {
        health: HealthTracker::new(client.stats()),
        client,
        devices: new_state::<DevicesMap>(HashMap::new()),
        wake_config: WakeConfig {
            poll_interval: Duration::from_millis(25),
            wake_timeout: Duration::from_millis(1_500),
            rewake_interval: Duration::from_millis(400),
        },
        inflight: new_state(HashMap::new()),
    };

    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("kernel must bind");
    let addr = listener.local_addr().unwrap();
    let app = build_router(app_state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    TestKernel {
        base_url: format!("http://{addr}"),
        stub,
        _stub_handle: stub_handle,
    }
}

fn http() -> reqwest::Client {
    reqwest::Client::new()
}

#[tokio::test]
async fn test_health_is_open_everything_else_needs_key() {
    let stub = StubCloud::new();
    stub.add_vehicle(StubVehicle::online("veh1", TelemetryBuilder::healthy().build()));
    let kernel = spawn_kernel(stub).await;

    let response = http()
        .get(format!("{}/health", kernel.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");

    // sans clé : 401
    let response = http()
        .get(format!("{}/devices", kernel.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    // mauvaise clé : 401
    let response = http()
        .get(format!("{}/devices", kernel.base_url))
        .header("x-api-key", "wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn test_devices_view_carries_state_and_likelihood() {
    let stub = StubCloud::new();
    stub.add_vehicle(StubVehicle::online("veh1", TelemetryBuilder::healthy().build()));
    stub.add_vehicle(StubVehicle::asleep(
        "veh2",
        TelemetryBuilder::healthy().build(),
        0,
    ));
    let kernel = spawn_kernel(stub).await;

    let views: serde_json::Value = http()
        .get(format!("{}/devices", kernel.base_url))
        .header("x-api-key", API_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let views = views.as_array().unwrap();
    assert_eq!(views.len(), 2);
    assert_eq!(views[0]["id"], "veh1");
    assert_eq!(views[0]["state"], "online");
    assert_eq!(views[0]["wake_likelihood"], "none");
    assert_eq!(views[1]["state"], "asleep");
    assert_eq!(views[1]["wake_likelihood"], "high");

    // détail d'un id inconnu : 404
    let response = http()
        .get(format!("{}/devices/ghost", kernel.base_url))
        .header("x-api-key", API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn test_assessment_envelope_ok_after_wake() {
    let stub = StubCloud::new();
    stub.add_vehicle(StubVehicle::asleep(
        "veh1",
        TelemetryBuilder::healthy().build(),
        1,
    ));
    let kernel = spawn_kernel(stub).await;

    let body: serde_json::Value = http()
        .get(format!("{}/devices/veh1/assessment", kernel.base_url))
        .header("x-api-key", API_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "ok");
    assert_eq!(body["assessment"]["grade"], "Excellent");
    assert!(body["assessment"]["overall_score"].as_u64().unwrap() <= 100);
    assert!(body["wake_attempt"]["wake_commands_sent"].as_u64().unwrap() >= 1);
    assert!(kernel.stub.wake_commands("veh1") >= 1);
}

#[tokio::test]
async fn test_assessment_envelope_wake_timeout() {
    let stub = StubCloud::new();
    stub.add_vehicle(StubVehicle::asleep(
        "veh1",
        TelemetryBuilder::healthy().build(),
        10_000,
    ));
    let kernel = spawn_kernel(stub).await;

    let response = http()
        .get(format!("{}/devices/veh1/assessment", kernel.base_url))
        .header("x-api-key", API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    // le front branche sur ce status pour proposer "réessayer" / "estimation"
    assert_eq!(body["status"], "wake_timeout");
    assert!(body["wake_attempt"]["attempts_made"].as_u64().unwrap() >= 2);
}

#[tokio::test]
async fn test_comparison_endpoint_always_answers() {
    let stub = StubCloud::new();
    stub.add_vehicle(StubVehicle::online("veh1", TelemetryBuilder::worn().build()));
    let kernel = spawn_kernel(stub).await;

    let body: serde_json::Value = http()
        .get(format!("{}/devices/veh1/comparison", kernel.base_url))
        .header("x-api-key", API_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["data_quality"]["is_synthetic"], false);
    assert!(body["differences"]["health_score"]["primary"].is_number());

    // et la santé kernel compte le travail effectué
    let health: serde_json::Value = http()
        .get(format!("{}/system/health", kernel.base_url))
        .header("x-api-key", API_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["comparisons_computed"], 1);
    assert!(health["cloud_api_requests"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn test_wake_endpoint_is_best_effort() {
    let stub = StubCloud::new();
    stub.add_vehicle(StubVehicle::asleep(
        "veh1",
        TelemetryBuilder::healthy().build(),
        3,
    ));
    let kernel = spawn_kernel(stub).await;

    let body: serde_json::Value = http()
        .post(format!("{}/devices/veh1/wake", kernel.base_url))
        .header("x-api-key", API_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["ok"], true);
    assert_eq!(body["wake_likelihood"], "high");
    assert_eq!(kernel.stub.wake_commands("veh1"), 1);
}
