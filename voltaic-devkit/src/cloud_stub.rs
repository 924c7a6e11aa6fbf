/*!
Stub du cloud véhicule pour développement sans compte constructeur

Sert les trois endpoints que le kernel consomme (liste, télémétrie, wake) avec
un comportement scripté : un véhicule endormi ne livre sa télémétrie qu'après
une commande de réveil suivie d'un nombre configurable de polls. Tous les
échanges sont comptés pour les assertions de tests.
*/

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Un véhicule scripté du stub.
#[derive(Debug, Clone)]
pub struct StubVehicle {
    pub id: String,
    pub display_name: String,
    /// "online", "asleep" ou "offline"
    pub state: String,
    pub last_seen_epoch: Option<f64>,
    pub battery_level: Option<f64>,
    /// Payload télémétrie renvoyé une fois le véhicule online.
    pub telemetry: Value,
    /// Nombre de fetchs encore en 408 après la commande de réveil.
    pub polls_to_wake: u32,
}

impl StubVehicle {
    pub fn online(id: &str, telemetry: Value) -> Self {
        Self {
            id: id.to_string(),
            display_name: format!("stub-{id}"),
            state: "online".to_string(),
            last_seen_epoch: None,
            battery_level: Some(80.0),
            telemetry,
            polls_to_wake: 0,
        }
    }

    pub fn asleep(id: &str, telemetry: Value, polls_to_wake: u32) -> Self {
        Self {
            state: "asleep".to_string(),
            polls_to_wake,
            ..Self::online(id, telemetry)
        }
    }
}

#[derive(Debug)]
struct VehicleSlot {
    vehicle: StubVehicle,
    wake_commands: u32,
    fetch_attempts: u32,
    /// Some(n) après un wake : encore n fetchs avant le passage online.
    pending_polls: Option<u32>,
}

#[derive(Default)]
struct StubInner {
    vehicles: HashMap<String, VehicleSlot>,
}

/// Stub partageable : cloné dans les handlers axum et gardé côté test pour
/// les assertions.
#[derive(Clone, Default)]
pub struct StubCloud {
    inner: Arc<Mutex<StubInner>>,
}

impl StubCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vehicle(&self, vehicle: StubVehicle) {
        log::info!("📡 [STUB] vehicle {} registered ({})", vehicle.id, vehicle.state);
        self.inner.lock().vehicles.insert(
            vehicle.id.clone(),
            VehicleSlot {
                vehicle,
                wake_commands: 0,
                fetch_attempts: 0,
                pending_polls: None,
            },
        );
    }

    /// Nombre de commandes de réveil reçues (pour assertions).
    pub fn wake_commands(&self, id: &str) -> u32 {
        self.inner
            .lock()
            .vehicles
            .get(id)
            .map(|s| s.wake_commands)
            .unwrap_or(0)
    }

    /// Nombre de fetchs télémétrie reçus (pour assertions).
    pub fn fetch_attempts(&self, id: &str) -> u32 {
        self.inner
            .lock()
            .vehicles
            .get(id)
            .map(|s| s.fetch_attempts)
            .unwrap_or(0)
    }

    /// Force l'état d'un véhicule ("online", "asleep", "offline").
    pub fn set_state(&self, id: &str, state: &str) {
        if let Some(slot) = self.inner.lock().vehicles.get_mut(id) {
            slot.vehicle.state = state.to_string();
            slot.pending_polls = None;
        }
    }

    fn handle_list(&self) -> Value {
        let inner = self.inner.lock();
        let mut entries: Vec<Value> = inner
            .vehicles
            .values()
            .map(|slot| {
                json!({
                    "id": slot.vehicle.id,
                    "display_name": slot.vehicle.display_name,
                    "state": slot.vehicle.state,
                    "last_seen": slot.vehicle.last_seen_epoch,
                    "battery_level": slot.vehicle.battery_level,
                })
            })
            .collect();
        entries.sort_by_key(|v| v["id"].as_str().unwrap_or_default().to_string());
        json!({ "response": entries })
    }

    fn handle_fetch(&self, id: &str) -> (u16, Value) {
        let mut inner = self.inner.lock();
        let Some(slot) = inner.vehicles.get_mut(id) else {
            return (404, json!({ "error": "unknown vehicle" }));
        };
        slot.fetch_attempts += 1;

        if slot.vehicle.state == "online" {
            return (200, json!({ "response": slot.vehicle.telemetry }));
        }

        match slot.pending_polls {
            // réveil en cours : encore n polls de latence simulée
            Some(n) if n == 0 => {
                slot.vehicle.state = "online".to_string();
                slot.pending_polls = None;
                log::info!("📡 [STUB] vehicle {id} woke up");
                (200, json!({ "response": slot.vehicle.telemetry }))
            }
            Some(n) => {
                slot.pending_polls = Some(n - 1);
                (408, json!({ "error": "vehicle unavailable" }))
            }
            // pas de wake reçu : le véhicule dort
            None => (408, json!({ "error": "vehicle unavailable" })),
        }
    }

    fn handle_wake(&self, id: &str) -> (u16, Value) {
        let mut inner = self.inner.lock();
        let Some(slot) = inner.vehicles.get_mut(id) else {
            return (404, json!({ "error": "unknown vehicle" }));
        };
        slot.wake_commands += 1;
        log::info!("📡 [STUB] wake command #{} for {id}", slot.wake_commands);

        if slot.vehicle.state != "online" && slot.pending_polls.is_none() {
            slot.pending_polls = Some(slot.vehicle.polls_to_wake);
        }
        (200, json!({ "response": { "result": true } }))
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/1/vehicles", get(list_vehicles))
            .route("/api/1/vehicles/{id}/telemetry", get(fetch_telemetry))
            .route("/api/1/vehicles/{id}/wake", post(wake_vehicle))
            .with_state(self.clone())
    }

    /// Démarre le stub sur un port éphémère et renvoie son URL de base.
    pub async fn spawn(&self) -> anyhow::Result<StubCloudHandle> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        log::info!("📡 [STUB] cloud listening on http://{addr}");
        Ok(StubCloudHandle {
            base_url: format!("http://{addr}"),
            task,
        })
    }
}

pub struct StubCloudHandle {
    pub base_url: String,
    task: JoinHandle<()>,
}

impl Drop for StubCloudHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn list_vehicles(State(stub): State<StubCloud>) -> Json<Value> {
    Json(stub.handle_list())
}

async fn fetch_telemetry(
    State(stub): State<StubCloud>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    let (code, body) = stub.handle_fetch(&id);
    (
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(body),
    )
}

async fn wake_vehicle(
    State(stub): State<StubCloud>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    let (code, body) = stub.handle_wake(&id);
    (
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(body),
    )
}
