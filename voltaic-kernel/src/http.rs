/**
 * API REST VOLTAIC - Surface HTTP du kernel
 *
 * RÔLE :
 * Expose les véhicules, leur état de joignabilité, les évaluations santé et
 * les comparaisons d'algorithmes au frontend/CLI.
 *
 * FONCTIONNEMENT :
 * - Serveur Axum avec middleware auth par clé API
 * - Routes : /health, /system/health, /devices, /devices/{id}/...
 * - Les issues typées de l'orchestration (wake_timeout, cancelled) deviennent
 *   des enveloppes JSON avec un champ status : jamais d'exception brute, le
 *   front peut proposer "réessayer" ou "voir l'estimation"
 *
 * SÉCURITÉ :
 * - Header x-api-key obligatoire partout sauf /health
 * - Validation middleware avant traitement métier
 */
use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;

use crate::client::{CloudApiClient, TelemetryClient};
use crate::comparison::ComparisonEngine;
use crate::error::TelemetryError;
use crate::health::{HealthTracker, KernelHealth};
use crate::models::{ComparisonResult, DeviceSummary, DevicesMap, Reachability, WakeLikelihood};
use crate::probe::{staleness_seconds, wake_likelihood};
use crate::scoring;
use crate::validator;
use crate::wake::{AcquireOutcome, CancelToken, WakeConfig, WakeOrchestrator};
use crate::Shared;

/// Un véhicule est considéré "stale" au-delà d'une heure sans contact.
const STALE_AFTER_SECONDS: i64 = 3_600;

#[derive(Clone)]
pub struct AppState {
    pub client: Arc<CloudApiClient>,
    pub devices: Shared<DevicesMap>,
    pub health: HealthTracker,
    pub wake_config: WakeConfig,
    /// Une orchestration à la fois par véhicule : les appels concurrents sur
    /// un même id se sérialisent ici.
    pub inflight: Shared<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

#[derive(Debug, Serialize)]
struct DeviceView {
    id: String,
    display_name: String,
    state: Reachability,
    last_seen: Option<String>, // RFC3339 pour l'API
    stale: bool,
    stale_for_seconds: Option<i64>,
    battery_level: Option<f64>,
    wake_likelihood: WakeLikelihood,
}

fn to_view(summary: &DeviceSummary) -> DeviceView {
    let state = summary.device_state();
    let stale_for = staleness_seconds(&state);
    DeviceView {
        id: summary.id.clone(),
        display_name: summary.display_name.clone(),
        state: state.reachability,
        last_seen: state
            .last_seen
            .and_then(|ts| ts.format(&Rfc3339).ok()),
        stale: stale_for.map_or(true, |s| s > STALE_AFTER_SECONDS),
        stale_for_seconds: stale_for,
        battery_level: state.battery_level,
        wake_likelihood: wake_likelihood(&state),
    }
}

async fn require_api_key(req: Request, next: Next) -> Result<Response, StatusCode> {
    // le liveness check reste toujours accessible
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let expected = std::env::var("VOLTAIC_API_KEY").unwrap_or_default();
    if expected.is_empty() {
        eprintln!("SECURITY: VOLTAIC_API_KEY not set - API access denied");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/devices", get(get_devices))
        .route("/devices/{id}", get(get_device))
        .route("/devices/{id}/wake", post(wake_device))
        .route("/devices/{id}/assessment", get(get_assessment))
        .route("/devices/{id}/comparison", get(get_comparison))
        .with_state(app_state)
        .layer(middleware::from_fn(require_api_key))
}

// GET /system/health (état du kernel lui-même)
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health.get_health(&app.devices))
}

// GET /devices (liste, rafraîchit le cache)
async fn get_devices(
    State(app): State<AppState>,
) -> Result<Json<Vec<DeviceView>>, StatusCode> {
    let devices = refresh_devices(&app).await.map_err(|_| StatusCode::BAD_GATEWAY)?;
    let mut views: Vec<DeviceView> = devices.values().map(to_view).collect();
    views.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(Json(views))
}

// GET /devices/{id} (détail)
async fn get_device(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeviceView>, StatusCode> {
    // liste fraîche si possible, cache sinon
    let devices = match refresh_devices(&app).await {
        Ok(devices) => devices,
        Err(_) => app.devices.lock().clone(),
    };
    let Some(summary) = devices.get(&id) else {
        return Err(StatusCode::NOT_FOUND);
    };
    Ok(Json(to_view(summary)))
}

// POST /devices/{id}/wake (commande best-effort, sans polling)
async fn wake_device(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let devices = match refresh_devices(&app).await {
        Ok(devices) => devices,
        Err(_) => app.devices.lock().clone(),
    };
    let Some(summary) = devices.get(&id) else {
        return Err(StatusCode::NOT_FOUND);
    };
    let likelihood = wake_likelihood(&summary.device_state());
    app.client.send_wake_command(&id).await;
    Ok(Json(serde_json::json!({
        "ok": true,
        "wake_likelihood": likelihood,
    })))
}

// GET /devices/{id}/assessment (orchestration + scoring)
async fn get_assessment(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    let _guard = inflight_guard(&app, &id).await;

    let orchestrator = WakeOrchestrator::new(app.client.clone(), app.wake_config);
    let report = orchestrator.acquire(&id, &CancelToken::detached()).await;

    match report.outcome {
        AcquireOutcome::Online(raw) => {
            let snapshot = validator::validate(&raw);
            let assessment = scoring::score(&snapshot);
            app.health.count_assessment();
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "status": "ok",
                    "assessment": assessment,
                    "snapshot": snapshot,
                    "wake_attempt": report.attempt,
                })),
            )
        }
        AcquireOutcome::TimedOut => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "wake_timeout",
                "wake_attempt": report.attempt,
            })),
        ),
        AcquireOutcome::Cancelled => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "cancelled",
                "wake_attempt": report.attempt,
            })),
        ),
        AcquireOutcome::Failed(TelemetryError::DeviceNotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "status": "not_found" })),
        ),
        AcquireOutcome::Failed(e) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({
                "status": "error",
                "message": e.to_string(),
                "wake_attempt": report.attempt,
            })),
        ),
    }
}

// GET /devices/{id}/comparison (jamais d'erreur : synthétique si injoignable)
async fn get_comparison(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Json<ComparisonResult> {
    let _guard = inflight_guard(&app, &id).await;

    let engine = ComparisonEngine::new(app.client.clone(), app.wake_config);
    let result = engine.compare(&id, &CancelToken::detached()).await;
    app.health.count_comparison();
    Json(result)
}

async fn refresh_devices(app: &AppState) -> Result<DevicesMap, TelemetryError> {
    let list = app.client.list_devices().await?;
    let map: DevicesMap = list.into_iter().map(|d| (d.id.clone(), d)).collect();
    *app.devices.lock() = map.clone();
    Ok(map)
}

async fn inflight_guard(app: &AppState, id: &str) -> tokio::sync::OwnedMutexGuard<()> {
    let lock = {
        let mut inflight = app.inflight.lock();
        inflight
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    };
    lock.lock_owned().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_view_marks_stale_devices() {
        let now = time::OffsetDateTime::now_utc().unix_timestamp() as f64;
        let fresh = DeviceSummary {
            id: "veh1".into(),
            display_name: "Titine".into(),
            state: "asleep".into(),
            last_seen: Some(now - 120.0),
            battery_level: Some(60.0),
        };
        let view = to_view(&fresh);
        assert!(!view.stale);
        assert_eq!(view.state, Reachability::Asleep);
        assert_eq!(view.wake_likelihood, WakeLikelihood::High);

        let old = DeviceSummary {
            last_seen: Some(now - 90_000.0),
            state: "offline".into(),
            ..fresh
        };
        let view = to_view(&old);
        assert!(view.stale);
        assert_eq!(view.wake_likelihood, WakeLikelihood::Low);

        let never_seen = DeviceSummary {
            id: "veh2".into(),
            display_name: "Mystère".into(),
            state: "offline".into(),
            last_seen: None,
            battery_level: None,
        };
        assert!(to_view(&never_seen).stale);
    }
}
