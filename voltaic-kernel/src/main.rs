/**
 * VOLTAIC KERNEL - Point d'entrée du service
 *
 * RÔLE : Orchestration de tous les modules : config, client cloud, health,
 * API REST. Bootstrap complet avec gestion d'erreurs et logging.
 *
 * ARCHITECTURE : polling du cloud véhicule + wake orchestration + scoring
 * + API REST + publication santé MQTT.
 * UTILITÉ : point d'administration unique de l'évaluation batterie.
 */
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use voltaic_kernel::client::CloudApiClient;
use voltaic_kernel::config::load_config;
use voltaic_kernel::health::HealthTracker;
use voltaic_kernel::http::{build_router, AppState};
use voltaic_kernel::models::DevicesMap;
use voltaic_kernel::new_state;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // variables d'environnement depuis .env (s'il existe)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config().await;

    let token = std::env::var(&config.api.token_env).with_context(|| {
        format!(
            "missing cloud API token: set {} (OAuth refresh is out of kernel scope)",
            config.api.token_env
        )
    })?;

    let client = Arc::new(CloudApiClient::new(
        &config.api.base_url,
        &token,
        config.request_timeout(),
    ));
    println!("[kernel] cloud API: {}", config.api.base_url);

    let devices = new_state::<DevicesMap>(HashMap::new());
    let health = HealthTracker::new(client.stats());

    // publication auto de la santé kernel si un broker est configuré
    if let Some(mqtt) = config.mqtt.clone() {
        health.spawn_health_publisher(mqtt, devices.clone());
        println!("[kernel] health publisher enabled");
    }

    let app_state = AppState {
        client,
        devices,
        health,
        wake_config: config.wake_config(),
        inflight: new_state(HashMap::new()),
    };

    let app = build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port()));
    println!("[kernel] listening on http://{addr}");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
