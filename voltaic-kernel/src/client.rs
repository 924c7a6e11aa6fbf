/**
 * CLIENT CLOUD VÉHICULE - Transport authentifié vers l'API constructeur
 *
 * RÔLE : Les trois primitives consommées par le kernel : liste des véhicules,
 * snapshot télémétrie d'un véhicule, envoi d'une commande de réveil.
 *
 * FONCTIONNEMENT : trait `TelemetryClient` comme couture d'injection (les
 * orchestrateurs prennent un client en paramètre, les tests passent un stub),
 * implémentation reqwest avec bearer token et timeout par requête.
 *
 * POLITIQUE WAKE : la commande de réveil est fire-and-forget. Un non-2xx est
 * loggé puis ignoré : le cloud rapporte parfois un échec alors que le véhicule
 * se réveille quand même.
 */
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::TelemetryError;
use crate::models::{DeviceSummary, RawSnapshot};

/// Couture d'injection vers le cloud véhicule.
pub trait TelemetryClient: Send + Sync {
    fn list_devices(
        &self,
    ) -> impl Future<Output = Result<Vec<DeviceSummary>, TelemetryError>> + Send;

    fn fetch_snapshot(
        &self,
        device_id: &str,
    ) -> impl Future<Output = Result<RawSnapshot, TelemetryError>> + Send;

    /// Best-effort : ne renvoie rien, les échecs sont ravalés par l'implémentation.
    fn send_wake_command(&self, device_id: &str) -> impl Future<Output = ()> + Send;
}

/// Compteurs partagés avec le HealthTracker.
#[derive(Debug, Default)]
pub struct ApiStats {
    pub requests: AtomicU64,
    pub errors: AtomicU64,
}

impl ApiStats {
    fn hit(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    fn miss(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// Enveloppe standard des réponses du cloud : { "response": ... }
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    response: T,
}

/// Implémentation reqwest du client cloud.
#[derive(Clone)]
pub struct CloudApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    stats: Arc<ApiStats>,
}

impl CloudApiClient {
    pub fn new(base_url: &str, token: &str, request_timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            stats: Arc::new(ApiStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<ApiStats> {
        self.stats.clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
    ) -> Result<T, TelemetryError> {
        self.stats.hit();
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.token)
            .header("x-request-id", Uuid::new_v4().to_string())
            .send()
            .await
            .map_err(|e| {
                self.stats.miss();
                TelemetryError::from(e)
            })?;

        let status = response.status();
        if status.as_u16() == 404 {
            self.stats.miss();
            return Err(TelemetryError::DeviceNotFound(path.to_string()));
        }
        // 408/503 = véhicule endormi ou cloud momentanément sans contact
        if status.as_u16() == 408 || status.as_u16() == 503 {
            self.stats.miss();
            return Err(TelemetryError::Unavailable {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            self.stats.miss();
            return Err(TelemetryError::BadResponse(format!(
                "http {} on {}",
                status, path
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| TelemetryError::BadResponse(e.to_string()))
    }
}

impl TelemetryClient for CloudApiClient {
    async fn list_devices(&self) -> Result<Vec<DeviceSummary>, TelemetryError> {
        let envelope: ApiEnvelope<Vec<DeviceSummary>> = self.get_json("/api/1/vehicles").await?;
        debug!(count = envelope.response.len(), "fetched vehicle list");
        Ok(envelope.response)
    }

    async fn fetch_snapshot(&self, device_id: &str) -> Result<RawSnapshot, TelemetryError> {
        let path = format!("/api/1/vehicles/{}/telemetry", device_id);
        let envelope: ApiEnvelope<RawSnapshot> = self.get_json(&path).await.map_err(|e| {
            // un 404 sur le chemin télémétrie veut dire "id inconnu"
            match e {
                TelemetryError::DeviceNotFound(_) => {
                    TelemetryError::DeviceNotFound(device_id.to_string())
                }
                other => other,
            }
        })?;
        Ok(envelope.response)
    }

    async fn send_wake_command(&self, device_id: &str) {
        self.stats.hit();
        let path = format!("/api/1/vehicles/{}/wake", device_id);
        let result = self
            .http
            .post(self.url(&path))
            .bearer_auth(&self.token)
            .header("x-request-id", Uuid::new_v4().to_string())
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(device_id, "wake command accepted");
            }
            Ok(response) => {
                // jamais fatal : la commande échoue parfois côté cloud alors
                // que le véhicule se réveille quand même
                warn!(device_id, status = %response.status(), "wake command rejected, ignoring");
            }
            Err(e) => {
                self.stats.miss();
                warn!(device_id, error = %e, "wake command failed to send, ignoring");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let client = CloudApiClient::new("http://cloud.local/", "tok", Duration::from_secs(5));
        assert_eq!(client.url("/api/1/vehicles"), "http://cloud.local/api/1/vehicles");
    }

    #[test]
    fn test_stats_start_at_zero() {
        let client = CloudApiClient::new("http://cloud.local", "tok", Duration::from_secs(5));
        let stats = client.stats();
        assert_eq!(stats.requests.load(Ordering::Relaxed), 0);
        assert_eq!(stats.errors.load(Ordering::Relaxed), 0);
    }
}
