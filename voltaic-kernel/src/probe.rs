use std::sync::Arc;

use time::{Duration, OffsetDateTime};

use crate::client::TelemetryClient;
use crate::error::TelemetryError;
use crate::models::{DeviceState, Reachability, WakeLikelihood};

/// Classifie la joignabilité d'un véhicule depuis la liste cloud, sans autre
/// effet de bord que la lecture réseau du client.
pub struct DeviceStateProbe<C> {
    client: Arc<C>,
}

impl<C: TelemetryClient> DeviceStateProbe<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// `DeviceNotFound` si l'id est absent de la liste, `Transient` si la
    /// liste elle-même est injoignable (l'appelant peut réessayer).
    pub async fn probe(&self, device_id: &str) -> Result<DeviceState, TelemetryError> {
        let devices = self.client.list_devices().await?;
        let entry = devices
            .iter()
            .find(|d| d.id == device_id)
            .ok_or_else(|| TelemetryError::DeviceNotFound(device_id.to_string()))?;
        Ok(entry.device_state())
    }
}

/// Conseil donné à l'appelant avant de payer une orchestration complète.
///
/// Online -> None (rien à réveiller), Asleep -> High (un wake suffit en
/// général), sinon tiers par ancienneté du dernier contact. Au-delà de 24h le
/// véhicule est considéré peu susceptible de se réveiller ; l'orchestrateur
/// tentera quand même si on le lui demande.
pub fn wake_likelihood(state: &DeviceState) -> WakeLikelihood {
    wake_likelihood_at(state, OffsetDateTime::now_utc())
}

fn wake_likelihood_at(state: &DeviceState, now: OffsetDateTime) -> WakeLikelihood {
    match state.reachability {
        Reachability::Online => WakeLikelihood::None,
        Reachability::Asleep => WakeLikelihood::High,
        Reachability::Offline | Reachability::Unknown => match state.last_seen {
            Some(seen) => {
                let age = now - seen;
                if age < Duration::hours(1) {
                    WakeLikelihood::High
                } else if age < Duration::hours(6) {
                    WakeLikelihood::Medium
                } else {
                    WakeLikelihood::Low
                }
            }
            None => WakeLikelihood::Low,
        },
    }
}

/// Âge du dernier contact en secondes, pour les vues HTTP.
pub fn staleness_seconds(state: &DeviceState) -> Option<i64> {
    state
        .last_seen
        .map(|seen| (OffsetDateTime::now_utc() - seen).whole_seconds().max(0))
}
