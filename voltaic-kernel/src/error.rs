/// Erreurs possibles côté acquisition télémétrie.
///
/// `TimedOut` et `Cancelled` n'apparaissent pas ici : ce sont des issues
/// normales de l'orchestration (voir `wake::WakeOutcome`), pas des erreurs.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    /// Le cloud répond mais le véhicule est injoignable pour l'instant.
    /// C'est le marqueur "needs wake" de l'orchestrateur.
    #[error("vehicle unavailable (http {status})")]
    Unavailable { status: u16 },
    #[error("transient transport failure: {0}")]
    Transient(String),
    #[error("unexpected response from cloud API: {0}")]
    BadResponse(String),
}

impl TelemetryError {
    /// Vrai pour les erreurs que la boucle de polling a le droit de ravaler
    /// jusqu'à épuisement du budget wake.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TelemetryError::Unavailable { .. } | TelemetryError::Transient(_)
        )
    }
}

impl From<reqwest::Error> for TelemetryError {
    fn from(err: reqwest::Error) -> Self {
        TelemetryError::Transient(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(TelemetryError::Unavailable { status: 408 }.is_retryable());
        assert!(TelemetryError::Transient("timeout".into()).is_retryable());
        assert!(!TelemetryError::DeviceNotFound("veh1".into()).is_retryable());
        assert!(!TelemetryError::BadResponse("not json".into()).is_retryable());
    }
}
