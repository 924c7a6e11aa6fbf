/**
 * WAKE ORCHESTRATOR - Machine à états réveil + polling
 *
 * RÔLE : Transformer la primitive "réveille un véhicule endormi" (asynchrone,
 * peu fiable) en acquisition de snapshot d'apparence synchrone : soit un
 * snapshot live dans le budget temps, soit une issue typée expliquant pourquoi.
 *
 * FONCTIONNEMENT : Start (fetch direct) -> Waking (wake command best-effort)
 * -> Polling (fetch toutes les poll_interval, re-wake toutes les
 * rewake_interval, plafond wake_timeout). L'appelant n'a pas à savoir si le
 * véhicule était déjà réveillé.
 *
 * CONTRAT : une orchestration par véhicule et par appel ; toutes les attentes
 * observent le signal d'annulation ; aucune opération n'est retentée
 * indéfiniment.
 */
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::TelemetryClient;
use crate::error::TelemetryError;
use crate::models::{RawSnapshot, Reachability};
use crate::probe::DeviceStateProbe;

/// Budgets temps de l'orchestration. Les défauts correspondent au comportement
/// observé du cloud : un véhicule met typiquement 15 à 60 s à se réveiller.
#[derive(Debug, Clone, Copy)]
pub struct WakeConfig {
    pub poll_interval: Duration,
    pub wake_timeout: Duration,
    pub rewake_interval: Duration,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(5_000),
            wake_timeout: Duration::from_millis(120_000),
            rewake_interval: Duration::from_millis(30_000),
        }
    }
}

/// Issue d'une orchestration. TimedOut et Cancelled sont des résultats normaux
/// en régime permanent, pas des exceptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeOutcome {
    Online,
    TimedOut,
    Cancelled,
    Error,
}

/// Trace d'une orchestration, renvoyée à l'appelant avec l'issue.
#[derive(Debug, Clone, Serialize)]
pub struct WakeAttempt {
    pub id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    /// Nombre de fetchs tentés, fetch direct compris.
    pub attempts_made: u32,
    pub wake_commands_sent: u32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_command_sent_at: Option<OffsetDateTime>,
    pub outcome: WakeOutcome,
}

impl WakeAttempt {
    fn begin() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: OffsetDateTime::now_utc(),
            attempts_made: 0,
            wake_commands_sent: 0,
            last_command_sent_at: None,
            outcome: WakeOutcome::Error,
        }
    }
}

/// Résultat complet d'une acquisition.
#[derive(Debug)]
pub enum AcquireOutcome {
    Online(RawSnapshot),
    TimedOut,
    Cancelled,
    Failed(TelemetryError),
}

#[derive(Debug)]
pub struct AcquireReport {
    pub outcome: AcquireOutcome,
    pub attempt: WakeAttempt,
}

/// Signal d'annulation fourni par l'appelant, observé à chaque point de
/// suspension de la boucle de polling.
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl CancelToken {
    /// Token jamais annulé, pour les appelants sans besoin d'abort.
    pub fn detached() -> Self {
        let (_tx, rx) = watch::channel(false);
        CancelToken { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // Err = handle droppé sans annuler : l'annulation ne viendra jamais
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Hook d'observation : la narration de l'orchestration est un souci
/// orthogonal, injectable pour les tests, tracing par défaut.
pub trait WakeObserver: Send + Sync {
    fn on_event(&self, device_id: &str, event: &WakeEvent);
}

#[derive(Debug)]
pub enum WakeEvent {
    DirectHit,
    NeedsWake { reachability: Reachability },
    WakeCommandSent { total: u32 },
    PollMiss { attempts: u32, elapsed_ms: u64 },
    Done { outcome: WakeOutcome },
}

/// Observateur par défaut : événements vers tracing.
pub struct TracingObserver;

impl WakeObserver for TracingObserver {
    fn on_event(&self, device_id: &str, event: &WakeEvent) {
        match event {
            WakeEvent::DirectHit => debug!(device_id, "vehicle already online"),
            WakeEvent::NeedsWake { reachability } => {
                info!(device_id, ?reachability, "vehicle needs waking")
            }
            WakeEvent::WakeCommandSent { total } => {
                info!(device_id, total, "wake command sent")
            }
            WakeEvent::PollMiss { attempts, elapsed_ms } => {
                debug!(device_id, attempts, elapsed_ms, "vehicle still unreachable")
            }
            WakeEvent::Done { outcome } => match outcome {
                WakeOutcome::Online => info!(device_id, "vehicle online"),
                WakeOutcome::TimedOut => warn!(device_id, "wake budget exhausted"),
                WakeOutcome::Cancelled => info!(device_id, "orchestration cancelled"),
                WakeOutcome::Error => warn!(device_id, "orchestration failed"),
            },
        }
    }
}

pub struct WakeOrchestrator<C> {
    client: Arc<C>,
    config: WakeConfig,
    observer: Arc<dyn WakeObserver>,
}

impl<C: TelemetryClient> WakeOrchestrator<C> {
    pub fn new(client: Arc<C>, config: WakeConfig) -> Self {
        Self {
            client,
            config,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn WakeObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Acquiert un snapshot live dans le budget, ou une issue typée.
    pub async fn acquire(&self, device_id: &str, cancel: &CancelToken) -> AcquireReport {
        let started = Instant::now();
        let mut attempt = WakeAttempt::begin();

        // --- Start : fetch direct, le chemin "déjà réveillé" ne commande rien
        attempt.attempts_made += 1;
        let first_error = match self.client.fetch_snapshot(device_id).await {
            Ok(snapshot) => {
                self.observer.on_event(device_id, &WakeEvent::DirectHit);
                return self.done(device_id, attempt, AcquireOutcome::Online(snapshot));
            }
            Err(e) if !e.is_retryable() => {
                return self.done(device_id, attempt, AcquireOutcome::Failed(e));
            }
            Err(e) => e,
        };

        // Classification du "needs wake" : Asleep/Offline/Unknown déclenchent
        // l'orchestration ; un véhicule listé online dont le fetch échoue en
        // transport est une erreur non classifiée.
        let reachability = match first_error {
            TelemetryError::Unavailable { .. } => Reachability::Asleep,
            _ => {
                let probe = DeviceStateProbe::new(self.client.clone());
                match probe.probe(device_id).await {
                    Ok(state) => state.reachability,
                    Err(TelemetryError::DeviceNotFound(id)) => {
                        return self.done(
                            device_id,
                            attempt,
                            AcquireOutcome::Failed(TelemetryError::DeviceNotFound(id)),
                        );
                    }
                    // liste injoignable : on ne sait rien, on tente le réveil
                    Err(_) => Reachability::Unknown,
                }
            }
        };
        if reachability == Reachability::Online {
            return self.done(device_id, attempt, AcquireOutcome::Failed(first_error));
        }
        self.observer
            .on_event(device_id, &WakeEvent::NeedsWake { reachability });

        // --- Waking : première commande de réveil, best-effort
        if cancel.is_cancelled() {
            return self.done(device_id, attempt, AcquireOutcome::Cancelled);
        }
        let mut last_command = Instant::now();
        self.client.send_wake_command(device_id).await;
        attempt.wake_commands_sent += 1;
        attempt.last_command_sent_at = Some(OffsetDateTime::now_utc());
        self.observer.on_event(
            device_id,
            &WakeEvent::WakeCommandSent {
                total: attempt.wake_commands_sent,
            },
        );

        // --- Polling : fetch périodique jusqu'à succès, budget ou annulation
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return self.done(device_id, attempt, AcquireOutcome::Cancelled);
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            attempt.attempts_made += 1;
            match self.client.fetch_snapshot(device_id).await {
                Ok(snapshot) => {
                    return self.done(device_id, attempt, AcquireOutcome::Online(snapshot));
                }
                Err(e) if !e.is_retryable() => {
                    return self.done(device_id, attempt, AcquireOutcome::Failed(e));
                }
                Err(_) => {
                    let elapsed = started.elapsed();
                    self.observer.on_event(
                        device_id,
                        &WakeEvent::PollMiss {
                            attempts: attempt.attempts_made,
                            elapsed_ms: elapsed.as_millis() as u64,
                        },
                    );
                    if elapsed >= self.config.wake_timeout {
                        return self.done(device_id, attempt, AcquireOutcome::TimedOut);
                    }
                    if last_command.elapsed() >= self.config.rewake_interval
                        && !cancel.is_cancelled()
                    {
                        last_command = Instant::now();
                        self.client.send_wake_command(device_id).await;
                        attempt.wake_commands_sent += 1;
                        attempt.last_command_sent_at = Some(OffsetDateTime::now_utc());
                        self.observer.on_event(
                            device_id,
                            &WakeEvent::WakeCommandSent {
                                total: attempt.wake_commands_sent,
                            },
                        );
                    }
                }
            }
        }
    }

    fn done(
        &self,
        device_id: &str,
        mut attempt: WakeAttempt,
        outcome: AcquireOutcome,
    ) -> AcquireReport {
        attempt.outcome = match &outcome {
            AcquireOutcome::Online(_) => WakeOutcome::Online,
            AcquireOutcome::TimedOut => WakeOutcome::TimedOut,
            AcquireOutcome::Cancelled => WakeOutcome::Cancelled,
            AcquireOutcome::Failed(_) => WakeOutcome::Error,
        };
        self.observer.on_event(
            device_id,
            &WakeEvent::Done {
                outcome: attempt.outcome,
            },
        );
        AcquireReport { outcome, attempt }
    }
}
