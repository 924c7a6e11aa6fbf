use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde::Serialize;
use tokio::task;
use tracing::{debug, warn};

use crate::client::ApiStats;
use crate::config::MqttConf;
use crate::models::DevicesMap;
use crate::Shared;

/// Santé du kernel lui-même, exposée sur /system/health et publiée en MQTT.
#[derive(Debug, Serialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub devices_tracked: u32,
    pub assessments_computed: u64,
    pub comparisons_computed: u64,
    pub cloud_api_requests: u64,
    pub cloud_api_errors: u64,
    pub mqtt_status: String,
    pub memory_usage_mb: f32,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    api_stats: Arc<ApiStats>,
    assessments: Arc<AtomicU64>,
    comparisons: Arc<AtomicU64>,
    mqtt_status: Arc<parking_lot::Mutex<String>>,
}

impl HealthTracker {
    pub fn new(api_stats: Arc<ApiStats>) -> Self {
        Self {
            start_time: Instant::now(),
            api_stats,
            assessments: Arc::new(AtomicU64::new(0)),
            comparisons: Arc::new(AtomicU64::new(0)),
            mqtt_status: Arc::new(parking_lot::Mutex::new("disabled".to_string())),
        }
    }

    pub fn count_assessment(&self) {
        self.assessments.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_comparison(&self) {
        self.comparisons.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_health(&self, devices: &Shared<DevicesMap>) -> KernelHealth {
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            devices_tracked: devices.lock().len() as u32,
            assessments_computed: self.assessments.load(Ordering::Relaxed),
            comparisons_computed: self.comparisons.load(Ordering::Relaxed),
            cloud_api_requests: self.api_stats.requests.load(Ordering::Relaxed),
            cloud_api_errors: self.api_stats.errors.load(Ordering::Relaxed),
            mqtt_status: self.mqtt_status.lock().clone(),
            memory_usage_mb: memory_usage_mb(),
        }
    }

    /// Publication périodique de la santé kernel sur le bus MQTT.
    pub fn spawn_health_publisher(&self, mqtt: MqttConf, devices: Shared<DevicesMap>) {
        let tracker = self.clone();
        *tracker.mqtt_status.lock() = "connecting".to_string();

        task::spawn(async move {
            let mut opts = MqttOptions::new("voltaic-kernel-health", &mqtt.host, mqtt.port);
            opts.set_keep_alive(Duration::from_secs(15));
            let (client, mut eventloop) = AsyncClient::new(opts, 10);

            let mut interval = tokio::time::interval(Duration::from_secs(30));

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let health = tracker.get_health(&devices);
                        if let Ok(payload) = serde_json::to_string(&health) {
                            match client
                                .publish("voltaic/kernel/health@v1", QoS::AtLeastOnce, false, payload)
                                .await
                            {
                                Ok(_) => debug!(
                                    uptime = health.uptime_seconds,
                                    devices = health.devices_tracked,
                                    "published kernel health"
                                ),
                                Err(e) => warn!(error = %e, "failed to publish kernel health"),
                            }
                        }
                    },
                    event = eventloop.poll() => {
                        match event {
                            Ok(_) => {
                                *tracker.mqtt_status.lock() = "connected".to_string();
                            }
                            Err(e) => {
                                warn!(error = ?e, "MQTT connection error");
                                *tracker.mqtt_status.lock() = "reconnecting".to_string();
                                tokio::time::sleep(Duration::from_secs(2)).await;
                            }
                        }
                    }
                }
            }
        });
    }
}

fn memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        let pid = std::process::id();
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", pid)) {
            for line in status.lines() {
                if let Some(rest) = line.strip_prefix("VmRSS:") {
                    if let Some(kb) = rest
                        .split_whitespace()
                        .next()
                        .and_then(|v| v.parse::<u64>().ok())
                    {
                        return kb as f32 / 1024.0;
                    }
                }
            }
        }
    }
    // approximation quand /proc n'est pas disponible
    12.0
}
