use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

use crate::wake::WakeConfig;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KernelConfig {
    pub api: ApiConf,
    pub wake: Option<WakeConf>,
    pub mqtt: Option<MqttConf>,
    pub http: Option<HttpConf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ApiConf {
    pub base_url: String,
    /// Nom de la variable d'environnement qui porte le bearer token.
    /// L'acquisition/refresh OAuth est hors du kernel.
    pub token_env: String,
    pub request_timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WakeConf {
    pub poll_interval_ms: Option<u64>,
    pub wake_timeout_ms: Option<u64>,
    pub rewake_interval_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpConf {
    pub port: u16,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            api: ApiConf {
                base_url: "https://cloud.example.com".into(),
                token_env: "VOLTAIC_API_TOKEN".into(),
                request_timeout_ms: None,
            },
            wake: None,
            mqtt: None,
            http: None,
        }
    }
}

impl KernelConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.api.request_timeout_ms.unwrap_or(10_000))
    }

    pub fn wake_config(&self) -> WakeConfig {
        let defaults = WakeConfig::default();
        match &self.wake {
            Some(conf) => WakeConfig {
                poll_interval: conf
                    .poll_interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.poll_interval),
                wake_timeout: conf
                    .wake_timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.wake_timeout),
                rewake_interval: conf
                    .rewake_interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.rewake_interval),
            },
            None => defaults,
        }
    }

    pub fn http_port(&self) -> u16 {
        self.http.as_ref().map(|h| h.port).unwrap_or(8080)
    }
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("VOLTAIC_KERNEL_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        if txt.trim().is_empty() {
            return KernelConfig::default();
        }
        serde_yaml::from_str(&txt).unwrap_or_else(|e| {
            eprintln!("[kernel] config invalide: {e}");
            KernelConfig::default()
        })
    } else {
        eprintln!("[kernel] pas de kernel.yaml, usage config par défaut");
        KernelConfig::default()
    }
}
