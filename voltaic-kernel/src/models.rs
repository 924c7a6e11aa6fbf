use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// Joignabilité d'un véhicule, dérivée de la dernière entrée de la liste cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reachability {
    Online,
    Asleep,
    Offline,
    Unknown,
}

impl Reachability {
    /// Mapping depuis le champ `state` renvoyé par le cloud ("online", "asleep"...).
    pub fn from_api_state(state: &str) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "online" => Reachability::Online,
            "asleep" | "sleeping" => Reachability::Asleep,
            "offline" => Reachability::Offline,
            _ => Reachability::Unknown,
        }
    }
}

/// État courant d'un véhicule tel que vu par le kernel.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceState {
    pub reachability: Reachability,
    pub last_seen: Option<OffsetDateTime>,
    pub battery_level: Option<f64>,
}

/// Probabilité qu'un wake aboutisse, calculée avant de lancer l'orchestration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WakeLikelihood {
    High,
    Medium,
    Low,
    None,
}

/// Entrée de la liste de véhicules côté cloud.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub id: String,
    pub display_name: String,
    pub state: String,
    #[serde(default)]
    pub last_seen: Option<f64>, // epoch seconds côté API
    #[serde(default)]
    pub battery_level: Option<f64>,
}

impl DeviceSummary {
    pub fn device_state(&self) -> DeviceState {
        DeviceState {
            reachability: Reachability::from_api_state(&self.state),
            last_seen: self
                .last_seen
                .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts as i64).ok()),
            battery_level: self.battery_level,
        }
    }
}

pub type DevicesMap = std::collections::HashMap<String, DeviceSummary>;

/// Modèle du véhicule, inféré depuis l'identifiant constructeur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleModel {
    ModelA,
    ModelB,
    ModelC,
    ModelD,
}

impl VehicleModel {
    /// Inférence par substring sur l'identifiant modèle ("modelb_lr" -> ModelB).
    /// Fallback dur sur ModelA quand rien ne matche.
    pub fn infer(identifier: &str) -> Self {
        let id: String = identifier
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        if id.contains("modelb") {
            VehicleModel::ModelB
        } else if id.contains("modelc") {
            VehicleModel::ModelC
        } else if id.contains("modeld") {
            VehicleModel::ModelD
        } else {
            VehicleModel::ModelA
        }
    }

    /// Autonomie EPA constructeur (km), utilisée quand le véhicule ne connaît
    /// pas sa propre autonomie nominale.
    pub fn epa_range_km(&self) -> f64 {
        match self {
            VehicleModel::ModelA => 358.0,
            VehicleModel::ModelB => 405.0,
            VehicleModel::ModelC => 351.0,
            VehicleModel::ModelD => 326.0,
        }
    }
}

/// État de charge rapporté par le véhicule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargingState {
    Charging,
    Complete,
    Disconnected,
    Stopped,
    Unknown,
}

impl ChargingState {
    pub fn from_api(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "charging" => ChargingState::Charging,
            "complete" => ChargingState::Complete,
            "disconnected" => ChargingState::Disconnected,
            "stopped" => ChargingState::Stopped,
            _ => ChargingState::Unknown,
        }
    }
}

mod lenient {
    //! Le cloud renvoie parfois des nombres sous forme de string, parfois null.
    //! On accepte tout et on laisse le validator décider.
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn f64_opt<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }))
    }
}

/// Snapshot brut : ce que le cloud a bien voulu renvoyer pour un véhicule à un
/// instant donné. Tous les champs sont optionnels, la désérialisation numérique
/// est laxiste (nombre, string numérique ou null).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSnapshot {
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub battery_level: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub usable_battery_level: Option<f64>,
    #[serde(default, alias = "battery_range_km", deserialize_with = "lenient::f64_opt")]
    pub current_range_km: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub ideal_range_km: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub rated_range_km: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub odometer_km: Option<f64>,
    #[serde(default)]
    pub charging_state: Option<String>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub charge_rate_kw: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub charge_energy_added_kwh: Option<f64>,
    #[serde(default, alias = "car_type")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub captured_at: Option<f64>, // epoch seconds
}

/// Snapshot validé : typé, numérique, défauté. Invariant : tout champ numérique
/// est fini et >= 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedSnapshot {
    pub battery_level: f64,
    pub usable_battery_level: f64,
    pub current_range_km: f64,
    pub ideal_range_km: f64,
    pub rated_range_km: f64,
    pub odometer_km: f64,
    pub charging_state: ChargingState,
    pub charge_rate_kw: f64,
    pub charge_energy_added_kwh: f64,
    pub vehicle_model: VehicleModel,
    #[serde(with = "time::serde::rfc3339")]
    pub captured_at: OffsetDateTime,
}

/// Note globale de l'évaluation santé.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    Excellent,
    Good,
    Fair,
    Poor,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketImpact {
    pub value_impact_pct: f64,
    pub warranty_status: String,
    pub expected_life_remaining: String,
}

/// Évaluation santé complète d'un véhicule. Valeur immuable : une nouvelle
/// évaluation est une nouvelle valeur.
#[derive(Debug, Clone, Serialize)]
pub struct HealthAssessment {
    pub overall_score: u8,
    pub grade: Grade,
    pub capacity_degradation_pct: f64,
    pub range_degradation_pct: f64,
    pub estimated_cycles: u32,
    pub strengths: Vec<String>,
    pub concerns: Vec<String>,
    pub recommendations: Vec<String>,
    pub market_impact: MarketImpact,
}

/// Vue "assessment-like" d'un des deux algorithmes de la comparaison.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AssessmentSummary {
    pub health_score: f64,
    pub capacity_degradation_pct: f64,
    pub range_degradation_pct: f64,
    pub estimated_cycles: u32,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricDiff {
    pub primary: f64,
    pub secondary: f64,
    pub delta: f64,
    pub pct_change: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataQuality {
    pub confidence: Confidence,
    pub is_synthetic: bool,
    pub charge_records: usize,
}

/// Résultat de la comparaison des deux méthodologies de scoring.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonResult {
    pub device_id: String,
    pub primary: AssessmentSummary,
    pub secondary: AssessmentSummary,
    pub differences: BTreeMap<String, MetricDiff>,
    pub data_quality: DataQuality,
}
