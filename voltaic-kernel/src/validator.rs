use time::OffsetDateTime;

use crate::models::{ChargingState, RawSnapshot, ValidatedSnapshot, VehicleModel};

/// Normalise un snapshot brut en snapshot validé.
///
/// Fonction totale par construction : aucun input, même un objet vide, ne fait
/// échouer la validation. Tout numérique absent, non fini ou négatif devient 0,
/// tout enum absent prend son défaut. Le scoring aval ne branche jamais sur
/// "donnée manquante", seulement sur les valeurs (éventuellement nulles) qui
/// en résultent.
pub fn validate(raw: &RawSnapshot) -> ValidatedSnapshot {
    ValidatedSnapshot {
        battery_level: coerce(raw.battery_level),
        usable_battery_level: coerce(raw.usable_battery_level),
        current_range_km: coerce(raw.current_range_km),
        ideal_range_km: coerce(raw.ideal_range_km),
        rated_range_km: coerce(raw.rated_range_km),
        odometer_km: coerce(raw.odometer_km),
        charging_state: raw
            .charging_state
            .as_deref()
            .map(ChargingState::from_api)
            .unwrap_or(ChargingState::Unknown),
        charge_rate_kw: coerce(raw.charge_rate_kw),
        charge_energy_added_kwh: coerce(raw.charge_energy_added_kwh),
        vehicle_model: VehicleModel::infer(raw.model.as_deref().unwrap_or("")),
        captured_at: coerce_timestamp(raw.captured_at),
    }
}

/// Ré-exporte un snapshot validé sous forme brute. Sert aux tests
/// d'idempotence et aux appelants qui veulent rejouer la validation.
pub fn export(snapshot: &ValidatedSnapshot) -> RawSnapshot {
    RawSnapshot {
        battery_level: Some(snapshot.battery_level),
        usable_battery_level: Some(snapshot.usable_battery_level),
        current_range_km: Some(snapshot.current_range_km),
        ideal_range_km: Some(snapshot.ideal_range_km),
        rated_range_km: Some(snapshot.rated_range_km),
        odometer_km: Some(snapshot.odometer_km),
        charging_state: Some(charging_state_str(snapshot.charging_state).to_string()),
        charge_rate_kw: Some(snapshot.charge_rate_kw),
        charge_energy_added_kwh: Some(snapshot.charge_energy_added_kwh),
        model: Some(model_identifier(snapshot.vehicle_model).to_string()),
        captured_at: Some(snapshot.captured_at.unix_timestamp() as f64),
    }
}

fn coerce(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() && v >= 0.0 => v,
        _ => 0.0,
    }
}

fn coerce_timestamp(epoch_seconds: Option<f64>) -> OffsetDateTime {
    match epoch_seconds {
        Some(ts) if ts.is_finite() && ts >= 0.0 => {
            OffsetDateTime::from_unix_timestamp(ts as i64).unwrap_or(OffsetDateTime::UNIX_EPOCH)
        }
        _ => OffsetDateTime::UNIX_EPOCH,
    }
}

fn charging_state_str(state: ChargingState) -> &'static str {
    match state {
        ChargingState::Charging => "Charging",
        ChargingState::Complete => "Complete",
        ChargingState::Disconnected => "Disconnected",
        ChargingState::Stopped => "Stopped",
        ChargingState::Unknown => "Unknown",
    }
}

fn model_identifier(model: VehicleModel) -> &'static str {
    match model {
        VehicleModel::ModelA => "modela",
        VehicleModel::ModelB => "modelb",
        VehicleModel::ModelC => "modelc",
        VehicleModel::ModelD => "modeld",
    }
}
