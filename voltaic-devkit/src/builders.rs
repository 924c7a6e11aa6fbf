/*!
Builders de payloads télémétrie, pour scripter le stub cloud et les tests.
*/

use serde_json::{json, Map, Value};

/// Builder de snapshot télémétrie tel que le cloud le renvoie.
pub struct TelemetryBuilder {
    fields: Map<String, Value>,
}

impl TelemetryBuilder {
    /// Véhicule sain de référence : ModelA récent, faible dégradation.
    pub fn healthy() -> Self {
        let mut builder = Self { fields: Map::new() };
        builder
            .set("battery_level", json!(85.0))
            .set("usable_battery_level", json!(84.0))
            .set("current_range_km", json!(440.0))
            .set("ideal_range_km", json!(460.0))
            .set("rated_range_km", json!(460.0))
            .set("odometer_km", json!(20000.0))
            .set("charging_state", json!("Disconnected"))
            .set("charge_rate_kw", json!(0.0))
            .set("charge_energy_added_kwh", json!(0.0))
            .set("model", json!("modela"))
            .set("captured_at", json!(1_700_000_000.0));
        builder
    }

    /// Véhicule usé : forte dégradation d'autonomie, gros kilométrage.
    pub fn worn() -> Self {
        let mut builder = Self::healthy();
        builder
            .set("battery_level", json!(78.0))
            .set("usable_battery_level", json!(70.0))
            .set("current_range_km", json!(330.0))
            .set("odometer_km", json!(210_000.0));
        builder
    }

    /// Payload volontairement dégénéré : champs manquants et types douteux.
    pub fn degraded() -> Self {
        let mut builder = Self { fields: Map::new() };
        builder
            .set("battery_level", json!("78"))
            .set("odometer_km", json!(null));
        builder
    }

    fn set(&mut self, key: &str, value: Value) -> &mut Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    pub fn without(mut self, key: &str) -> Self {
        self.fields.remove(key);
        self
    }

    pub fn build(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}
