/**
 * SCORING SANTÉ - Évaluation déterministe de l'état batterie
 *
 * RÔLE : Convertir un snapshot validé en score composite 0-100, note
 * qualitative, listes d'explications et impact marché estimé.
 *
 * FONCTIONNEMENT : fonction pure de son entrée, aucun I/O, aucun état caché.
 * Ne lève jamais : un snapshot dégénéré produit une évaluation bien formée
 * (métriques éventuellement nulles), jamais un null à gérer en aval.
 */
use crate::models::{Grade, HealthAssessment, MarketImpact, ValidatedSnapshot};

/// Kilométrage moyen couvert par un cycle de charge complet.
pub(crate) const KM_PER_CYCLE: f64 = 443.0;

/// Seuil garantie batterie constructeur : 8 ans / 160 000 km.
const WARRANTY_KM: f64 = 160_000.0;

/// Évalue la santé batterie d'un véhicule. Pure et totale.
pub fn score(snapshot: &ValidatedSnapshot) -> HealthAssessment {
    let baseline = baseline_range_km(snapshot);
    let range_degradation = range_degradation_pct(snapshot, baseline);
    let capacity_degradation = capacity_degradation_pct(snapshot, range_degradation);
    let cycles = estimated_cycles(snapshot.odometer_km);
    let overall = composite_score(
        range_degradation,
        capacity_degradation,
        snapshot.odometer_km,
        cycles,
        capacity_ratio(snapshot).map_or(false, |r| r > 0.95),
    );

    HealthAssessment {
        overall_score: overall,
        grade: grade_for(overall),
        capacity_degradation_pct: capacity_degradation,
        range_degradation_pct: range_degradation,
        estimated_cycles: cycles,
        strengths: strengths(snapshot, range_degradation, capacity_degradation, cycles),
        concerns: concerns(snapshot, range_degradation, capacity_degradation, cycles),
        recommendations: recommendations(overall, range_degradation),
        market_impact: market_impact(overall, snapshot.odometer_km, cycles),
    }
}

/// Autonomie de référence : l'autonomie nominale du véhicule lui-même quand il
/// la connaît, sinon la constante EPA du modèle.
pub(crate) fn baseline_range_km(snapshot: &ValidatedSnapshot) -> f64 {
    if snapshot.rated_range_km > 0.0 {
        snapshot.rated_range_km
    } else if snapshot.ideal_range_km > 0.0 {
        snapshot.ideal_range_km
    } else {
        snapshot.vehicle_model.epa_range_km()
    }
}

/// Perte d'autonomie relative à la référence, bornée à [0, 30].
/// 0 quand la référence ou l'autonomie courante est nulle : incalculable
/// n'est pas pénalisé.
fn range_degradation_pct(snapshot: &ValidatedSnapshot, baseline: f64) -> f64 {
    if baseline <= 0.0 || snapshot.current_range_km <= 0.0 {
        return 0.0;
    }
    (((baseline - snapshot.current_range_km) / baseline) * 100.0).clamp(0.0, 30.0)
}

fn capacity_ratio(snapshot: &ValidatedSnapshot) -> Option<f64> {
    if snapshot.battery_level > 0.0 && snapshot.usable_battery_level > 0.0 {
        Some(snapshot.usable_battery_level / snapshot.battery_level)
    } else {
        None
    }
}

/// Perte de capacité. Le ratio usable/affiché n'est discriminant que proche de
/// 1.0 : au-delà de 0.95 la formule directe s'applique (bornée [0, 25]), en
/// dessous la lecture est trop bruitée et on retombe sur 0.8 x la dégradation
/// d'autonomie, bornée [0, 20].
fn capacity_degradation_pct(snapshot: &ValidatedSnapshot, range_degradation: f64) -> f64 {
    if let Some(ratio) = capacity_ratio(snapshot) {
        if ratio > 0.95 && ratio <= 1.0 {
            return (((0.95 - ratio) / 0.95) * 100.0).clamp(0.0, 25.0);
        }
    }
    (range_degradation * 0.8).clamp(0.0, 20.0)
}

fn estimated_cycles(odometer_km: f64) -> u32 {
    (odometer_km / KM_PER_CYCLE).round().max(0.0) as u32
}

/// Score composite partagé par les deux algorithmes (primaire et secondaire).
pub(crate) fn composite_score(
    range_degradation: f64,
    capacity_degradation: f64,
    odometer_km: f64,
    cycles: u32,
    near_full_usable: bool,
) -> u8 {
    let mut score = 100.0;
    score -= (range_degradation * 1.0).min(25.0);
    score -= (capacity_degradation * 1.5).min(20.0);
    score -= mileage_penalty(odometer_km);
    score -= cycle_penalty(cycles);
    if near_full_usable {
        score += 5.0;
    }
    score.clamp(0.0, 100.0).round() as u8
}

fn mileage_penalty(odometer_km: f64) -> f64 {
    if odometer_km < 100_000.0 {
        0.0
    } else if odometer_km < 150_000.0 {
        5.0
    } else if odometer_km < 200_000.0 {
        10.0
    } else {
        15.0
    }
}

fn cycle_penalty(cycles: u32) -> f64 {
    if cycles < 1000 {
        0.0
    } else if cycles < 1500 {
        5.0
    } else {
        10.0
    }
}

fn grade_for(score: u8) -> Grade {
    match score {
        90..=100 => Grade::Excellent,
        75..=89 => Grade::Good,
        60..=74 => Grade::Fair,
        _ => Grade::Poor,
    }
}

fn strengths(
    snapshot: &ValidatedSnapshot,
    range_degradation: f64,
    capacity_degradation: f64,
    cycles: u32,
) -> Vec<String> {
    let mut out = Vec::new();
    if range_degradation < 5.0 && snapshot.current_range_km > 0.0 {
        out.push("Excellent range retention for the pack age".to_string());
    }
    if capacity_degradation < 3.0 && snapshot.usable_battery_level > 0.0 {
        out.push("Minimal measurable capacity loss".to_string());
    }
    if capacity_ratio(snapshot).map_or(false, |r| r > 0.95) {
        out.push("Usable capacity close to factory-new".to_string());
    }
    if snapshot.odometer_km > 0.0 && snapshot.odometer_km < 50_000.0 {
        out.push("Low odometer, limited pack wear".to_string());
    }
    if cycles > 0 && cycles < 300 {
        out.push("Low estimated charge-cycle count".to_string());
    }
    out
}

fn concerns(
    snapshot: &ValidatedSnapshot,
    range_degradation: f64,
    capacity_degradation: f64,
    cycles: u32,
) -> Vec<String> {
    let mut out = Vec::new();
    if range_degradation > 15.0 {
        out.push("Notable range degradation versus rated baseline".to_string());
    }
    if capacity_degradation > 10.0 {
        out.push("Measured capacity loss above the comfort band".to_string());
    }
    if snapshot.odometer_km > 150_000.0 {
        out.push("High mileage for an EV battery pack".to_string());
    }
    if cycles > 1000 {
        out.push("High estimated charge-cycle count".to_string());
    }
    if snapshot.battery_level <= 0.0 {
        out.push("No live battery reading in this snapshot".to_string());
    }
    out
}

fn recommendations(score: u8, range_degradation: f64) -> Vec<String> {
    // la note garantie est systématique : le kilométrage seul ne suffit pas à
    // trancher, la date de mise en service fait foi
    let mut out = vec![
        "Verify remaining battery warranty coverage with the manufacturer".to_string(),
    ];
    if score < 75 {
        out.push("Schedule an independent battery inspection before purchase".to_string());
    }
    if range_degradation > 15.0 {
        out.push("Compare real-world consumption over a full charge cycle".to_string());
    }
    out
}

fn market_impact(score: u8, odometer_km: f64, cycles: u32) -> MarketImpact {
    let score_band: f64 = if score < 60 {
        12.0
    } else if score < 75 {
        6.0
    } else if score < 85 {
        2.0
    } else {
        0.0
    };
    let mileage_band = if odometer_km > 200_000.0 {
        8.0
    } else if odometer_km > 150_000.0 {
        4.0
    } else if odometer_km > 100_000.0 {
        2.0
    } else {
        0.0
    };

    MarketImpact {
        value_impact_pct: (score_band + mileage_band).min(20.0),
        warranty_status: warranty_status(odometer_km),
        expected_life_remaining: expected_life(score, cycles),
    }
}

fn warranty_status(odometer_km: f64) -> String {
    if odometer_km >= WARRANTY_KM {
        "Battery warranty expired by mileage (8 yr / 160,000 km ceiling)".to_string()
    } else if odometer_km >= WARRANTY_KM * 0.8 {
        "Approaching the 160,000 km warranty ceiling, verify in-service date".to_string()
    } else {
        "Likely within the 8-year / 160,000 km battery warranty, verify in-service date"
            .to_string()
    }
}

fn expected_life(score: u8, cycles: u32) -> String {
    match (score, cycles) {
        (85..=100, 0..=499) => "10+ years of serviceable capacity".to_string(),
        (85..=100, _) => "8-10 years of serviceable capacity".to_string(),
        (70..=84, 0..=999) => "6-8 years of serviceable capacity".to_string(),
        (70..=84, _) => "4-6 years of serviceable capacity".to_string(),
        (60..=69, _) => "4-6 years of serviceable capacity".to_string(),
        _ => "2-4 years before replacement becomes likely".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChargingState, VehicleModel};
    use time::OffsetDateTime;

    fn snapshot(
        battery: f64,
        usable: f64,
        current: f64,
        ideal: f64,
        odometer: f64,
    ) -> ValidatedSnapshot {
        ValidatedSnapshot {
            battery_level: battery,
            usable_battery_level: usable,
            current_range_km: current,
            ideal_range_km: ideal,
            rated_range_km: 0.0,
            odometer_km: odometer,
            charging_state: ChargingState::Disconnected,
            charge_rate_kw: 0.0,
            charge_energy_added_kwh: 0.0,
            vehicle_model: VehicleModel::ModelA,
            captured_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_reference_vehicle_scores_fair() {
        // véhicule de référence : 78/74%, 402 km restants pour 460 nominaux,
        // 32 750 km au compteur
        let assessment = score(&snapshot(78.0, 74.0, 402.0, 460.0, 32_750.0));

        assert!((assessment.range_degradation_pct - 12.6087).abs() < 0.01);
        // ratio 74/78 = 0.949 <= 0.95 : bascule sur le fallback autonomie
        assert!((assessment.capacity_degradation_pct - 10.087).abs() < 0.01);
        assert_eq!(assessment.estimated_cycles, 74);
        assert_eq!(assessment.overall_score, 72);
        assert_eq!(assessment.grade, Grade::Fair);
        assert!(assessment
            .recommendations
            .iter()
            .any(|r| r.contains("inspection")));
    }

    #[test]
    fn test_score_always_bounded() {
        let degraded = snapshot(80.0, 40.0, 50.0, 460.0, 500_000.0);
        let a = score(&degraded);
        assert!(a.overall_score <= 100);
        assert!(a.range_degradation_pct <= 30.0);
        assert!(a.capacity_degradation_pct <= 20.0);

        let pristine = snapshot(90.0, 89.0, 459.0, 460.0, 1_000.0);
        let b = score(&pristine);
        assert!(b.overall_score <= 100);
        assert_eq!(b.grade, Grade::Excellent);
    }

    #[test]
    fn test_near_full_usable_gets_bonus() {
        // ratio 0.988 > 0.95 : formule directe (clampée à 0) + bonus
        let a = score(&snapshot(85.0, 84.0, 440.0, 460.0, 20_000.0));
        assert_eq!(a.capacity_degradation_pct, 0.0);
        assert!(a.strengths.iter().any(|s| s.contains("factory-new")));
        assert!(a.overall_score >= 95);
    }

    #[test]
    fn test_degenerate_snapshot_is_well_formed() {
        let a = score(&snapshot(0.0, 0.0, 0.0, 0.0, 0.0));
        // incalculable n'est pas pénalisé
        assert_eq!(a.range_degradation_pct, 0.0);
        assert_eq!(a.capacity_degradation_pct, 0.0);
        assert_eq!(a.estimated_cycles, 0);
        assert!(a.overall_score <= 100);
        assert!(a.concerns.iter().any(|c| c.contains("No live battery")));
    }

    #[test]
    fn test_epa_fallback_when_no_rated_range() {
        // ni rated ni ideal : la constante EPA du modèle sert de référence
        let mut s = snapshot(80.0, 70.0, 300.0, 0.0, 60_000.0);
        s.vehicle_model = VehicleModel::ModelB; // 405 km EPA
        let a = score(&s);
        let expected = ((405.0 - 300.0) / 405.0 * 100.0_f64).clamp(0.0, 30.0);
        assert!((a.range_degradation_pct - expected).abs() < 0.01);
    }

    #[test]
    fn test_mileage_and_cycle_penalties() {
        // 180 000 km => pénalité kilométrage 10, cycles ~406 => pas de pénalité cycles
        let a = score(&snapshot(80.0, 79.0, 430.0, 460.0, 180_000.0));
        let b = score(&snapshot(80.0, 79.0, 430.0, 460.0, 20_000.0));
        assert!(b.overall_score > a.overall_score);

        // 700 000 km => cycles ~1580 => pénalité cycles maximale
        let c = score(&snapshot(80.0, 79.0, 430.0, 460.0, 700_000.0));
        assert!(a.overall_score > c.overall_score);
    }

    #[test]
    fn test_grade_bands() {
        assert_eq!(grade_for(95), Grade::Excellent);
        assert_eq!(grade_for(90), Grade::Excellent);
        assert_eq!(grade_for(75), Grade::Good);
        assert_eq!(grade_for(60), Grade::Fair);
        assert_eq!(grade_for(59), Grade::Poor);
    }

    #[test]
    fn test_market_impact_caps_at_twenty() {
        let a = score(&snapshot(80.0, 40.0, 200.0, 460.0, 250_000.0));
        assert!(a.market_impact.value_impact_pct <= 20.0);
        assert!(a
            .market_impact
            .warranty_status
            .contains("expired"));
    }
}
