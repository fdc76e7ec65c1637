//! Composite per-parcel risk score.
//!
//! The score is a fixed linear blend of water stress level and variability,
//! the soil's lack of water retention, and mean temperature. Inputs are not
//! normalised, so magnitudes are only comparable between parcels of one table.

use crate::errors::AnalysisError;
use crate::models::{FeatureRow, RiskMetrics, SoilRecord};
use crate::utils::{mean, sample_std};
use crate::validation::{require_complete_soil, require_no_nulls};
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskWeights {
    pub mean_stress: f64,
    pub stress_variability: f64,
    // Applied to (1 - capacite_retention_eau).
    pub water_retention: f64,
    pub mean_temperature: f64,
}

impl RiskWeights {
    pub const STANDARD: RiskWeights = RiskWeights {
        mean_stress: 0.4,
        stress_variability: 0.3,
        water_retention: 0.2,
        mean_temperature: 0.1,
    };

    pub fn score(
        &self,
        mean_stress: f64,
        stress_variability: f64,
        water_retention: f64,
        mean_temperature: f64,
    ) -> f64 {
        self.mean_stress * mean_stress
            + self.stress_variability * stress_variability
            + self.water_retention * (1.0 - water_retention)
            + self.mean_temperature * mean_temperature
    }
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// One row per distinct parcel of `features`, sorted by parcel id.
///
/// Fails when `stress_hydrique` or `temperature` has nulls, when the soil table
/// is incomplete, or when a parcel has no soil record to take its water
/// retention from.
pub fn calculate_risk_metrics(
    features: &[FeatureRow],
    soil: &[SoilRecord],
) -> Result<Vec<RiskMetrics>, AnalysisError> {
    require_no_nulls(features, "stress_hydrique", |r| r.stress_hydrique)?;
    require_no_nulls(features, "temperature", |r| r.environment.temperature)?;
    require_complete_soil(soil)?;

    let mut retention: HashMap<&str, f64> = HashMap::new();
    for record in soil {
        if let (Some(id), Some(capacity)) = (&record.parcelle_id, record.capacite_retention_eau) {
            retention.entry(id.as_str()).or_insert(capacity);
        }
    }

    // (stress values, temperature values) per parcel
    let mut by_parcel: BTreeMap<&str, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for row in features {
        let entry = by_parcel.entry(row.parcelle_id.as_str()).or_default();
        entry.0.extend(row.stress_hydrique);
        entry.1.extend(row.environment.temperature);
    }

    let missing: Vec<String> = by_parcel
        .keys()
        .filter(|id| !retention.contains_key(*id))
        .map(|id| id.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(AnalysisError::MissingWaterRetention { parcels: missing });
    }

    let weights = RiskWeights::STANDARD;
    let metrics: Vec<RiskMetrics> = by_parcel
        .into_iter()
        .map(|(id, (stress, temperature))| {
            let mean_stress = mean(&stress).unwrap_or(0.0);
            let stress_variability = sample_std(&stress).unwrap_or_else(|| {
                warn!("Parcel '{}' has a single stress observation; variability set to 0", id);
                0.0
            });
            let mean_temperature = mean(&temperature).unwrap_or(0.0);
            let capacite_retention_eau = retention[id];

            RiskMetrics {
                parcelle_id: id.to_string(),
                mean_stress,
                stress_variability,
                mean_temperature,
                capacite_retention_eau,
                risk_score: weights.score(
                    mean_stress,
                    stress_variability,
                    capacite_retention_eau,
                    mean_temperature,
                ),
            }
        })
        .collect();

    debug!("Computed risk metrics for {} parcel(s)", metrics.len());
    Ok(metrics)
}
