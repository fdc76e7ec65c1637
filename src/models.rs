use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// One observation of a parcel by the crop monitoring feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitoringRecord {
    pub date: NaiveDateTime,
    pub parcelle_id: String,
    // A row without coordinates is kept; it only misses the soil join.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub ndvi: Option<f64>,
    pub stress_hydrique: Option<f64>,
    pub environment: Environment,
    pub rendement_estime: Option<f64>,
    pub progression: Option<f64>,
    pub culture: Option<String>,
}

/// The six environmental measures shared by monitoring and weather feeds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Environment {
    pub temperature: Option<f64>,
    pub humidite: Option<f64>,
    pub precipitation: Option<f64>,
    pub rayonnement_solaire: Option<f64>,
    pub vitesse_vent: Option<f64>,
    pub direction_vent: Option<f64>,
}

impl Environment {
    pub const FIELDS: [&'static str; 6] = [
        "temperature",
        "humidite",
        "precipitation",
        "rayonnement_solaire",
        "vitesse_vent",
        "direction_vent",
    ];

    pub fn get(&self, index: usize) -> Option<f64> {
        match index {
            0 => self.temperature,
            1 => self.humidite,
            2 => self.precipitation,
            3 => self.rayonnement_solaire,
            4 => self.vitesse_vent,
            5 => self.direction_vent,
            _ => None,
        }
    }

    pub fn set(&mut self, index: usize, value: Option<f64>) {
        match index {
            0 => self.temperature = value,
            1 => self.humidite = value,
            2 => self.precipitation = value,
            3 => self.rayonnement_solaire = value,
            4 => self.vitesse_vent = value,
            5 => self.direction_vent = value,
            _ => {}
        }
    }

    /// Keeps `self` where present, takes `other` for the holes.
    pub fn or(self, other: &Environment) -> Environment {
        let mut merged = self;
        for i in 0..Self::FIELDS.len() {
            if merged.get(i).is_none() {
                merged.set(i, other.get(i));
            }
        }
        merged
    }
}

/// A weather row, raw (sub-daily) or after daily aggregation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeatherRecord {
    pub date: NaiveDateTime,
    pub environment: Environment,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SoilRecord {
    pub parcelle_id: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub capacite_retention_eau: Option<f64>,
    // Any other static column of the soil table, kept verbatim.
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct YieldHistoryRecord {
    pub date: NaiveDateTime,
    pub parcelle_id: String,
    pub rendement_final: f64,
    pub culture: Option<String>,
}

/// The four read-only inputs of a session.
#[derive(Debug, Clone, Default)]
pub struct SourceTables {
    pub monitoring: Vec<MonitoringRecord>,
    /// Already aggregated to one record per block of raw rows.
    pub weather: Vec<WeatherRecord>,
    pub soil: Vec<SoilRecord>,
    pub yield_history: Vec<YieldHistoryRecord>,
}

/// Soil columns attached to a feature row after the soil join.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SoilFeatures {
    pub capacite_retention_eau: Option<f64>,
    pub attributes: BTreeMap<String, String>,
}

/// A merged row of the feature table, keyed by (date, parcelle_id).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRow {
    pub date: NaiveDateTime,
    pub parcelle_id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub ndvi: Option<f64>,
    pub stress_hydrique: Option<f64>,
    pub environment: Environment,
    pub rendement_estime: Option<f64>,
    pub progression: Option<f64>,
    pub culture: Option<String>,
    pub soil: Option<SoilFeatures>,
    pub rendement_final: Option<f64>,
}

impl FeatureRow {
    pub fn capacite_retention_eau(&self) -> Option<f64> {
        self.soil.as_ref().and_then(|s| s.capacite_retention_eau)
    }

    pub fn value(&self, column: FeatureColumn) -> Option<f64> {
        match column {
            FeatureColumn::Ndvi => self.ndvi,
            FeatureColumn::StressHydrique => self.stress_hydrique,
            FeatureColumn::Temperature => self.environment.temperature,
            FeatureColumn::Humidite => self.environment.humidite,
            FeatureColumn::Precipitation => self.environment.precipitation,
            FeatureColumn::RayonnementSolaire => self.environment.rayonnement_solaire,
            FeatureColumn::VitesseVent => self.environment.vitesse_vent,
            FeatureColumn::DirectionVent => self.environment.direction_vent,
            FeatureColumn::RendementEstime => self.rendement_estime,
            FeatureColumn::Progression => self.progression,
        }
    }
}

pub type FeatureTable = Vec<FeatureRow>;

/// Numeric feature-table columns that come from the time-indexed feeds
/// (neither soil nor yield history).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureColumn {
    Ndvi,
    StressHydrique,
    Temperature,
    Humidite,
    Precipitation,
    RayonnementSolaire,
    VitesseVent,
    DirectionVent,
    RendementEstime,
    Progression,
}

impl FeatureColumn {
    pub const TEMPORAL: [FeatureColumn; 10] = [
        FeatureColumn::Ndvi,
        FeatureColumn::StressHydrique,
        FeatureColumn::Temperature,
        FeatureColumn::Humidite,
        FeatureColumn::Precipitation,
        FeatureColumn::RayonnementSolaire,
        FeatureColumn::VitesseVent,
        FeatureColumn::DirectionVent,
        FeatureColumn::RendementEstime,
        FeatureColumn::Progression,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FeatureColumn::Ndvi => "ndvi",
            FeatureColumn::StressHydrique => "stress_hydrique",
            FeatureColumn::Temperature => "temperature",
            FeatureColumn::Humidite => "humidite",
            FeatureColumn::Precipitation => "precipitation",
            FeatureColumn::RayonnementSolaire => "rayonnement_solaire",
            FeatureColumn::VitesseVent => "vitesse_vent",
            FeatureColumn::DirectionVent => "direction_vent",
            FeatureColumn::RendementEstime => "rendement_estime",
            FeatureColumn::Progression => "progression",
        }
    }
}

impl fmt::Display for FeatureColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskMetrics {
    pub parcelle_id: String,
    pub mean_stress: f64,
    pub stress_variability: f64,
    pub mean_temperature: f64,
    pub capacite_retention_eau: f64,
    pub risk_score: f64,
}

/// Additive decomposition of one parcel's yield history, one entry per year.
/// `trend` and `resid` are `None` where the moving-average window does not fit.
#[derive(Debug, Clone, PartialEq)]
pub struct DecomposedYield {
    pub parcelle_id: String,
    pub dates: Vec<NaiveDateTime>,
    pub trend: Vec<Option<f64>>,
    pub seasonal: Vec<f64>,
    pub resid: Vec<Option<f64>>,
    pub observed: Vec<f64>,
}

impl DecomposedYield {
    pub fn len(&self) -> usize {
        self.observed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observed.is_empty()
    }
}
