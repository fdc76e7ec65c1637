//! `DataManager`: owns the four source tables of a session and exposes the
//! analytics operations over them.
//!
//! The sources are read-only after construction. Every operation recomputes its
//! result from them, so callers own (and may mutate) whatever they get back.

use crate::config::PipelineConfig;
use crate::errors::{AnalysisError, LoadError};
use crate::gap_filler::{fill_gaps, partition_by_parcel};
use crate::merger::merge_features;
use crate::metrics::METRICS;
use crate::models::{
    DecomposedYield, FeatureRow, FeatureTable, MonitoringRecord, RiskMetrics, SourceTables,
    YieldHistoryRecord,
};
use crate::parsers::csv_parser::{parse_monitoring, parse_soil, parse_weather, parse_yield_history};
use crate::patterns::{self, MonthlySummary};
use crate::risk;
use crate::temporal::{ConsistencyReport, TemporalIndices};
use crate::time_operation;
use crate::utils::mean;
use crate::weather::aggregate_blocks;
use log::{debug, info};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Mean historical yield of a soil parcel, for map views.
#[derive(Debug, Clone, PartialEq)]
pub struct ParcelYieldSummary {
    pub parcelle_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub mean_rendement_final: f64,
    pub has_history: bool,
}

/// A risk score placed at the parcel's monitoring coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskLocation {
    pub parcelle_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub risk_score: f64,
}

#[derive(Debug, Clone)]
pub struct DataManager {
    config: PipelineConfig,
    sources: SourceTables,
}

fn open(path: &Path) -> Result<BufReader<File>, LoadError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| LoadError::IoError {
            path: path.to_path_buf(),
            source,
        })
}

impl DataManager {
    /// Reads the four files named by `config` and aggregates the weather feed.
    pub fn load(config: PipelineConfig) -> Result<Self, LoadError> {
        info!("Loading source tables");
        time_operation!("load", {
            let monitoring = open(&config.monitoring_path)?;
            let weather = open(&config.weather_path)?;
            let soil = open(&config.soil_path)?;
            let yield_history = open(&config.yield_history_path)?;
            Self::from_readers(config, monitoring, weather, soil, yield_history)
        })
    }

    /// Same as [`DataManager::load`] over arbitrary readers, e.g. in-memory CSV.
    pub fn from_readers<M: Read, W: Read, S: Read, Y: Read>(
        config: PipelineConfig,
        monitoring: M,
        weather: W,
        soil: S,
        yield_history: Y,
    ) -> Result<Self, LoadError> {
        let monitoring = parse_monitoring(monitoring, &display(&config.monitoring_path), &config)?;
        let raw_weather = parse_weather(weather, &display(&config.weather_path), &config)?;
        let soil = parse_soil(soil, &display(&config.soil_path), &config)?;
        let yield_history =
            parse_yield_history(yield_history, &display(&config.yield_history_path), &config)?;

        let weather = aggregate_blocks(&raw_weather, config.weather_block_size);

        {
            let mut metrics = METRICS.lock();
            metrics.record_rows_loaded("monitoring", monitoring.len() as u64);
            metrics.record_rows_loaded("weather", raw_weather.len() as u64);
            metrics.record_rows_loaded("soil", soil.len() as u64);
            metrics.record_rows_loaded("yield_history", yield_history.len() as u64);
            metrics.record_weather_aggregation(weather.len() as u64);
        }
        info!(
            "Loaded {} monitoring, {} weather ({} after aggregation), {} soil and {} yield history rows",
            monitoring.len(),
            raw_weather.len(),
            weather.len(),
            soil.len(),
            yield_history.len()
        );

        Ok(Self::from_tables(
            config,
            SourceTables {
                monitoring,
                weather,
                soil,
                yield_history,
            },
        ))
    }

    /// Wraps already parsed tables; `sources.weather` must be aggregated.
    pub fn from_tables(config: PipelineConfig, sources: SourceTables) -> Self {
        Self { config, sources }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn sources(&self) -> &SourceTables {
        &self.sources
    }

    pub fn temporal_indices(&self) -> TemporalIndices {
        TemporalIndices::build(
            &self.sources.monitoring,
            &self.sources.weather,
            &self.sources.yield_history,
        )
    }

    /// Runs the three consistency checks and logs the report. Never fails.
    pub fn verify_temporal_consistency(&self) -> ConsistencyReport {
        let report = self
            .temporal_indices()
            .verify(self.config.date_tolerance_days);
        report.log();
        report
    }

    /// Merged and gap-filled feature table, rebuilt from the sources on each call.
    pub fn prepare_features(&self) -> FeatureTable {
        self.verify_temporal_consistency();

        let merged = time_operation!("merge_features", merge_features(&self.sources));
        let parcels = partition_by_parcel(&merged).len();
        let filled = time_operation!("fill_gaps", fill_gaps(merged));

        METRICS
            .lock()
            .record_features(filled.len() as u64, parcels as u64);
        info!(
            "Prepared {} feature rows across {} parcel(s)",
            filled.len(),
            parcels
        );
        filled
    }

    pub fn calculate_risk_metrics(
        &self,
        features: &[FeatureRow],
    ) -> Result<Vec<RiskMetrics>, AnalysisError> {
        let metrics = time_operation!(
            "risk_metrics",
            risk::calculate_risk_metrics(features, &self.sources.soil)
        )?;
        METRICS.lock().record_risk(metrics.len() as u64);
        Ok(metrics)
    }

    pub fn temporal_patterns(
        &self,
        features: &[FeatureRow],
        parcelle_id: &str,
    ) -> Result<Vec<MonthlySummary>, AnalysisError> {
        time_operation!(
            "temporal_patterns",
            patterns::monthly_stats(features, parcelle_id)
        )
    }

    /// Decomposes the parcel's yield history with the configured period.
    pub fn analyze_yield_patterns(&self, parcelle_id: &str) -> Result<DecomposedYield, AnalysisError> {
        time_operation!(
            "yield_patterns",
            patterns::analyze_yield_patterns(
                &self.sources.yield_history,
                parcelle_id,
                self.config.decomposition_period,
            )
        )
    }

    /// Sorted distinct parcel ids of the monitoring feed.
    pub fn parcel_ids(&self) -> Vec<String> {
        self.sources
            .monitoring
            .iter()
            .map(|r| r.parcelle_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn monitoring_for(&self, parcelle_id: &str) -> Vec<&MonitoringRecord> {
        self.sources
            .monitoring
            .iter()
            .filter(|r| r.parcelle_id == parcelle_id)
            .collect()
    }

    pub fn yield_history_for(&self, parcelle_id: &str) -> Vec<&YieldHistoryRecord> {
        self.sources
            .yield_history
            .iter()
            .filter(|r| r.parcelle_id == parcelle_id)
            .collect()
    }

    /// Per row `0.7 * stress_hydrique + 0.3 * temperature / max(temperature)`.
    ///
    /// `None` for rows missing either input, and for every row when the table's
    /// maximum temperature is not positive.
    pub fn combined_stress_index(features: &[FeatureRow]) -> Vec<Option<f64>> {
        let max_temperature = features
            .iter()
            .filter_map(|r| r.environment.temperature)
            .reduce(f64::max)
            .filter(|max| *max > 0.0);

        features
            .iter()
            .map(|r| {
                let max = max_temperature?;
                Some(0.7 * r.stress_hydrique? + 0.3 * r.environment.temperature? / max)
            })
            .collect()
    }

    /// One entry per soil parcel (first record per id that has coordinates),
    /// with the mean of its yield history or 0.0 when it has none.
    pub fn parcel_yield_summaries(&self) -> Vec<ParcelYieldSummary> {
        let mut harvests: HashMap<&str, Vec<f64>> = HashMap::new();
        for record in &self.sources.yield_history {
            harvests
                .entry(record.parcelle_id.as_str())
                .or_default()
                .push(record.rendement_final);
        }

        let mut seen: HashSet<&str> = HashSet::new();
        self.sources
            .soil
            .iter()
            .filter_map(|s| {
                let id = s.parcelle_id.as_deref()?;
                let (latitude, longitude) = (s.latitude?, s.longitude?);
                if !seen.insert(id) {
                    return None;
                }
                let history = harvests.get(id);
                Some(ParcelYieldSummary {
                    parcelle_id: id.to_string(),
                    latitude,
                    longitude,
                    mean_rendement_final: history.and_then(|h| mean(h)).unwrap_or(0.0),
                    has_history: history.is_some(),
                })
            })
            .collect()
    }

    /// Places each risk score at the first complete monitoring coordinates of
    /// its parcel. Parcels without any are dropped.
    pub fn risk_locations(&self, risk_metrics: &[RiskMetrics]) -> Vec<RiskLocation> {
        let mut coordinates: HashMap<&str, (f64, f64)> = HashMap::new();
        for record in &self.sources.monitoring {
            if let (Some(lat), Some(lon)) = (record.latitude, record.longitude) {
                coordinates
                    .entry(record.parcelle_id.as_str())
                    .or_insert((lat, lon));
            }
        }

        risk_metrics
            .iter()
            .filter_map(|m| {
                let Some(&(latitude, longitude)) = coordinates.get(m.parcelle_id.as_str()) else {
                    debug!("No monitoring coordinates for parcel '{}'", m.parcelle_id);
                    return None;
                };
                Some(RiskLocation {
                    parcelle_id: m.parcelle_id.clone(),
                    latitude,
                    longitude,
                    risk_score: m.risk_score,
                })
            })
            .collect()
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Environment, SoilRecord, WeatherRecord};
    use approx::assert_relative_eq;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 1, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn manager() -> DataManager {
        let monitoring = vec![
            MonitoringRecord {
                date: at(1),
                parcelle_id: "P2".to_string(),
                latitude: Some(2.0),
                longitude: Some(20.0),
                stress_hydrique: Some(0.3),
                ..Default::default()
            },
            MonitoringRecord {
                date: at(1),
                parcelle_id: "P1".to_string(),
                latitude: Some(1.0),
                longitude: Some(10.0),
                stress_hydrique: Some(0.5),
                ..Default::default()
            },
            MonitoringRecord {
                date: at(2),
                parcelle_id: "P1".to_string(),
                latitude: Some(1.5),
                longitude: Some(10.5),
                stress_hydrique: None,
                ..Default::default()
            },
        ];
        let weather = vec![WeatherRecord {
            date: at(1),
            environment: Environment {
                temperature: Some(20.0),
                ..Default::default()
            },
            ..Default::default()
        }];
        let soil = vec![
            SoilRecord {
                parcelle_id: Some("P1".to_string()),
                latitude: Some(1.0),
                longitude: Some(10.0),
                capacite_retention_eau: Some(0.4),
                ..Default::default()
            },
            SoilRecord {
                parcelle_id: Some("P2".to_string()),
                latitude: Some(2.0),
                longitude: Some(20.0),
                capacite_retention_eau: Some(0.6),
                ..Default::default()
            },
        ];
        let yield_history = vec![
            YieldHistoryRecord {
                date: at(1),
                parcelle_id: "P1".to_string(),
                rendement_final: 4.0,
                culture: None,
            },
            YieldHistoryRecord {
                date: at(2),
                parcelle_id: "P1".to_string(),
                rendement_final: 6.0,
                culture: None,
            },
        ];
        DataManager::from_tables(
            PipelineConfig::default(),
            SourceTables {
                monitoring,
                weather,
                soil,
                yield_history,
            },
        )
    }

    #[test]
    fn test_parcel_accessors() {
        let dm = manager();
        assert_eq!(dm.parcel_ids(), vec!["P1".to_string(), "P2".to_string()]);
        assert_eq!(dm.monitoring_for("P1").len(), 2);
        assert_eq!(dm.yield_history_for("P1").len(), 2);
        assert!(dm.yield_history_for("P2").is_empty());
    }

    #[test]
    fn test_prepare_features_is_deterministic() {
        let dm = manager();
        let first = dm.prepare_features();
        let second = dm.prepare_features();
        assert_eq!(first, second);
        assert_eq!(first.len(), dm.sources().monitoring.len());
        // The null stress of P1 on day 2 is left alone by the gap filler.
        assert!(first.iter().any(|r| r.stress_hydrique.is_none()));
    }

    #[test]
    fn test_combined_stress_index() {
        let dm = manager();
        let features = dm.prepare_features();
        let index = DataManager::combined_stress_index(&features);
        assert_eq!(index.len(), features.len());
        for (row, value) in features.iter().zip(&index) {
            match row.stress_hydrique {
                Some(stress) => assert_relative_eq!(value.unwrap(), 0.7 * stress + 0.3),
                None => assert_eq!(*value, None),
            }
        }

        let cold = vec![FeatureRow {
            stress_hydrique: Some(0.5),
            environment: Environment {
                temperature: Some(-3.0),
                ..Default::default()
            },
            ..Default::default()
        }];
        assert_eq!(DataManager::combined_stress_index(&cold), vec![None]);
    }

    #[test]
    fn test_parcel_yield_summaries() {
        let summaries = manager().parcel_yield_summaries();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].parcelle_id, "P1");
        assert_relative_eq!(summaries[0].mean_rendement_final, 5.0);
        assert!(summaries[0].has_history);
        assert_eq!(summaries[1].mean_rendement_final, 0.0);
        assert!(!summaries[1].has_history);
    }

    #[test]
    fn test_risk_locations_use_first_coordinates() {
        let dm = manager();
        let metrics = vec![
            RiskMetrics {
                parcelle_id: "P1".to_string(),
                mean_stress: 0.5,
                stress_variability: 0.0,
                mean_temperature: 20.0,
                capacite_retention_eau: 0.4,
                risk_score: 2.32,
            },
            RiskMetrics {
                parcelle_id: "P9".to_string(),
                mean_stress: 0.5,
                stress_variability: 0.0,
                mean_temperature: 20.0,
                capacite_retention_eau: 0.4,
                risk_score: 2.32,
            },
        ];
        let locations = dm.risk_locations(&metrics);
        assert_eq!(
            locations,
            vec![RiskLocation {
                parcelle_id: "P1".to_string(),
                latitude: 1.0,
                longitude: 10.0,
                risk_score: 2.32,
            }]
        );
    }

    #[test]
    fn test_rows_without_coordinates_are_not_placed() {
        let mut sources = manager().sources().clone();
        sources.monitoring[1].latitude = None;
        sources.soil[1].longitude = None;
        let dm = DataManager::from_tables(PipelineConfig::default(), sources);

        let metrics = vec![RiskMetrics {
            parcelle_id: "P1".to_string(),
            mean_stress: 0.5,
            stress_variability: 0.0,
            mean_temperature: 20.0,
            capacite_retention_eau: 0.4,
            risk_score: 2.32,
        }];
        // The first P1 observation has no latitude, so the second one is used.
        let locations = dm.risk_locations(&metrics);
        assert_eq!(locations.len(), 1);
        assert_eq!((locations[0].latitude, locations[0].longitude), (1.5, 10.5));

        let summaries = dm.parcel_yield_summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].parcelle_id, "P1");
    }

    #[test]
    fn test_analysis_errors_surface() {
        let dm = manager();
        let features = dm.prepare_features();
        assert!(matches!(
            dm.calculate_risk_metrics(&features),
            Err(AnalysisError::NullValues { .. })
        ));
        assert!(matches!(
            dm.analyze_yield_patterns("P2"),
            Err(AnalysisError::NoYieldHistory { .. })
        ));
        assert_eq!(dm.analyze_yield_patterns("P1").unwrap().len(), 2);
    }
}
