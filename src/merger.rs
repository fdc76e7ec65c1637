//! Builds the feature table from the four sources:
//! monitoring as-of weather, then soil, then yield history.
//!
//! Every join is driven by the monitoring rows, so the table has exactly one row
//! per monitoring record. When a right-hand key is duplicated the first record
//! wins and a warning is logged; validating key uniqueness is the caller's job
//! (see [`duplicate_keys`]).

use crate::models::{
    FeatureRow, FeatureTable, MonitoringRecord, SoilFeatures, SoilRecord, SourceTables,
    WeatherRecord, YieldHistoryRecord,
};
use chrono::NaiveDateTime;
use log::{debug, warn};
use std::collections::HashMap;

type SoilKey = (String, u64, u64);
type YieldKey = (NaiveDateTime, String);

// Exact float equality, with -0.0 and 0.0 treated as the same coordinate.
fn coord_bits(value: f64) -> u64 {
    (value + 0.0).to_bits()
}

/// `None` when a coordinate is null: such a row never joins.
fn soil_key(parcelle_id: &str, latitude: Option<f64>, longitude: Option<f64>) -> Option<SoilKey> {
    Some((
        parcelle_id.to_string(),
        coord_bits(latitude?),
        coord_bits(longitude?),
    ))
}

/// Position of the latest entry at or before `at` in an ascending slice.
/// Among equal timestamps the last one is chosen.
pub fn asof_position(sorted_dates: &[NaiveDateTime], at: NaiveDateTime) -> Option<usize> {
    sorted_dates.partition_point(|d| *d <= at).checked_sub(1)
}

/// Pairs each monitoring record (sorted by date) with the most recent weather
/// record at or before its timestamp; `None` when it predates all weather.
pub fn asof_join<'w>(
    monitoring: &[MonitoringRecord],
    weather: &'w [WeatherRecord],
) -> Vec<(MonitoringRecord, Option<&'w WeatherRecord>)> {
    let mut left: Vec<MonitoringRecord> = monitoring.to_vec();
    left.sort_by_key(|r| r.date);

    let mut right: Vec<&WeatherRecord> = weather.iter().collect();
    right.sort_by_key(|r| r.date);
    let right_dates: Vec<NaiveDateTime> = right.iter().map(|r| r.date).collect();

    left.into_iter()
        .map(|record| {
            let matched = asof_position(&right_dates, record.date).map(|i| right[i]);
            (record, matched)
        })
        .collect()
}

struct SoilIndex<'s> {
    by_key: HashMap<SoilKey, &'s SoilRecord>,
}

impl<'s> SoilIndex<'s> {
    fn new(soil: &'s [SoilRecord]) -> Self {
        let mut by_key = HashMap::new();
        for record in soil {
            let key = record
                .parcelle_id
                .as_deref()
                .and_then(|id| soil_key(id, record.latitude, record.longitude));
            if let Some(key) = key {
                by_key.entry(key).or_insert(record);
            }
        }
        Self { by_key }
    }

    fn lookup(
        &self,
        parcelle_id: &str,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Option<&'s SoilRecord> {
        let key = soil_key(parcelle_id, latitude, longitude)?;
        self.by_key.get(&key).copied()
    }
}

fn yield_index(history: &[YieldHistoryRecord]) -> HashMap<YieldKey, &YieldHistoryRecord> {
    let mut by_key = HashMap::new();
    for record in history {
        by_key
            .entry((record.date, record.parcelle_id.clone()))
            .or_insert(record);
    }
    by_key
}

/// Duplicated right-hand join keys; each would fan out a monitoring row in a
/// plain relational join.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinDiagnostics {
    pub duplicate_soil_keys: Vec<(String, f64, f64)>,
    pub duplicate_yield_keys: Vec<(NaiveDateTime, String)>,
}

impl JoinDiagnostics {
    pub fn is_clean(&self) -> bool {
        self.duplicate_soil_keys.is_empty() && self.duplicate_yield_keys.is_empty()
    }
}

pub fn duplicate_keys(soil: &[SoilRecord], yield_history: &[YieldHistoryRecord]) -> JoinDiagnostics {
    let mut soil_counts: HashMap<SoilKey, (usize, f64, f64)> = HashMap::new();
    for record in soil {
        let (Some(id), Some(lat), Some(lon)) =
            (&record.parcelle_id, record.latitude, record.longitude)
        else {
            continue;
        };
        soil_counts
            .entry((id.clone(), coord_bits(lat), coord_bits(lon)))
            .or_insert((0, lat, lon))
            .0 += 1;
    }
    let mut duplicate_soil_keys: Vec<(String, f64, f64)> = soil_counts
        .into_iter()
        .filter(|(_, (count, _, _))| *count > 1)
        .map(|((id, _, _), (_, lat, lon))| (id, lat, lon))
        .collect();
    duplicate_soil_keys.sort_by(|a, b| a.0.cmp(&b.0));

    let mut yield_counts: HashMap<YieldKey, usize> = HashMap::new();
    for record in yield_history {
        *yield_counts
            .entry((record.date, record.parcelle_id.clone()))
            .or_insert(0) += 1;
    }
    let mut duplicate_yield_keys: Vec<YieldKey> = yield_counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(key, _)| key)
        .collect();
    duplicate_yield_keys.sort();

    JoinDiagnostics {
        duplicate_soil_keys,
        duplicate_yield_keys,
    }
}

/// Merges the sources into the (not yet gap-filled) feature table, in
/// monitoring date order.
pub fn merge_features(sources: &SourceTables) -> FeatureTable {
    let diagnostics = duplicate_keys(&sources.soil, &sources.yield_history);
    if !diagnostics.is_clean() {
        warn!(
            "Duplicate join keys, first record kept: soil {:?}, yield history {:?}",
            diagnostics.duplicate_soil_keys, diagnostics.duplicate_yield_keys
        );
    }

    let soil = SoilIndex::new(&sources.soil);
    let yields = yield_index(&sources.yield_history);

    let mut without_weather = 0usize;
    let mut without_soil = 0usize;

    let table: FeatureTable = asof_join(&sources.monitoring, &sources.weather)
        .into_iter()
        .map(|(record, weather)| {
            if weather.is_none() {
                without_weather += 1;
            }
            let environment = match weather {
                Some(w) => record.environment.or(&w.environment),
                None => record.environment,
            };

            let soil_features = soil
                .lookup(&record.parcelle_id, record.latitude, record.longitude)
                .map(|s| SoilFeatures {
                    capacite_retention_eau: s.capacite_retention_eau,
                    attributes: s.attributes.clone(),
                });
            if soil_features.is_none() {
                without_soil += 1;
            }

            let harvest = yields.get(&(record.date, record.parcelle_id.clone()));
            let culture = harvest
                .and_then(|h| h.culture.clone())
                .or(record.culture);

            FeatureRow {
                date: record.date,
                parcelle_id: record.parcelle_id,
                latitude: record.latitude,
                longitude: record.longitude,
                ndvi: record.ndvi,
                stress_hydrique: record.stress_hydrique,
                environment,
                rendement_estime: record.rendement_estime,
                progression: record.progression,
                culture,
                soil: soil_features,
                rendement_final: harvest.map(|h| h.rendement_final),
            }
        })
        .collect();

    if without_weather > 0 {
        debug!("{} monitoring row(s) precede every weather record", without_weather);
    }
    if without_soil > 0 {
        warn!("{} monitoring row(s) have no matching soil record", without_soil);
    }

    table
}
