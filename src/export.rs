//! CSV output of the analytics results.
//!
//! Writers are generic over [`std::io::Write`]; [`export_to_file`] adds the
//! file handling and error mapping used by the binary.

use crate::errors::PipelineError;
use crate::models::{DecomposedYield, FeatureRow, RiskMetrics};
use crate::patterns::MonthlySummary;
use crate::utils::DATETIME_FORMATS;
use chrono::NaiveDateTime;
use log::info;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

pub const FEATURES_FILE: &str = "features.csv";
pub const RISK_FILE: &str = "risk_metrics.csv";

pub fn monthly_stats_file(parcelle_id: &str) -> String {
    format!("monthly_stats_{}.csv", parcelle_id)
}

pub fn decomposition_file(parcelle_id: &str) -> String {
    format!("yield_decomposition_{}.csv", parcelle_id)
}

fn format_date(date: NaiveDateTime) -> String {
    date.format(DATETIME_FORMATS[0]).to_string()
}

fn format_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

const FEATURE_COLUMNS: [&str; 17] = [
    "date",
    "parcelle_id",
    "latitude",
    "longitude",
    "ndvi",
    "stress_hydrique",
    "temperature",
    "humidite",
    "precipitation",
    "rayonnement_solaire",
    "vitesse_vent",
    "direction_vent",
    "rendement_estime",
    "progression",
    "culture",
    "capacite_retention_eau",
    "rendement_final",
];

/// Feature table with one trailing column per soil attribute seen in any row.
pub fn write_features<W: Write>(writer: W, features: &[FeatureRow]) -> Result<(), csv::Error> {
    let attribute_names: BTreeSet<&str> = features
        .iter()
        .filter_map(|r| r.soil.as_ref())
        .flat_map(|s| s.attributes.keys().map(String::as_str))
        .collect();

    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(FEATURE_COLUMNS.iter().copied().chain(attribute_names.iter().copied()))?;

    for row in features {
        let mut record: Vec<String> = vec![
            format_date(row.date),
            row.parcelle_id.clone(),
            format_value(row.latitude),
            format_value(row.longitude),
            format_value(row.ndvi),
            format_value(row.stress_hydrique),
        ];
        record.extend((0..6).map(|i| format_value(row.environment.get(i))));
        record.extend([
            format_value(row.rendement_estime),
            format_value(row.progression),
            row.culture.clone().unwrap_or_default(),
            format_value(row.capacite_retention_eau()),
            format_value(row.rendement_final),
        ]);
        for name in &attribute_names {
            record.push(
                row.soil
                    .as_ref()
                    .and_then(|s| s.attributes.get(*name).cloned())
                    .unwrap_or_default(),
            );
        }
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_risk_metrics<W: Write>(writer: W, metrics: &[RiskMetrics]) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    for m in metrics {
        wtr.serialize(m)?;
    }
    wtr.flush()?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct MonthlyStatsRow<'a> {
    parcelle_id: &'a str,
    month: String,
    column: &'static str,
    count: usize,
    mean: Option<f64>,
    std: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
    median: Option<f64>,
}

/// Long format: one line per (month, column).
pub fn write_monthly_stats<W: Write>(
    writer: W,
    parcelle_id: &str,
    summaries: &[MonthlySummary],
) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    for summary in summaries {
        for (column, stats) in &summary.columns {
            wtr.serialize(MonthlyStatsRow {
                parcelle_id,
                month: summary.month.to_string(),
                column: column.name(),
                count: stats.count,
                mean: stats.mean,
                std: stats.std,
                min: stats.min,
                max: stats.max,
                median: stats.median,
            })?;
        }
    }
    wtr.flush()?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct DecompositionRow<'a> {
    parcelle_id: &'a str,
    date: String,
    observed: f64,
    trend: Option<f64>,
    seasonal: f64,
    resid: Option<f64>,
}

pub fn write_decomposition<W: Write>(
    writer: W,
    decomposed: &DecomposedYield,
) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    for i in 0..decomposed.len() {
        wtr.serialize(DecompositionRow {
            parcelle_id: &decomposed.parcelle_id,
            date: format_date(decomposed.dates[i]),
            observed: decomposed.observed[i],
            trend: decomposed.trend[i],
            seasonal: decomposed.seasonal[i],
            resid: decomposed.resid[i],
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// Creates `path` (and its parent directory) and hands a buffered file to `write`.
pub fn export_to_file<F>(path: &Path, write: F) -> Result<(), PipelineError>
where
    F: FnOnce(BufWriter<File>) -> Result<(), csv::Error>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| PipelineError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let file = File::create(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    write(BufWriter::new(file)).map_err(|source| PipelineError::Export {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Wrote {}", path.display());
    Ok(())
}
