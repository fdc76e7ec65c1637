use crate::config::PipelineConfig;
use crate::errors::LoadError;
use crate::models::{
    Environment, MonitoringRecord, SoilRecord, WeatherRecord, YieldHistoryRecord,
};
use crate::utils::{accepted_formats, parse_locale_float, parse_timestamp};
use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord, Trim};
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;

pub const MONITORING_REQUIRED: [&str; 4] = ["date", "parcelle_id", "latitude", "longitude"];
pub const WEATHER_REQUIRED: [&str; 7] = [
    "date",
    "temperature",
    "humidite",
    "precipitation",
    "rayonnement_solaire",
    "vitesse_vent",
    "direction_vent",
];
pub const SOIL_REQUIRED: [&str; 4] = ["parcelle_id", "latitude", "longitude", "capacite_retention_eau"];
pub const YIELD_HISTORY_REQUIRED: [&str; 3] = ["date", "parcelle_id", "rendement_final"];

/// A CSV table read into memory with its header positions resolved by name.
pub struct RawTable<'c> {
    source_name: String,
    header_map: HashMap<String, usize>,
    headers: Vec<String>,
    rows: Vec<StringRecord>,
    config: &'c PipelineConfig,
}

pub fn read_table<'c, R: Read>(
    reader: R,
    source_name: &str,
    config: &'c PipelineConfig,
) -> Result<RawTable<'c>, LoadError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(config.delimiter_byte())
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| LoadError::HeaderReadError {
            source_name: source_name.to_string(),
            source: e,
        })?
        .clone();

    let mut header_map: HashMap<String, usize> = HashMap::new();
    for (index, header) in headers.iter().enumerate() {
        header_map.entry(header.trim().to_string()).or_insert(index);
    }

    let mut rows = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result.map_err(|e| LoadError::RowReadError {
            source_name: source_name.to_string(),
            row: i + 2,
            source: e,
        })?;
        rows.push(record);
    }
    debug!("Read {} rows from {}", rows.len(), source_name);

    Ok(RawTable {
        source_name: source_name.to_string(),
        header_map,
        headers: headers.iter().map(|h| h.trim().to_string()).collect(),
        rows,
        config,
    })
}

impl<'c> RawTable<'c> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.header_map.contains_key(column)
    }

    /// Fails with the full list of absent columns, not just the first one.
    pub fn require(&self, columns: &[&str]) -> Result<(), LoadError> {
        let missing: Vec<String> = columns
            .iter()
            .filter(|c| !self.has_column(c))
            .map(|c| c.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(LoadError::MissingColumns {
                source_name: self.source_name.clone(),
                missing,
            })
        }
    }

    /// Raw cell text; `None` for absent columns and null markers.
    fn cell<'r>(&self, row: &'r StringRecord, column: &str) -> Option<&'r str> {
        let index = *self.header_map.get(column)?;
        row.get(index).filter(|v| !self.config.is_null_marker(v))
    }

    fn text(&self, row: &StringRecord, column: &str) -> Option<String> {
        self.cell(row, column).map(|v| v.to_string())
    }

    fn float(&self, row_idx: usize, row: &StringRecord, column: &str) -> Result<Option<f64>, LoadError> {
        match self.cell(row, column) {
            None => Ok(None),
            Some(value) => match parse_locale_float(value) {
                // NaN literals the null markers did not catch are still nulls.
                Ok(v) if v.is_nan() => Ok(None),
                Ok(v) => Ok(Some(v)),
                Err(_) => Err(LoadError::ValueParseError {
                    source_name: self.source_name.clone(),
                    row: row_idx + 2,
                    column: column.to_string(),
                    value: value.to_string(),
                }),
            },
        }
    }

    fn required_text(&self, row_idx: usize, row: &StringRecord, column: &str) -> Result<String, LoadError> {
        self.text(row, column)
            .ok_or_else(|| self.missing_value(row_idx, column))
    }

    fn timestamp(&self, row_idx: usize, row: &StringRecord, column: &str) -> Result<NaiveDateTime, LoadError> {
        let value = self
            .cell(row, column)
            .ok_or_else(|| self.missing_value(row_idx, column))?;
        parse_timestamp(value).ok_or_else(|| LoadError::TimestampParseError {
            source_name: self.source_name.clone(),
            row: row_idx + 2,
            value: value.to_string(),
            formats: accepted_formats(),
        })
    }

    fn environment(&self, row_idx: usize, row: &StringRecord) -> Result<Environment, LoadError> {
        let mut env = Environment::default();
        for (i, field) in Environment::FIELDS.iter().enumerate() {
            env.set(i, self.float(row_idx, row, field)?);
        }
        Ok(env)
    }

    fn missing_value(&self, row_idx: usize, column: &str) -> LoadError {
        LoadError::MissingValue {
            source_name: self.source_name.clone(),
            row: row_idx + 2,
            column: column.to_string(),
        }
    }
}

pub fn parse_monitoring<R: Read>(
    reader: R,
    source_name: &str,
    config: &PipelineConfig,
) -> Result<Vec<MonitoringRecord>, LoadError> {
    let table = read_table(reader, source_name, config)?;
    table.require(&MONITORING_REQUIRED)?;

    table
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| -> Result<MonitoringRecord, LoadError> {
            Ok(MonitoringRecord {
                date: table.timestamp(i, row, "date")?,
                parcelle_id: table.required_text(i, row, "parcelle_id")?,
                latitude: table.float(i, row, "latitude")?,
                longitude: table.float(i, row, "longitude")?,
                ndvi: table.float(i, row, "ndvi")?,
                stress_hydrique: table.float(i, row, "stress_hydrique")?,
                environment: table.environment(i, row)?,
                rendement_estime: table.float(i, row, "rendement_estime")?,
                progression: table.float(i, row, "progression")?,
                culture: table.text(row, "culture"),
            })
        })
        .collect()
}

/// Raw (sub-daily) weather rows, in file order.
pub fn parse_weather<R: Read>(
    reader: R,
    source_name: &str,
    config: &PipelineConfig,
) -> Result<Vec<WeatherRecord>, LoadError> {
    let table = read_table(reader, source_name, config)?;
    table.require(&WEATHER_REQUIRED)?;

    table
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| -> Result<WeatherRecord, LoadError> {
            Ok(WeatherRecord {
                date: table.timestamp(i, row, "date")?,
                environment: table.environment(i, row)?,
                latitude: table.float(i, row, "latitude")?,
                longitude: table.float(i, row, "longitude")?,
            })
        })
        .collect()
}

pub fn parse_soil<R: Read>(
    reader: R,
    source_name: &str,
    config: &PipelineConfig,
) -> Result<Vec<SoilRecord>, LoadError> {
    let table = read_table(reader, source_name, config)?;
    table.require(&SOIL_REQUIRED)?;

    let extra_columns: Vec<&String> = table
        .headers
        .iter()
        .filter(|h| !SOIL_REQUIRED.contains(&h.as_str()))
        .collect();

    table
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| -> Result<SoilRecord, LoadError> {
            let attributes: BTreeMap<String, String> = extra_columns
                .iter()
                .filter_map(|column| table.text(row, column).map(|v| (column.to_string(), v)))
                .collect();
            Ok(SoilRecord {
                // Nullable here; the risk scorer rejects such rows explicitly.
                parcelle_id: table.text(row, "parcelle_id"),
                latitude: table.float(i, row, "latitude")?,
                longitude: table.float(i, row, "longitude")?,
                capacite_retention_eau: table.float(i, row, "capacite_retention_eau")?,
                attributes,
            })
        })
        .collect()
}

/// Yield history with missing `rendement_final` normalised to 0.0.
pub fn parse_yield_history<R: Read>(
    reader: R,
    source_name: &str,
    config: &PipelineConfig,
) -> Result<Vec<YieldHistoryRecord>, LoadError> {
    let table = read_table(reader, source_name, config)?;
    table.require(&YIELD_HISTORY_REQUIRED)?;

    table
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| -> Result<YieldHistoryRecord, LoadError> {
            Ok(YieldHistoryRecord {
                date: table.timestamp(i, row, "date")?,
                parcelle_id: table.required_text(i, row, "parcelle_id")?,
                rendement_final: table.float(i, row, "rendement_final")?.unwrap_or(0.0),
                culture: table.text(row, "culture"),
            })
        })
        .collect()
}
