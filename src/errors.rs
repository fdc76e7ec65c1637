use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading config file {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse JSON configuration in {path}: {source}")]
    JsonParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Configuration file not found at {path}")]
    NotFound { path: PathBuf },
    #[error("Invalid value for environment variable {name}: '{value}'")]
    InvalidEnv { name: String, value: String },
    #[error("CSV delimiter must be a single ASCII character, got '{value}'")]
    InvalidDelimiter { value: String },
}

/// Structural failures while reading one of the four source tables.
/// Always fatal: the input has to be fixed before anything can run.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error reading data file {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Error reading CSV headers in {source_name}: {source}")]
    HeaderReadError {
        source_name: String,
        #[source]
        source: csv::Error,
    },
    #[error("Error reading CSV row {row} in {source_name}: {source}")]
    RowReadError {
        source_name: String,
        row: usize,
        #[source]
        source: csv::Error,
    },
    #[error("Schema mismatch for table '{source_name}': Missing columns: {missing:?}")]
    MissingColumns {
        source_name: String,
        missing: Vec<String>,
    },
    #[error("Timestamp parsing error in {source_name} at row {row} for value '{value}' (tried formats {formats:?})")]
    TimestampParseError {
        source_name: String,
        row: usize,
        value: String,
        formats: Vec<String>,
    },
    #[error("Numeric parsing error in {source_name} at row {row}, column '{column}': '{value}'")]
    ValueParseError {
        source_name: String,
        row: usize,
        column: String,
        value: String,
    },
    #[error("Required value missing in {source_name} at row {row}, column '{column}'")]
    MissingValue {
        source_name: String,
        row: usize,
        column: String,
    },
}

/// Precondition violations raised by the analytics operations.
#[derive(Error, Debug, PartialEq)]
pub enum AnalysisError {
    #[error("Column '{column}' contains {count} null value(s); fill or drop them before computing risk metrics")]
    NullValues { column: String, count: usize },
    #[error("Soil table contains {count} record(s) with a null '{column}'")]
    IncompleteSoilData { column: String, count: usize },
    #[error("Parcels without water retention capacity: {parcels:?}")]
    MissingWaterRetention { parcels: Vec<String> },
    #[error("No data for parcel '{parcelle_id}'")]
    NoParcelData { parcelle_id: String },
    #[error("No yield history found for parcel '{parcelle_id}'")]
    NoYieldHistory { parcelle_id: String },
    #[error("Decomposition needs at least {needed} observations, got {found}")]
    InsufficientObservations { needed: usize, found: usize },
    #[error("Decomposition period must be at least 1")]
    InvalidPeriod,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration loading failed: {0}")]
    Config(#[from] ConfigError),
    #[error("Loading source tables failed: {0}")]
    Load(#[from] LoadError),
    #[error("Analysis failed: {0}")]
    Analysis(#[from] AnalysisError),
    #[error("Writing {path} failed: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
