//! Agricultural parcel analytics: loads crop monitoring, weather, soil and
//! yield history tables, merges them into a per-parcel daily feature table and
//! derives risk scores and temporal patterns from it.

pub mod config;
pub mod errors;
pub mod export;
pub mod gap_filler;
pub mod manager;
pub mod merger;
pub mod metrics;
pub mod models;
pub mod parsers;
pub mod patterns;
pub mod risk;
pub mod temporal;
pub mod utils;
pub mod validation;
pub mod weather;

pub use config::PipelineConfig;
pub use errors::{AnalysisError, ConfigError, LoadError, PipelineError};
pub use manager::DataManager;
pub use models::{DecomposedYield, FeatureRow, FeatureTable, RiskMetrics, SourceTables};
