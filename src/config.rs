use crate::errors::ConfigError;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub const MONITORING_FILE: &str = "monitoring_cultures.csv";
pub const WEATHER_FILE: &str = "meteo_detaillee.csv";
pub const SOIL_FILE: &str = "sols.csv";
pub const YIELD_HISTORY_FILE: &str = "historique_rendements.csv";

/// Settings for one batch run: where the four source tables live, how to read
/// them, and the few tunables of the analytics stages.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    #[serde(default = "default_monitoring_path")]
    pub monitoring_path: PathBuf,
    #[serde(default = "default_weather_path")]
    pub weather_path: PathBuf,
    #[serde(default = "default_soil_path")]
    pub soil_path: PathBuf,
    #[serde(default = "default_yield_history_path")]
    pub yield_history_path: PathBuf,
    #[serde(default)]
    pub delimiter: Option<String>,
    #[serde(default = "default_null_markers")]
    pub null_markers: Vec<String>,
    // Raw weather rows collapsed into one aggregated record.
    #[serde(default = "default_weather_block_size")]
    pub weather_block_size: usize,
    #[serde(default = "default_date_tolerance_days")]
    pub date_tolerance_days: i64,
    #[serde(default = "default_decomposition_period")]
    pub decomposition_period: usize,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_monitoring_path() -> PathBuf {
    default_data_dir().join(MONITORING_FILE)
}

fn default_weather_path() -> PathBuf {
    default_data_dir().join(WEATHER_FILE)
}

fn default_soil_path() -> PathBuf {
    default_data_dir().join(SOIL_FILE)
}

fn default_yield_history_path() -> PathBuf {
    default_data_dir().join(YIELD_HISTORY_FILE)
}

fn default_null_markers() -> Vec<String> {
    ["", "NA", "NaN", "nan", "null", "None"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_weather_block_size() -> usize {
    24
}

fn default_date_tolerance_days() -> i64 {
    1
}

fn default_decomposition_period() -> usize {
    1
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            monitoring_path: default_monitoring_path(),
            weather_path: default_weather_path(),
            soil_path: default_soil_path(),
            yield_history_path: default_yield_history_path(),
            delimiter: None,
            null_markers: default_null_markers(),
            weather_block_size: default_weather_block_size(),
            date_tolerance_days: default_date_tolerance_days(),
            decomposition_period: default_decomposition_period(),
        }
    }
}

impl PipelineConfig {
    /// Points all four source paths at the standard file names inside `dir`.
    pub fn with_data_dir(mut self, dir: &Path) -> Self {
        self.monitoring_path = dir.join(MONITORING_FILE);
        self.weather_path = dir.join(WEATHER_FILE);
        self.soil_path = dir.join(SOIL_FILE);
        self.yield_history_path = dir.join(YIELD_HISTORY_FILE);
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(dir) = std::env::var("PARCEL_DATA_DIR") {
            self = self.with_data_dir(Path::new(&dir));
        }

        if let Ok(block) = std::env::var("PARCEL_WEATHER_BLOCK_SIZE") {
            self.weather_block_size = match block.parse::<usize>() {
                Ok(size) if size > 0 => size,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        name: "PARCEL_WEATHER_BLOCK_SIZE".to_string(),
                        value: block,
                    })
                }
            };
        }

        Ok(self)
    }

    /// CSV delimiter as a byte, defaulting to a comma. Anything other than a
    /// single ASCII character also falls back to a comma.
    pub fn delimiter_byte(&self) -> u8 {
        match self.delimiter.as_deref() {
            None => b',',
            Some(d) => match d.as_bytes() {
                [b] if b.is_ascii() => *b,
                _ => {
                    warn!("Unusable CSV delimiter '{}', using ','", d);
                    b','
                }
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(d) = &self.delimiter {
            if !matches!(d.as_bytes(), [b] if b.is_ascii()) {
                return Err(ConfigError::InvalidDelimiter { value: d.clone() });
            }
        }
        Ok(())
    }

    pub fn is_null_marker(&self, value: &str) -> bool {
        let trimmed = value.trim();
        self.null_markers.iter().any(|m| m == trimmed)
    }
}

// Function to load the configuration from the JSON file
pub fn load_config(path: &Path) -> Result<PipelineConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let file = File::open(path).map_err(|e| ConfigError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    let reader = BufReader::new(file);

    let config: PipelineConfig =
        serde_json::from_reader(reader).map_err(|e| ConfigError::JsonParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
    config.validate()?;
    debug!("Loaded configuration from {}: {:?}", path.display(), config);

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "weather_block_size": 12, "delimiter": ";" }"#).unwrap();

        assert_eq!(config.weather_block_size, 12);
        assert_eq!(config.delimiter_byte(), b';');
        assert_eq!(config.date_tolerance_days, 1);
        assert_eq!(config.decomposition_period, 1);
        assert_eq!(config.soil_path, PathBuf::from("data").join(SOIL_FILE));
    }

    #[test]
    fn test_with_data_dir() {
        let config = PipelineConfig::default().with_data_dir(Path::new("/srv/farm"));
        assert_eq!(config.weather_path, PathBuf::from("/srv/farm/meteo_detaillee.csv"));
        assert_eq!(
            config.yield_history_path,
            PathBuf::from("/srv/farm/historique_rendements.csv")
        );
    }

    #[test]
    fn test_null_markers() {
        let config = PipelineConfig::default();
        assert!(config.is_null_marker(""));
        assert!(config.is_null_marker(" NaN "));
        assert!(!config.is_null_marker("0"));
    }

    #[test]
    fn test_non_ascii_delimiter_is_rejected() {
        let config = PipelineConfig {
            delimiter: Some("§".to_string()),
            ..Default::default()
        };
        assert_eq!(config.delimiter_byte(), b',');
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDelimiter { ref value }) if value == "§"
        ));

        let tab = PipelineConfig {
            delimiter: Some("\t".to_string()),
            ..Default::default()
        };
        assert_eq!(tab.delimiter_byte(), b'\t');
        assert!(tab.validate().is_ok());
    }

    #[test]
    fn test_missing_config_file() {
        let err = load_config(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }
}
