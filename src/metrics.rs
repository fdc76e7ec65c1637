use log::info;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Global metrics instance
pub static METRICS: Lazy<Mutex<Metrics>> = Lazy::new(|| Mutex::new(Metrics::new()));

/// Pipeline metrics tracker
#[derive(Debug, Default)]
pub struct Metrics {
    pub rows_loaded: BTreeMap<String, u64>,
    pub weather_rows_aggregated: u64,
    pub feature_rows_produced: u64,
    pub parcels_filled: u64,
    pub parcels_scored: u64,
    pub processing_times: BTreeMap<String, Duration>,
    pub start_time: Option<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn record_rows_loaded(&mut self, source: &str, rows: u64) {
        *self.rows_loaded.entry(source.to_string()).or_insert(0) += rows;
    }

    pub fn record_weather_aggregation(&mut self, aggregated: u64) {
        self.weather_rows_aggregated += aggregated;
    }

    pub fn record_features(&mut self, rows: u64, parcels: u64) {
        self.feature_rows_produced += rows;
        self.parcels_filled += parcels;
    }

    pub fn record_risk(&mut self, parcels: u64) {
        self.parcels_scored += parcels;
    }

    pub fn record_processing_time(&mut self, operation: String, duration: Duration) {
        *self.processing_times.entry(operation).or_default() += duration;
    }

    pub fn total_rows_loaded(&self) -> u64 {
        self.rows_loaded.values().sum()
    }

    pub fn get_total_duration(&self) -> Duration {
        self.start_time
            .map(|start| start.elapsed())
            .unwrap_or_default()
    }

    pub fn get_throughput(&self) -> f64 {
        let duration_secs = self.get_total_duration().as_secs_f64();
        if duration_secs > 0.0 {
            self.total_rows_loaded() as f64 / duration_secs
        } else {
            0.0
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn log_summary(&self) {
        info!("========== Pipeline Metrics Summary ==========");
        info!("Total Duration: {:.2?}", self.get_total_duration());
        for (source, rows) in &self.rows_loaded {
            info!("Rows Loaded ({}): {}", source, rows);
        }
        info!("Weather Records After Aggregation: {}", self.weather_rows_aggregated);
        info!("Feature Rows Produced: {}", self.feature_rows_produced);
        info!("Parcels Gap-Filled: {}", self.parcels_filled);
        info!("Parcels Scored: {}", self.parcels_scored);
        info!("Throughput: {:.2} rows/sec", self.get_throughput());

        if !self.processing_times.is_empty() {
            info!("Processing Times:");
            for (op, duration) in &self.processing_times {
                info!("  {}: {:.2?}", op, duration);
            }
        }
        info!("==============================================");
    }
}

/// Helper macro to time an operation
#[macro_export]
macro_rules! time_operation {
    ($name:expr, $op:expr) => {{
        let start = std::time::Instant::now();
        let result = $op;
        let duration = start.elapsed();
        $crate::metrics::METRICS
            .lock()
            .record_processing_time($name.to_string(), duration);
        result
    }};
}
