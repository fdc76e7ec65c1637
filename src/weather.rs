//! Collapses the high-frequency weather feed into daily records.
//!
//! Grouping is positional: every `block_size` consecutive raw rows become one
//! record, whatever their timestamps say. With the default block of 24 this
//! assumes an hourly, gapless, chronologically ordered feed. A feed sampled any
//! other way produces "days" that drift away from calendar days.

use crate::models::{Environment, WeatherRecord};
use crate::utils::midnight;
use chrono::DateTime;
use log::{debug, warn};

pub const DEFAULT_BLOCK_SIZE: usize = 24;

/// One aggregated record per block of `block_size` raw rows; a trailing short
/// block is still emitted, so the output has `ceil(len / block_size)` records.
pub fn aggregate_blocks(raw: &[WeatherRecord], block_size: usize) -> Vec<WeatherRecord> {
    let block_size = if block_size == 0 {
        warn!("Weather block size of 0 requested, using {}", DEFAULT_BLOCK_SIZE);
        DEFAULT_BLOCK_SIZE
    } else {
        block_size
    };

    if raw.len() % block_size != 0 {
        debug!(
            "{} raw weather rows are not a multiple of {}; last block holds {} rows",
            raw.len(),
            block_size,
            raw.len() % block_size
        );
    }

    raw.chunks(block_size).map(aggregate_block).collect()
}

fn aggregate_block(block: &[WeatherRecord]) -> WeatherRecord {
    let mut environment = Environment::default();
    for i in 0..Environment::FIELDS.len() {
        environment.set(i, mean_of(block.iter().map(|r| r.environment.get(i))));
    }

    WeatherRecord {
        date: mean_date(block),
        environment,
        latitude: mean_of(block.iter().map(|r| r.latitude)),
        longitude: mean_of(block.iter().map(|r| r.longitude)),
    }
}

// Nulls are skipped; an all-null block stays null.
fn mean_of(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, count) = values
        .flatten()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Mean timestamp of the block, truncated to midnight.
fn mean_date(block: &[WeatherRecord]) -> chrono::NaiveDateTime {
    let total: i128 = block
        .iter()
        .map(|r| r.date.and_utc().timestamp() as i128)
        .sum();
    let mean_secs = (total / block.len().max(1) as i128) as i64;
    let mean = DateTime::from_timestamp(mean_secs, 0)
        .map(|dt| dt.naive_utc())
        .unwrap_or(block[0].date);
    midnight(mean)
}
