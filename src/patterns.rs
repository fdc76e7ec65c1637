//! Per-parcel temporal patterns: monthly statistics of the feature table and
//! additive decomposition of the yield history.

use crate::errors::AnalysisError;
use crate::models::{DecomposedYield, FeatureColumn, FeatureRow, YieldHistoryRecord};
use crate::utils::{mean, median, month_end, sample_std};
use chrono::NaiveDate;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

/// Summary statistics of one column over one bucket. Every field is `None`
/// when the bucket holds no value (and `std` also when it holds only one).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColumnStats {
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub median: Option<f64>,
}

impl ColumnStats {
    pub fn from_values(values: &[f64]) -> Self {
        Self {
            count: values.len(),
            mean: mean(values),
            std: sample_std(values),
            min: values.iter().copied().reduce(f64::min),
            max: values.iter().copied().reduce(f64::max),
            median: median(values),
        }
    }
}

/// One calendar month of a parcel, labelled by the month's last day.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlySummary {
    pub month: NaiveDate,
    pub columns: BTreeMap<FeatureColumn, ColumnStats>,
}

impl MonthlySummary {
    pub fn get(&self, column: FeatureColumn) -> Option<&ColumnStats> {
        self.columns.get(&column)
    }
}

/// Monthly statistics of every temporal column for `parcelle_id`, one entry
/// per month from the parcel's first to its last row.
pub fn monthly_stats(
    features: &[FeatureRow],
    parcelle_id: &str,
) -> Result<Vec<MonthlySummary>, AnalysisError> {
    let rows: Vec<&FeatureRow> = features
        .iter()
        .filter(|r| r.parcelle_id == parcelle_id)
        .collect();

    let (Some(first), Some(last)) = (
        rows.iter().map(|r| r.date.date()).min(),
        rows.iter().map(|r| r.date.date()).max(),
    ) else {
        return Err(AnalysisError::NoParcelData {
            parcelle_id: parcelle_id.to_string(),
        });
    };

    let mut buckets: BTreeMap<NaiveDate, Vec<&FeatureRow>> = BTreeMap::new();
    let mut month = month_end(first);
    let last_month = month_end(last);
    while month <= last_month {
        buckets.insert(month, Vec::new());
        match month.succ_opt() {
            Some(next) => month = month_end(next),
            None => break,
        }
    }
    for row in rows {
        buckets.entry(month_end(row.date.date())).or_default().push(row);
    }

    debug!(
        "Monthly stats for parcel '{}': {} month(s)",
        parcelle_id,
        buckets.len()
    );

    Ok(buckets
        .into_iter()
        .map(|(month, rows)| {
            let columns = FeatureColumn::TEMPORAL
                .iter()
                .map(|&column| {
                    let values: Vec<f64> = rows.iter().filter_map(|r| r.value(column)).collect();
                    (column, ColumnStats::from_values(&values))
                })
                .collect();
            MonthlySummary { month, columns }
        })
        .collect())
}

/// Trend, seasonal and residual components of an additive decomposition.
#[derive(Debug, Clone, PartialEq)]
pub struct AdditiveDecomposition {
    pub trend: Vec<Option<f64>>,
    pub seasonal: Vec<f64>,
    pub resid: Vec<Option<f64>>,
}

/// Classic moving-average additive decomposition.
///
/// The trend is a centred moving average over `period` points (a 2x`period`
/// average for even periods). Positions where the window does not fit have no
/// trend and no residual. The seasonal component is the mean detrended value of
/// each phase, shifted so the phases sum to zero.
pub fn decompose_additive(
    values: &[f64],
    period: usize,
) -> Result<AdditiveDecomposition, AnalysisError> {
    if period == 0 {
        return Err(AnalysisError::InvalidPeriod);
    }
    let n = values.len();
    if n < 2 * period {
        return Err(AnalysisError::InsufficientObservations {
            needed: 2 * period,
            found: n,
        });
    }

    let weights: Vec<f64> = if period % 2 == 0 {
        let mut w = vec![1.0 / period as f64; period + 1];
        w[0] /= 2.0;
        w[period] /= 2.0;
        w
    } else {
        vec![1.0 / period as f64; period]
    };
    let half = weights.len() / 2;

    let trend: Vec<Option<f64>> = (0..n)
        .map(|i| {
            if i < half || i + half >= n {
                return None;
            }
            let window = &values[i - half..=i + half];
            Some(window.iter().zip(&weights).map(|(v, w)| v * w).sum())
        })
        .collect();

    let mut phase_values: Vec<Vec<f64>> = vec![Vec::new(); period];
    for (i, (value, t)) in values.iter().zip(&trend).enumerate() {
        if let Some(t) = t {
            phase_values[i % period].push(value - t);
        }
    }
    let phase_means: Vec<f64> = phase_values
        .iter()
        .map(|v| mean(v).unwrap_or(0.0))
        .collect();
    let offset = mean(&phase_means).unwrap_or(0.0);

    let seasonal: Vec<f64> = (0..n).map(|i| phase_means[i % period] - offset).collect();
    let resid = values
        .iter()
        .zip(&trend)
        .zip(&seasonal)
        .map(|((v, t), s)| t.map(|t| v - t - s))
        .collect();

    Ok(AdditiveDecomposition {
        trend,
        seasonal,
        resid,
    })
}

/// Decomposes the chronologically sorted yield history of one parcel.
pub fn analyze_yield_patterns(
    history: &[YieldHistoryRecord],
    parcelle_id: &str,
    period: usize,
) -> Result<DecomposedYield, AnalysisError> {
    let mut records: Vec<&YieldHistoryRecord> = history
        .iter()
        .filter(|r| r.parcelle_id == parcelle_id)
        .collect();
    if records.is_empty() {
        return Err(AnalysisError::NoYieldHistory {
            parcelle_id: parcelle_id.to_string(),
        });
    }
    records.sort_by_key(|r| r.date);

    let observed: Vec<f64> = records.iter().map(|r| r.rendement_final).collect();
    let decomposition = decompose_additive(&observed, period)?;

    Ok(DecomposedYield {
        parcelle_id: parcelle_id.to_string(),
        dates: records.iter().map(|r| r.date).collect(),
        trend: decomposition.trend,
        seasonal: decomposition.seasonal,
        resid: decomposition.resid,
        observed,
    })
}
