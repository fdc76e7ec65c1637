//! Per-parcel gap filling of the merged feature table.
//!
//! The table is partitioned by `parcelle_id`, each partition is filled on its
//! own (no value ever crosses from one parcel to another) and the filled rows
//! are written back to their original positions.

use crate::models::{Environment, FeatureRow, FeatureTable};
use log::{debug, info};
use rayon::prelude::*;
use std::collections::HashMap;

/// Row positions of each parcel, parcels in order of first appearance.
pub fn partition_by_parcel(table: &[FeatureRow]) -> Vec<(String, Vec<usize>)> {
    let mut order: Vec<String> = Vec::new();
    let mut positions: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, row) in table.iter().enumerate() {
        positions
            .entry(row.parcelle_id.as_str())
            .or_insert_with(|| {
                order.push(row.parcelle_id.clone());
                Vec::new()
            })
            .push(i);
    }
    order
        .into_iter()
        .map(|id| {
            let rows = positions.remove(id.as_str()).unwrap_or_default();
            (id, rows)
        })
        .collect()
}

/// Backward fill then forward fill. Only an all-null column stays null.
pub fn carry_fill(values: &mut [Option<f64>]) {
    let mut next: Option<f64> = None;
    for v in values.iter_mut().rev() {
        match v {
            Some(x) => next = Some(*x),
            None => *v = next,
        }
    }
    let mut last: Option<f64> = None;
    for v in values.iter_mut() {
        match v {
            Some(x) => last = Some(*x),
            None => *v = last,
        }
    }
}

/// Linear interpolation against row position, flat beyond the first and last
/// known values. Only an all-null column stays null.
pub fn interpolate_linear(values: &mut [Option<f64>]) {
    let known: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|x| (i, x)))
        .collect();
    let (Some(&(first_idx, first_val)), Some(&(last_idx, last_val))) = (known.first(), known.last())
    else {
        return;
    };

    for v in values.iter_mut().take(first_idx) {
        *v = Some(first_val);
    }
    for v in values.iter_mut().skip(last_idx + 1) {
        *v = Some(last_val);
    }
    for pair in known.windows(2) {
        let (i0, y0) = pair[0];
        let (i1, y1) = pair[1];
        let span = (i1 - i0) as f64;
        for (offset, v) in values[i0 + 1..i1].iter_mut().enumerate() {
            let t = (offset + 1) as f64 / span;
            *v = Some(y0 + (y1 - y0) * t);
        }
    }
}

/// Fills one parcel's rows, given in table order.
pub fn fill_parcel(rows: &mut [FeatureRow]) {
    for field in 0..Environment::FIELDS.len() {
        let mut column: Vec<Option<f64>> = rows.iter().map(|r| r.environment.get(field)).collect();
        carry_fill(&mut column);
        for (row, value) in rows.iter_mut().zip(column) {
            row.environment.set(field, value);
        }
    }

    let mut estimates: Vec<Option<f64>> = rows.iter().map(|r| r.rendement_estime).collect();
    interpolate_linear(&mut estimates);
    let mut progress: Vec<Option<f64>> = rows.iter().map(|r| r.progression).collect();
    interpolate_linear(&mut progress);
    for ((row, estimate), progression) in rows.iter_mut().zip(estimates).zip(progress) {
        row.rendement_estime = estimate;
        row.progression = progression;
    }

    for row in rows.iter_mut() {
        row.rendement_final.get_or_insert(0.0);
    }
}

/// Partition, fill each parcel independently, and reassemble in the input
/// row order.
pub fn fill_gaps(table: FeatureTable) -> FeatureTable {
    let partitions = partition_by_parcel(&table);
    debug!("Gap filling {} parcel(s)", partitions.len());

    let mut slots: Vec<Option<FeatureRow>> = table.into_iter().map(Some).collect();
    let mut jobs: Vec<(Vec<usize>, Vec<FeatureRow>)> = partitions
        .into_iter()
        .map(|(_, positions)| {
            let rows = positions
                .iter()
                .filter_map(|&i| slots[i].take())
                .collect();
            (positions, rows)
        })
        .collect();

    jobs.par_iter_mut().for_each(|(_, rows)| fill_parcel(rows));

    for (positions, rows) in jobs {
        for (i, row) in positions.into_iter().zip(rows) {
            slots[i] = Some(row);
        }
    }

    let filled: FeatureTable = slots.into_iter().flatten().collect();
    let still_null = filled
        .iter()
        .filter(|r| (0..Environment::FIELDS.len()).any(|f| r.environment.get(f).is_none()))
        .count();
    if still_null > 0 {
        info!(
            "{} row(s) keep null environmental readings (parcel has no observation for the column)",
            still_null
        );
    }
    filled
}
