//! Preconditions checked at the boundary of each computation.
//!
//! Each check returns a typed [`AnalysisError`] naming the violated condition;
//! nothing is silently dropped or defaulted here.

use crate::errors::AnalysisError;
use crate::models::{FeatureRow, SoilRecord};

/// Fails if any row has no value in `column`.
pub fn require_no_nulls<F>(rows: &[FeatureRow], column: &str, value: F) -> Result<(), AnalysisError>
where
    F: Fn(&FeatureRow) -> Option<f64>,
{
    let count = rows.iter().filter(|r| value(r).is_none()).count();
    if count > 0 {
        Err(AnalysisError::NullValues {
            column: column.to_string(),
            count,
        })
    } else {
        Ok(())
    }
}

/// Every soil record must name its parcel and carry a water retention capacity.
pub fn require_complete_soil(soil: &[SoilRecord]) -> Result<(), AnalysisError> {
    let missing_id = soil.iter().filter(|s| s.parcelle_id.is_none()).count();
    if missing_id > 0 {
        return Err(AnalysisError::IncompleteSoilData {
            column: "parcelle_id".to_string(),
            count: missing_id,
        });
    }
    let missing_retention = soil
        .iter()
        .filter(|s| s.capacite_retention_eau.is_none())
        .count();
    if missing_retention > 0 {
        return Err(AnalysisError::IncompleteSoilData {
            column: "capacite_retention_eau".to_string(),
            count: missing_retention,
        });
    }
    Ok(())
}
