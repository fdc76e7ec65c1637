//! Time indices over the dated sources and the cross-source consistency report.
//!
//! Nothing here mutates data or fails: mismatches between independently
//! collected feeds are expected and only reported.

use crate::models::{MonitoringRecord, WeatherRecord, YieldHistoryRecord};
use chrono::{NaiveDate, NaiveDateTime};
use log::{info, warn};
use std::collections::BTreeSet;
use std::fmt;

/// Sorted timestamps of one source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeIndex {
    dates: Vec<NaiveDateTime>,
}

impl TimeIndex {
    pub fn new(mut dates: Vec<NaiveDateTime>) -> Self {
        dates.sort();
        Self { dates }
    }

    pub fn range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        match (self.dates.first(), self.dates.last()) {
            (Some(first), Some(last)) => Some((*first, *last)),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Calendar days between the first and last entry with no entry at all.
    pub fn missing_days(&self) -> Vec<NaiveDate> {
        let Some((first, last)) = self.range() else {
            return Vec::new();
        };
        let present: BTreeSet<NaiveDate> = self.dates.iter().map(|d| d.date()).collect();
        first
            .date()
            .iter_days()
            .take_while(|d| *d <= last.date())
            .filter(|d| !present.contains(d))
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TemporalIndices {
    pub monitoring: TimeIndex,
    pub weather: TimeIndex,
    pub yield_history: TimeIndex,
}

impl TemporalIndices {
    pub fn build(
        monitoring: &[MonitoringRecord],
        weather: &[WeatherRecord],
        yield_history: &[YieldHistoryRecord],
    ) -> Self {
        Self {
            monitoring: TimeIndex::new(monitoring.iter().map(|r| r.date).collect()),
            weather: TimeIndex::new(weather.iter().map(|r| r.date).collect()),
            yield_history: TimeIndex::new(yield_history.iter().map(|r| r.date).collect()),
        }
    }

    pub fn verify(&self, tolerance_days: i64) -> ConsistencyReport {
        let monitoring_range = self.monitoring.range();
        let weather_range = self.weather.range();
        let yield_range = self.yield_history.range();

        // Compared in whole calendar days, ignoring time of day.
        let within = |a: NaiveDateTime, b: NaiveDateTime| {
            (a.date() - b.date()).num_days().abs() <= tolerance_days
        };

        let monitoring_weather_consistent = match (monitoring_range, weather_range) {
            (Some((m_start, m_end)), Some((w_start, w_end))) => {
                within(m_start, w_start) && within(m_end, w_end)
            }
            _ => false,
        };

        let yield_within_monitoring = match (monitoring_range, yield_range) {
            (Some((m_start, m_end)), Some((y_start, y_end))) => y_start >= m_start && y_end <= m_end,
            _ => false,
        };

        ConsistencyReport {
            monitoring_range,
            weather_range,
            yield_range,
            monitoring_weather_consistent,
            yield_within_monitoring,
            missing_monitoring_days: self.monitoring.missing_days(),
        }
    }
}

/// Outcome of the three consistency checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsistencyReport {
    pub monitoring_range: Option<(NaiveDateTime, NaiveDateTime)>,
    pub weather_range: Option<(NaiveDateTime, NaiveDateTime)>,
    pub yield_range: Option<(NaiveDateTime, NaiveDateTime)>,
    pub monitoring_weather_consistent: bool,
    pub yield_within_monitoring: bool,
    pub missing_monitoring_days: Vec<NaiveDate>,
}

pub const OK: &str = "   → OK";
pub const INCONSISTENT: &str = "   → Incohérence détectée";

impl ConsistencyReport {
    pub fn monitoring_complete(&self) -> bool {
        self.monitoring_range.is_some() && self.missing_monitoring_days.is_empty()
    }

    pub fn is_consistent(&self) -> bool {
        self.monitoring_weather_consistent && self.yield_within_monitoring && self.monitoring_complete()
    }

    pub fn lines(&self) -> Vec<String> {
        vec![
            "===== Vérification de la cohérence temporelle =====".to_string(),
            format!("Période de monitoring : {}", fmt_range(self.monitoring_range)),
            format!("Période météo         : {}", fmt_range(self.weather_range)),
            format!("Période des rendements: {}", fmt_range(self.yield_range)),
            String::new(),
            "1. Cohérence entre monitoring et météo:".to_string(),
            if self.monitoring_weather_consistent {
                OK.to_string()
            } else {
                INCONSISTENT.to_string()
            },
            String::new(),
            "2. Cohérence entre rendements et monitoring:".to_string(),
            if self.yield_within_monitoring {
                OK.to_string()
            } else {
                format!("{INCONSISTENT} : La période des rendements dépasse celle du monitoring")
            },
            String::new(),
            "3. Vérification des dates manquantes dans le monitoring:".to_string(),
            if self.monitoring_complete() {
                OK.to_string()
            } else {
                format!(
                    "   → Des dates manquent dans le jeu de données de monitoring ({} jour(s))",
                    self.missing_monitoring_days.len()
                )
            },
            String::new(),
            "===== Fin de la vérification =====".to_string(),
        ]
    }

    /// Emits the report through the logger, one warning per failed check.
    pub fn log(&self) {
        for line in self.lines() {
            info!("{}", line);
        }
        if !self.monitoring_weather_consistent {
            warn!("Monitoring and weather date ranges differ by more than the tolerance");
        }
        if !self.yield_within_monitoring {
            warn!("Yield history extends beyond the monitoring period");
        }
        if !self.monitoring_complete() {
            warn!(
                "Monitoring is missing {} calendar day(s)",
                self.missing_monitoring_days.len()
            );
        }
    }
}

impl fmt::Display for ConsistencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines().join("\n"))
    }
}

fn fmt_range(range: Option<(NaiveDateTime, NaiveDateTime)>) -> String {
    match range {
        Some((start, end)) => format!("({}, {})", start, end),
        None => "(aucune donnée)".to_string(),
    }
}
