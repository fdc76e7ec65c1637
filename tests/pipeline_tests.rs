use approx::assert_relative_eq;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use parcel_insights::models::{
    Environment, FeatureColumn, MonitoringRecord, SoilRecord, SourceTables, WeatherRecord,
    YieldHistoryRecord,
};
use parcel_insights::{AnalysisError, DataManager, PipelineConfig};

const PARCELS: [(&str, f64); 4] = [("P1", 0.2), ("P2", 0.4), ("P3", 0.6), ("P4", 0.8)];

fn day(offset: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2021, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::days(offset)
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
}

/// Four parcels observed daily over 2021 with the same stress curve, uniform
/// weather, and soil retention as the only difference between them.
fn year_of_data() -> SourceTables {
    let mut monitoring = Vec::new();
    for offset in 0..365 {
        for (i, (id, _)) in PARCELS.iter().enumerate() {
            monitoring.push(MonitoringRecord {
                date: day(offset),
                parcelle_id: id.to_string(),
                latitude: Some(33.0 + i as f64),
                longitude: Some(-5.0),
                ndvi: Some(0.5),
                stress_hydrique: Some(0.3 + 0.1 * ((offset % 7) as f64 / 7.0)),
                environment: Environment::default(),
                // Gaps on odd days, interpolated by the gap filler.
                rendement_estime: if offset % 2 == 0 { Some(offset as f64) } else { None },
                progression: Some(offset as f64 / 364.0),
                culture: Some("Blé".to_string()),
            });
        }
    }

    let weather = (0..365)
        .map(|offset| WeatherRecord {
            date: day(offset),
            environment: Environment {
                temperature: Some(20.0),
                humidite: Some(55.0),
                precipitation: Some(0.0),
                rayonnement_solaire: Some(300.0),
                vitesse_vent: Some(3.0),
                direction_vent: Some(180.0),
            },
            latitude: None,
            longitude: None,
        })
        .collect();

    let soil = PARCELS
        .iter()
        .enumerate()
        .map(|(i, (id, retention))| SoilRecord {
            parcelle_id: Some(id.to_string()),
            latitude: Some(33.0 + i as f64),
            longitude: Some(-5.0),
            capacite_retention_eau: Some(*retention),
            ..Default::default()
        })
        .collect();

    let mut yield_history = Vec::new();
    for (id, _) in PARCELS.iter() {
        yield_history.push(YieldHistoryRecord {
            date: ymd(2021, 3, 1),
            parcelle_id: id.to_string(),
            rendement_final: 3.0,
            culture: None,
        });
        yield_history.push(YieldHistoryRecord {
            date: ymd(2021, 9, 1),
            parcelle_id: id.to_string(),
            rendement_final: 5.0,
            culture: Some("Orge".to_string()),
        });
    }

    SourceTables {
        monitoring,
        weather,
        soil,
        yield_history,
    }
}

fn manager() -> DataManager {
    DataManager::from_tables(PipelineConfig::default(), year_of_data())
}

#[test]
fn test_year_of_data_is_consistent() {
    let report = manager().verify_temporal_consistency();
    assert!(report.monitoring_weather_consistent);
    assert!(report.yield_within_monitoring);
    assert!(report.monitoring_complete());
}

#[test]
fn test_feature_table_shape_and_fill() {
    let dm = manager();
    let features = dm.prepare_features();

    assert_eq!(features.len(), 4 * 365);
    assert!(features.windows(2).all(|w| w[0].date <= w[1].date));

    for row in &features {
        assert_eq!(row.environment.temperature, Some(20.0));
        assert_eq!(row.environment.direction_vent, Some(180.0));
        assert!(row.capacite_retention_eau().is_some());
        assert!(row.rendement_estime.is_some());
        let harvested = row.date == ymd(2021, 3, 1) || row.date == ymd(2021, 9, 1);
        if harvested {
            assert_ne!(row.rendement_final, Some(0.0));
        } else {
            assert_eq!(row.rendement_final, Some(0.0));
        }
    }

    // Odd days sit halfway between their even neighbours.
    let p1_day_3 = features
        .iter()
        .find(|r| r.parcelle_id == "P1" && r.date == day(3))
        .unwrap();
    assert_relative_eq!(p1_day_3.rendement_estime.unwrap(), 3.0);

    let p2_harvest = features
        .iter()
        .find(|r| r.parcelle_id == "P2" && r.date == ymd(2021, 9, 1))
        .unwrap();
    assert_eq!(p2_harvest.rendement_final, Some(5.0));
    assert_eq!(p2_harvest.culture.as_deref(), Some("Orge"));
}

#[test]
fn test_lowest_retention_has_highest_risk() {
    let dm = manager();
    let features = dm.prepare_features();
    let risk = dm.calculate_risk_metrics(&features).unwrap();

    assert_eq!(risk.len(), 4);
    let ids: Vec<&str> = risk.iter().map(|m| m.parcelle_id.as_str()).collect();
    assert_eq!(ids, vec!["P1", "P2", "P3", "P4"]);

    for pair in risk.windows(2) {
        assert!(pair[0].risk_score > pair[1].risk_score);
        assert_relative_eq!(pair[0].risk_score - pair[1].risk_score, 0.2 * 0.2, epsilon = 1e-9);
        assert_relative_eq!(pair[0].mean_stress, pair[1].mean_stress, epsilon = 1e-12);
    }
    assert_relative_eq!(risk[0].mean_temperature, 20.0);

    let locations = dm.risk_locations(&risk);
    assert_eq!(locations.len(), 4);
    assert_eq!(locations[3].latitude, 36.0);
}

#[test]
fn test_null_stress_blocks_risk_metrics() {
    let mut sources = year_of_data();
    sources.monitoring[10].stress_hydrique = None;
    let dm = DataManager::from_tables(PipelineConfig::default(), sources);

    let features = dm.prepare_features();
    let err = dm.calculate_risk_metrics(&features).unwrap_err();
    assert_eq!(
        err,
        AnalysisError::NullValues {
            column: "stress_hydrique".to_string(),
            count: 1
        }
    );
}

#[test]
fn test_monthly_patterns_for_one_parcel() {
    let dm = manager();
    let features = dm.prepare_features();
    let months = dm.temporal_patterns(&features, "P3").unwrap();

    assert_eq!(months.len(), 12);
    assert_eq!(months[0].month, NaiveDate::from_ymd_opt(2021, 1, 31).unwrap());
    assert_eq!(months[11].month, NaiveDate::from_ymd_opt(2021, 12, 31).unwrap());

    let january = months[0].get(FeatureColumn::Temperature).unwrap();
    assert_eq!(january.count, 31);
    assert_relative_eq!(january.mean.unwrap(), 20.0);
    assert_relative_eq!(january.std.unwrap(), 0.0);

    assert!(matches!(
        dm.temporal_patterns(&features, "P404"),
        Err(AnalysisError::NoParcelData { .. })
    ));
}

#[test]
fn test_yield_decomposition() {
    let dm = manager();
    let decomposed = dm.analyze_yield_patterns("P1").unwrap();
    assert_eq!(decomposed.observed, vec![3.0, 5.0]);
    assert_eq!(decomposed.trend, vec![Some(3.0), Some(5.0)]);
    assert_eq!(decomposed.seasonal, vec![0.0, 0.0]);

    let mut sources = year_of_data();
    sources.yield_history.retain(|r| r.parcelle_id != "P2" || r.date == ymd(2021, 9, 1));
    let dm = DataManager::from_tables(PipelineConfig::default(), sources);
    assert_eq!(
        dm.analyze_yield_patterns("P2").unwrap_err(),
        AnalysisError::InsufficientObservations { needed: 2, found: 1 }
    );
}

#[test]
fn test_summaries_for_map_views() {
    let dm = manager();
    assert_eq!(dm.parcel_ids(), vec!["P1", "P2", "P3", "P4"]);

    let summaries = dm.parcel_yield_summaries();
    assert_eq!(summaries.len(), 4);
    for s in &summaries {
        assert!(s.has_history);
        assert_relative_eq!(s.mean_rendement_final, 4.0);
    }
}
