use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use parcel_insights::config::{load_config, PipelineConfig};
use parcel_insights::export::{
    decomposition_file, export_to_file, monthly_stats_file, write_decomposition, write_features,
    write_monthly_stats, write_risk_metrics, FEATURES_FILE, RISK_FILE,
};
use parcel_insights::metrics::METRICS;
use parcel_insights::{AnalysisError, DataManager};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Parcel feature preparation and risk analysis", long_about = None)]
struct Cli {
    /// JSON configuration file; defaults apply when omitted
    #[clap(long, value_parser)]
    config: Option<PathBuf>,
    /// Directory holding the four source CSV files
    #[clap(long, env = "PARCEL_DATA_DIR")]
    data_dir: Option<PathBuf>,
    #[clap(long, default_value = "output")]
    output_dir: PathBuf,
    /// Parcel to analyse in depth (monthly stats and yield decomposition); repeatable
    #[clap(long = "parcel")]
    parcels: Vec<String>,
    /// Log the stage metrics summary at the end of the run
    #[clap(long)]
    metrics: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?,
        None => PipelineConfig::default(),
    };
    config = config
        .apply_env()
        .context("Invalid environment configuration")?;
    if let Some(dir) = &cli.data_dir {
        config = config.with_data_dir(dir);
    }
    info!("Monitoring: {:?}", config.monitoring_path);
    info!("Weather: {:?}", config.weather_path);
    info!("Soil: {:?}", config.soil_path);
    info!("Yield history: {:?}", config.yield_history_path);
    info!("Output dir: {:?}", cli.output_dir);

    let manager = DataManager::load(config).context("Failed to load source tables")?;

    let features = manager.prepare_features();
    export_to_file(&cli.output_dir.join(FEATURES_FILE), |w| write_features(w, &features))?;

    match manager.calculate_risk_metrics(&features) {
        Ok(risk) => {
            for m in &risk {
                info!("Parcel {}: risk score {:.4}", m.parcelle_id, m.risk_score);
            }
            export_to_file(&cli.output_dir.join(RISK_FILE), |w| write_risk_metrics(w, &risk))?;
        }
        Err(e) => warn!("Risk metrics not computed: {}", e),
    }

    for parcel in &cli.parcels {
        let monthly = manager
            .temporal_patterns(&features, parcel)
            .with_context(|| format!("Monthly statistics failed for parcel {}", parcel))?;
        export_to_file(&cli.output_dir.join(monthly_stats_file(parcel)), |w| {
            write_monthly_stats(w, parcel, &monthly)
        })?;

        match manager.analyze_yield_patterns(parcel) {
            Ok(decomposed) => export_to_file(&cli.output_dir.join(decomposition_file(parcel)), |w| {
                write_decomposition(w, &decomposed)
            })?,
            Err(e @ AnalysisError::InsufficientObservations { .. })
            | Err(e @ AnalysisError::NoYieldHistory { .. }) => {
                warn!("Yield decomposition skipped for parcel {}: {}", parcel, e)
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Yield decomposition failed for parcel {}", parcel))
            }
        }
    }

    if cli.metrics {
        METRICS.lock().log_summary();
    }
    info!("Done");
    Ok(())
}
