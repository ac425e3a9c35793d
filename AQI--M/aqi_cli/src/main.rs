use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use aqi_forecasting::{AqiForecaster, ForecastConfig, InitOutcome};
use chrono::Local;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::json;

#[derive(Parser, Debug)]
#[command(name = "aqi", version, about = "Short-horizon AQI forecaster")]
struct Cli {
    /// TOML configuration; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Overrides `storage.model_path`.
    #[arg(long, global = true)]
    model: Option<PathBuf>,
    /// Overrides `telemetry.event_log`.
    #[arg(long, global = true)]
    event_log: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Retrains the model on a series of readings.
    Train {
        /// JSON array of readings, oldest first.
        #[arg(long)]
        series: PathBuf,
    },
    /// Forecasts the next reading.
    Predict {
        /// JSON array of the most recent readings, oldest first.
        #[arg(long)]
        window: PathBuf,
        /// Use the statistical baseline when the model cannot answer.
        #[arg(long)]
        fallback: bool,
    },
    /// Loads the stored model, training on the series only when none exists.
    Init {
        /// History to train on when no model is stored.
        #[arg(long)]
        series: PathBuf,
    },
    /// Shows metadata of the stored model.
    Status,
    /// Deletes the stored model.
    Reset,
}

/// Readings as a bare array or wrapped in `{ "readings": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SeriesFile {
    Bare(Vec<f64>),
    Wrapped { readings: Vec<f64> },
}

impl SeriesFile {
    fn into_readings(self) -> Vec<f64> {
        match self {
            Self::Bare(readings) | Self::Wrapped { readings } => readings,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let forecaster = AqiForecaster::from_config(resolve_config(&cli)?)?;
    match cli.command {
        Commands::Train { series } => {
            let readings = read_series(&series)?;
            let result = forecaster
                .train(&readings)
                .with_context(|| format!("training on {}", series.display()))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Predict { window, fallback } => {
            let readings = read_series(&window)?;
            let prediction = if fallback {
                forecaster.predict_or_fallback(&readings)
            } else {
                forecaster.predict(&readings)?
            };
            println!("{}", serde_json::to_string_pretty(&prediction)?);
        }
        Commands::Init { series } => {
            let readings = read_series(&series)?;
            let report = match forecaster.initialize(&readings)? {
                InitOutcome::Loaded => json!({ "outcome": "loaded" }),
                InitOutcome::Trained(result) => json!({ "outcome": "trained", "result": result }),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Status => {
            forecaster.load();
            match forecaster.snapshot() {
                Some(snapshot) => {
                    let trained = snapshot.metadata.trained_at.with_timezone(&Local);
                    eprintln!(
                        "model {} trained {}",
                        snapshot.id,
                        trained.format("%Y-%m-%d %H:%M:%S")
                    );
                    println!("{}", serde_json::to_string_pretty(&snapshot.metadata)?);
                }
                None => println!(
                    "no model at {}",
                    forecaster.config().storage.model_path.display()
                ),
            }
        }
        Commands::Reset => {
            forecaster.reset()?;
            println!(
                "removed {}",
                forecaster.config().storage.model_path.display()
            );
        }
    }
    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<ForecastConfig> {
    let mut config = match &cli.config {
        Some(path) => ForecastConfig::load(path)?,
        None => ForecastConfig::default(),
    };
    if let Some(model) = &cli.model {
        config.storage.model_path.clone_from(model);
    }
    if let Some(event_log) = &cli.event_log {
        config.telemetry.event_log = Some(event_log.clone());
    }
    Ok(config)
}

fn read_series(path: &Path) -> Result<Vec<f64>> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading series {}", path.display()))?;
    let parsed: SeriesFile = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of readings", path.display()))?;
    Ok(parsed.into_readings())
}
