#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rust_2018_idioms,
    missing_docs
)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::module_name_repetitions
)]

//! Short-horizon AQI forecasting: a small MLP over normalized lookback windows,
//! with trend and confidence scoring, a statistical baseline and durable model storage.

/// Lifecycle logging and events for the forecaster.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// Error taxonomy shared by every component.
pub mod error;

/// Series validation and summary statistics.
pub mod stats;

/// Z-score normalization.
pub mod normalizer;

/// Sliding-window sample construction.
pub mod windower;

/// Dense feed-forward network.
pub mod model;

/// Trained parameters bundled with their metadata.
pub mod snapshot;

/// Mini-batch SGD training.
pub mod trainer;

/// Model inference, trend and confidence scoring.
pub mod predictor;

/// Model-free weighted moving average forecaster.
pub mod baseline;

/// Durable model storage.
pub mod persistence;

/// TOML configuration.
pub mod config;

/// Forecaster orchestrating training, storage and prediction.
#[path = "../main.rs"]
pub mod orchestration_entry;

pub use baseline::StatisticalPredictor;
pub use config::{ForecastConfig, StorageConfig, TelemetryConfig};
pub use error::{ForecastError, ForecastResult};
pub use model::AqiNetwork;
pub use orchestration_entry::{AqiForecaster, InitOutcome};
pub use persistence::{FileModelStore, MemoryModelStore, ModelStore, StoreError};
pub use predictor::{AqiCategory, Prediction, Trend};
pub use snapshot::{ModelMetadata, ModelSnapshot};
pub use stats::SeriesStatistics;
pub use telemetry::{ForecastTelemetry, ForecastTelemetryBuilder};
pub use trainer::{Trainer, TrainingConfig, TrainingResult};
pub use windower::WindowConfig;
