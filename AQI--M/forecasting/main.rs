use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use shared_event_bus::FileEventPublisher;
use shared_logging::LogLevel;

use crate::{
    baseline::StatisticalPredictor,
    config::ForecastConfig,
    error::{ForecastError, ForecastResult},
    persistence::{FileModelStore, ModelStore},
    predictor::{self, Prediction},
    snapshot::{ModelMetadata, ModelSnapshot},
    telemetry::ForecastTelemetry,
    trainer::{Trainer, TrainingResult},
};

/// Module name stamped on forecaster logs and events.
pub const TELEMETRY_MODULE: &str = "aqi.forecast";

/// Which path [`AqiForecaster::initialize`] took.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InitOutcome {
    /// A persisted model was restored; no training ran.
    Loaded,
    /// Nothing usable was stored, so a model was trained on the supplied history.
    Trained(TrainingResult),
}

/// Owns the current model snapshot and coordinates training, persistence and prediction.
///
/// Predictions clone the published `Arc<ModelSnapshot>` and never block on training;
/// training builds a complete replacement, persists it, then swaps the pointer.
#[derive(Debug)]
pub struct AqiForecaster {
    config: ForecastConfig,
    store: Arc<dyn ModelStore>,
    current: RwLock<Option<Arc<ModelSnapshot>>>,
    writer: Mutex<()>,
    baseline: StatisticalPredictor,
    telemetry: Option<ForecastTelemetry>,
}

impl AqiForecaster {
    /// Creates a forecaster with no model in memory.
    #[must_use]
    pub fn new(config: ForecastConfig, store: Arc<dyn ModelStore>) -> Self {
        Self {
            config,
            store,
            current: RwLock::new(None),
            writer: Mutex::new(()),
            baseline: StatisticalPredictor::default(),
            telemetry: None,
        }
    }

    /// File-backed forecaster with telemetry sinks taken from `config`.
    pub fn from_config(config: ForecastConfig) -> Result<Self> {
        config.validate().context("invalid forecast configuration")?;
        let store = Arc::new(FileModelStore::new(&config.storage.model_path));
        let telemetry = build_telemetry(&config)?;
        let forecaster = Self::new(config, store);
        Ok(match telemetry {
            Some(telemetry) => forecaster.with_telemetry(telemetry),
            None => forecaster,
        })
    }

    /// Attaches a telemetry handle.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: ForecastTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Currently published snapshot, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<ModelSnapshot>> {
        self.current.read().clone()
    }

    /// Metadata of the current model.
    #[must_use]
    pub fn metadata(&self) -> Option<ModelMetadata> {
        self.current.read().as_ref().map(|s| s.metadata.clone())
    }

    /// Restores the stored model. Unreadable or corrupt records count as "no model".
    pub fn load(&self) -> bool {
        let _writer = self.writer.lock();
        self.load_locked()
    }

    /// Loads the stored model, or trains on `history` when there is none.
    pub fn initialize(&self, history: &[f64]) -> ForecastResult<InitOutcome> {
        let _writer = self.writer.lock();
        if self.load_locked() {
            return Ok(InitOutcome::Loaded);
        }
        self.train_locked(history).map(InitOutcome::Trained)
    }

    /// Retrains from scratch on `series` and replaces the stored and in-memory model.
    ///
    /// The new snapshot is published only after it has been saved; a failed save leaves
    /// the previous model in place and is returned as [`ForecastError::Storage`].
    pub fn train(&self, series: &[f64]) -> ForecastResult<TrainingResult> {
        let _writer = self.writer.lock();
        self.train_locked(series)
    }

    /// Forecasts the next reading from `recent_window`.
    ///
    /// Falls back to the stored model when nothing is in memory yet.
    pub fn predict(&self, recent_window: &[f64]) -> ForecastResult<Prediction> {
        let snapshot = match self.snapshot() {
            Some(snapshot) => snapshot,
            None if self.load() => self.snapshot().ok_or(ForecastError::ModelNotInitialized)?,
            None => return Err(ForecastError::ModelNotInitialized),
        };
        let prediction = predictor::predict(&snapshot, recent_window)?;
        let payload = json!({
            "model_id": snapshot.id,
            "predicted_aqi": prediction.predicted_aqi,
            "confidence": prediction.confidence,
            "trend": prediction.trend,
            "category": prediction.category,
        });
        self.log(LogLevel::Info, "aqi.prediction.issued", payload.clone());
        self.event("aqi.prediction.issued", payload);
        Ok(prediction)
    }

    /// Model prediction, or the statistical baseline when the model cannot answer.
    ///
    /// When even the baseline rejects the window, the last finite reading is returned
    /// with floor confidence.
    pub fn predict_or_fallback(&self, recent_window: &[f64]) -> Prediction {
        match self.predict(recent_window) {
            Ok(prediction) => prediction,
            Err(err) => {
                self.log(
                    LogLevel::Warn,
                    "aqi.prediction.fallback",
                    json!({ "error": err.to_string(), "window": recent_window.len() }),
                );
                self.baseline
                    .predict(recent_window)
                    .unwrap_or_else(|_| StatisticalPredictor::last_known(recent_window))
            }
        }
    }

    /// Deletes the stored model and forgets the in-memory one.
    pub fn reset(&self) -> ForecastResult<()> {
        let _writer = self.writer.lock();
        self.store.clear()?;
        *self.current.write() = None;
        self.log(LogLevel::Info, "aqi.model.reset", Value::Null);
        Ok(())
    }

    fn load_locked(&self) -> bool {
        match self.store.load() {
            Ok(Some(snapshot)) => {
                let payload = json!({
                    "model_id": snapshot.id,
                    "trained_at": snapshot.metadata.trained_at,
                    "lookback": snapshot.metadata.window.lookback,
                });
                if snapshot.metadata.window != self.config.window {
                    self.log(
                        LogLevel::Warn,
                        "aqi.model.window_mismatch",
                        json!({
                            "stored_lookback": snapshot.metadata.window.lookback,
                            "configured_lookback": self.config.window.lookback,
                        }),
                    );
                }
                *self.current.write() = Some(Arc::new(snapshot));
                self.log(LogLevel::Info, "aqi.model.loaded", payload.clone());
                self.event("aqi.model.loaded", payload);
                true
            }
            Ok(None) => {
                self.log(LogLevel::Info, "aqi.model.absent", Value::Null);
                false
            }
            Err(err) => {
                let payload = json!({ "error": err.to_string() });
                self.log(LogLevel::Warn, "aqi.model.load_failed", payload.clone());
                self.event("aqi.model.load_failed", payload);
                false
            }
        }
    }

    fn train_locked(&self, series: &[f64]) -> ForecastResult<TrainingResult> {
        let training = &self.config.training;
        self.log(
            LogLevel::Info,
            "aqi.training.started",
            json!({
                "samples": series.len(),
                "epochs": training.epochs,
                "lookback": self.config.window.lookback,
            }),
        );
        let trainer = Trainer::new(self.config.window, training.clone());
        let outcome = trainer.fit(series).map_err(|err| {
            self.log(
                LogLevel::Warn,
                "aqi.training.rejected",
                json!({ "error": err.to_string() }),
            );
            err
        })?;
        for epoch in &outcome.history {
            self.log(
                LogLevel::Debug,
                "aqi.training.epoch",
                json!({ "epoch": epoch.epoch, "train_loss": epoch.loss, "val_loss": epoch.val_loss }),
            );
        }

        self.store.save(&outcome.snapshot).map_err(|err| {
            self.log(
                LogLevel::Error,
                "aqi.model.save_failed",
                json!({ "error": err.to_string() }),
            );
            ForecastError::from(err)
        })?;

        let result = outcome.result();
        let payload = json!({
            "model_id": outcome.snapshot.id,
            "samples": outcome.snapshot.metadata.samples,
            "train_loss": result.last_loss,
            "val_loss": result.last_validation_loss,
        });
        *self.current.write() = Some(Arc::new(outcome.snapshot));
        self.log(LogLevel::Info, "aqi.model.trained", payload.clone());
        self.event("aqi.model.trained", payload);
        Ok(result)
    }

    fn log(&self, level: LogLevel, message: &str, metadata: Value) {
        if let Some(tel) = &self.telemetry {
            if let Err(err) = tel.log(level, message, metadata) {
                eprintln!("forecast log write failed: {err:?}");
            }
        }
    }

    fn event(&self, event_type: &str, payload: Value) {
        if let Some(tel) = &self.telemetry {
            if let Err(err) = tel.event(event_type, payload) {
                eprintln!("forecast event publish failed: {err:?}");
            }
        }
    }
}

fn build_telemetry(config: &ForecastConfig) -> Result<Option<ForecastTelemetry>> {
    let sinks = &config.telemetry;
    if sinks.log_path.is_none() && sinks.event_log.is_none() {
        return Ok(None);
    }
    let mut builder = ForecastTelemetry::builder(TELEMETRY_MODULE);
    if let Some(path) = &sinks.log_path {
        builder = builder.log_path(path);
    }
    if let Some(path) = &sinks.event_log {
        let publisher = FileEventPublisher::new(path)
            .with_context(|| format!("opening event log {}", path.display()))?;
        builder = builder.event_publisher(Arc::new(publisher));
    }
    builder.build().map(Some)
}
