use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{error::ForecastResult, trainer::TrainingConfig, windower::WindowConfig};

/// Where the trained model lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON document holding parameters and metadata.
    pub model_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("aqi-model.json"),
        }
    }
}

/// Optional structured log and event sinks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// JSON-lines log file.
    pub log_path: Option<PathBuf>,
    /// JSON-lines event log.
    pub event_log: Option<PathBuf>,
}

/// Complete forecaster configuration. Every section is optional in TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Window geometry.
    pub window: WindowConfig,
    /// Training hyperparameters.
    pub training: TrainingConfig,
    /// Model storage.
    pub storage: StorageConfig,
    /// Logging and events.
    pub telemetry: TelemetryConfig,
}

impl ForecastConfig {
    /// Loads and validates a TOML file. Relative paths resolve against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading forecast config {}", path.display()))?;
        let mut config: Self =
            toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("validating {}", path.display()))?;
        let base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.resolve_paths(&base);
        Ok(config)
    }

    /// Checks window and training sections.
    pub fn validate(&self) -> ForecastResult<()> {
        self.window.validate()?;
        self.training.validate()
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |candidate: &mut PathBuf| {
            if candidate.is_relative() {
                *candidate = base.join(&*candidate);
            }
        };
        resolve(&mut self.storage.model_path);
        if let Some(path) = self.telemetry.log_path.as_mut() {
            resolve(path);
        }
        if let Some(path) = self.telemetry.event_log.as_mut() {
            resolve(path);
        }
    }
}
