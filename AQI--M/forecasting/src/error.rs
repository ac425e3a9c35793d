use thiserror::Error;

use crate::persistence::StoreError;

/// Errors surfaced by the forecasting core.
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Empty series, or values that are non-finite or outside `[0, 500]`.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Standard deviation is zero, so z-scores cannot be computed.
    #[error("degenerate distribution: standard deviation is zero")]
    DegenerateDistribution,
    /// Too few observations to build a single training window.
    #[error("insufficient data: training needs at least {required} observations, got {actual}")]
    InsufficientData {
        /// Minimum series length (`lookback + horizon`).
        required: usize,
        /// Length that was supplied.
        actual: usize,
    },
    /// Too few observations to run inference.
    #[error("insufficient window: prediction needs at least {required} observations, got {actual}")]
    InsufficientWindow {
        /// Minimum window length (`lookback`).
        required: usize,
        /// Length that was supplied.
        actual: usize,
    },
    /// No model in memory or storage.
    #[error("model not initialized: train or load a model before predicting")]
    ModelNotInitialized,
    /// Training or inference produced NaN/Infinity.
    #[error("numeric failure: {0}")]
    NonFinite(String),
    /// Persisting a trained model failed.
    #[error("model storage failed: {0}")]
    Storage(#[from] StoreError),
    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result alias used throughout the crate.
pub type ForecastResult<T> = Result<T, ForecastError>;
