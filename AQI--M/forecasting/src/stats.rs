use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, ForecastResult};

/// Lowest valid AQI reading.
pub const MIN_AQI: f64 = 0.0;
/// Highest valid AQI reading.
pub const MAX_AQI: f64 = 500.0;

/// Checks that a series is non-empty and every value is a finite AQI in `[0, 500]`.
pub fn validate_series(values: &[f64]) -> ForecastResult<()> {
    if values.is_empty() {
        return Err(ForecastError::InvalidInput("series is empty".into()));
    }
    if let Some((idx, value)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(ForecastError::InvalidInput(format!(
            "value {value} at index {idx} is not finite"
        )));
    }
    if let Some((idx, value)) = values
        .iter()
        .enumerate()
        .find(|(_, v)| !(MIN_AQI..=MAX_AQI).contains(*v))
    {
        return Err(ForecastError::InvalidInput(format!(
            "value {value} at index {idx} is outside the AQI range [{MIN_AQI}, {MAX_AQI}]"
        )));
    }
    Ok(())
}

/// Summary statistics of a training series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesStatistics {
    /// Arithmetic mean.
    pub mean: f64,
    /// Population standard deviation (divides by N).
    pub std_dev: f64,
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
}

impl SeriesStatistics {
    /// Computes statistics over a non-empty sample.
    ///
    /// A zero standard deviation is returned as-is; normalization rejects it.
    pub fn compute(values: &[f64]) -> ForecastResult<Self> {
        if values.is_empty() {
            return Err(ForecastError::InvalidInput(
                "cannot compute statistics of an empty series".into(),
            ));
        }
        let mean = mean(values);
        let variance =
            values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / values.len() as f64;
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
                (lo.min(x), hi.max(x))
            });
        Ok(Self {
            mean,
            std_dev: variance.sqrt(),
            min,
            max,
        })
    }

    /// True when the sample has no spread (or the spread is not a usable number).
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        !(self.std_dev.is_finite() && self.std_dev > 0.0)
    }

    /// `std_dev / mean`, capped at 1. A zero mean counts as fully volatile unless the
    /// sample is flat.
    #[must_use]
    pub fn variability(&self) -> f64 {
        if self.mean <= f64::EPSILON {
            return if self.std_dev > 0.0 { 1.0 } else { 0.0 };
        }
        (self.std_dev / self.mean).min(1.0)
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
