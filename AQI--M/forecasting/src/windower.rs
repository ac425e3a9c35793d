use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, ForecastResult};

/// Default number of past observations per model input.
pub const DEFAULT_LOOKBACK: usize = 6;
/// Default forecast distance in steps.
pub const DEFAULT_HORIZON: usize = 1;

/// Window geometry shared by training and inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Observations per input window.
    pub lookback: usize,
    /// Steps between the end of a window and its target.
    pub horizon: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            lookback: DEFAULT_LOOKBACK,
            horizon: DEFAULT_HORIZON,
        }
    }
}

impl WindowConfig {
    /// Shortest series that yields one training pair.
    #[must_use]
    pub const fn min_series_len(&self) -> usize {
        self.lookback + self.horizon
    }

    /// Rejects zero-sized windows or horizons.
    pub fn validate(&self) -> ForecastResult<()> {
        if self.lookback == 0 {
            return Err(ForecastError::Config("window.lookback must be at least 1".into()));
        }
        if self.horizon == 0 {
            return Err(ForecastError::Config("window.horizon must be at least 1".into()));
        }
        Ok(())
    }
}

/// One supervised training pair.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSample {
    /// `lookback` consecutive values.
    pub window: Vec<f64>,
    /// Value `horizon` steps after the window ends.
    pub target: f64,
}

/// Slides a window over `series`. Too-short series simply yield no samples.
#[must_use]
pub fn make_windows(series: &[f64], config: WindowConfig) -> Vec<WindowSample> {
    let span = config.min_series_len();
    if config.lookback == 0 || series.len() < span {
        return Vec::new();
    }
    (0..=series.len() - span)
        .map(|start| WindowSample {
            window: series[start..start + config.lookback].to_vec(),
            target: series[start + span - 1],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_single_step_pairs() {
        let series: Vec<f64> = (0..10).map(f64::from).collect();
        let samples = make_windows(&series, WindowConfig::default());
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[0].window, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(samples[0].target, 6.0);
        assert_eq!(samples[3].target, 9.0);
    }

    #[test]
    fn horizon_skips_ahead() {
        let series: Vec<f64> = (0..10).map(f64::from).collect();
        let config = WindowConfig {
            lookback: 3,
            horizon: 2,
        };
        let samples = make_windows(&series, config);
        assert_eq!(samples.len(), 6);
        assert_eq!(samples[0].window, vec![0.0, 1.0, 2.0]);
        assert_eq!(samples[0].target, 4.0);
    }

    #[test]
    fn short_series_yields_nothing() {
        let config = WindowConfig::default();
        assert!(make_windows(&[1.0, 2.0, 3.0], config).is_empty());
        assert!(make_windows(&[0.0; 6], config).is_empty());
        assert_eq!(make_windows(&[0.0; 7], config).len(), 1);
    }

    #[test]
    fn zero_lookback_is_a_config_error() {
        let config = WindowConfig {
            lookback: 0,
            horizon: 1,
        };
        assert!(matches!(config.validate(), Err(ForecastError::Config(_))));
        assert!(make_windows(&[1.0, 2.0], config).is_empty());
    }
}
