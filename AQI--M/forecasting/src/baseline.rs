use chrono::Utc;

use crate::{
    error::ForecastResult,
    predictor::{classify_trend, AqiCategory, Prediction, Trend, CONFIDENCE_FLOOR, RECENT_SPAN},
    stats::{validate_series, SeriesStatistics, MAX_AQI, MIN_AQI},
};

/// Model-free forecaster: a recency-weighted moving average nudged in the direction
/// it diverges from the plain mean.
#[derive(Debug, Clone)]
pub struct StatisticalPredictor {
    span: usize,
}

impl Default for StatisticalPredictor {
    fn default() -> Self {
        Self { span: RECENT_SPAN }
    }
}

impl StatisticalPredictor {
    /// Uses the last `span` readings (at least one).
    #[must_use]
    pub fn new(span: usize) -> Self {
        Self { span: span.max(1) }
    }

    /// Forecasts from whatever history is supplied; one reading is enough.
    pub fn predict(&self, recent: &[f64]) -> ForecastResult<Prediction> {
        validate_series(recent)?;
        let window = &recent[recent.len().saturating_sub(self.span)..];
        let stats = SeriesStatistics::compute(window)?;

        let weight_total: f64 = (1..=window.len()).map(|w| w as f64).sum();
        let weighted = window
            .iter()
            .enumerate()
            .map(|(idx, value)| value * (idx + 1) as f64)
            .sum::<f64>()
            / weight_total;
        let nudge = if weighted > stats.mean {
            1.05
        } else if weighted < stats.mean {
            0.95
        } else {
            1.0
        };
        let predicted_aqi = (weighted * nudge).round().clamp(MIN_AQI, MAX_AQI) as i32;
        let value = f64::from(predicted_aqi);

        Ok(Prediction {
            predicted_aqi,
            confidence: baseline_confidence(&stats, value),
            trend: classify_trend(window, value),
            category: AqiCategory::from_aqi(predicted_aqi),
            generated_at: Utc::now(),
        })
    }

    /// Last reading with floor confidence; used when even the baseline cannot run.
    #[must_use]
    pub fn last_known(recent: &[f64]) -> Prediction {
        let last = recent
            .iter()
            .rev()
            .copied()
            .find(|v| v.is_finite())
            .unwrap_or(0.0)
            .clamp(MIN_AQI, MAX_AQI)
            .round() as i32;
        Prediction {
            predicted_aqi: last,
            confidence: CONFIDENCE_FLOOR,
            trend: Trend::Stable,
            category: AqiCategory::from_aqi(last),
            generated_at: Utc::now(),
        }
    }
}

fn baseline_confidence(stats: &SeriesStatistics, prediction: f64) -> f64 {
    let deviation = if stats.mean <= f64::EPSILON {
        if prediction <= f64::EPSILON {
            0.0
        } else {
            1.0
        }
    } else {
        ((prediction - stats.mean).abs() / stats.mean).min(1.0)
    };
    ((1.0 - stats.variability()) * 0.6 + (1.0 - deviation) * 0.4).clamp(CONFIDENCE_FLOOR, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ForecastError;

    #[test]
    fn rising_readings_forecast_upward() {
        let prediction = StatisticalPredictor::default()
            .predict(&[40.0, 50.0, 60.0, 70.0, 80.0, 90.0])
            .unwrap();
        // weighted mean 73.33, nudged up 5%
        assert_eq!(prediction.predicted_aqi, 77);
        assert_eq!(prediction.trend, Trend::Worsening);
        assert!((CONFIDENCE_FLOOR..=1.0).contains(&prediction.confidence));
    }

    #[test]
    fn falling_readings_forecast_downward() {
        let prediction = StatisticalPredictor::default()
            .predict(&[200.0, 180.0, 160.0, 140.0, 120.0, 100.0])
            .unwrap();
        assert!(prediction.predicted_aqi < 130);
        assert_eq!(prediction.trend, Trend::Improving);
    }

    #[test]
    fn flat_readings_are_stable_and_confident() {
        let prediction = StatisticalPredictor::default().predict(&[75.0; 6]).unwrap();
        assert_eq!(prediction.predicted_aqi, 75);
        assert_eq!(prediction.trend, Trend::Stable);
        assert!((prediction.confidence - 1.0).abs() < 1e-12);
    }

    #[test]
    fn uses_only_the_configured_span() {
        let predictor = StatisticalPredictor::new(2);
        let prediction = predictor.predict(&[500.0, 500.0, 10.0, 10.0]).unwrap();
        assert_eq!(prediction.predicted_aqi, 10);
    }

    #[test]
    fn rejects_invalid_readings() {
        assert!(matches!(
            StatisticalPredictor::default().predict(&[]),
            Err(ForecastError::InvalidInput(_))
        ));
        assert!(matches!(
            StatisticalPredictor::default().predict(&[20.0, f64::NAN]),
            Err(ForecastError::InvalidInput(_))
        ));
    }

    #[test]
    fn last_known_skips_non_finite_tail() {
        let prediction = StatisticalPredictor::last_known(&[42.4, f64::NAN]);
        assert_eq!(prediction.predicted_aqi, 42);
        assert_eq!(prediction.confidence, CONFIDENCE_FLOOR);
        assert_eq!(StatisticalPredictor::last_known(&[]).predicted_aqi, 0);
        assert_eq!(StatisticalPredictor::last_known(&[900.0]).predicted_aqi, 500);
    }
}
