use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ForecastError, ForecastResult},
    normalizer::{denormalize, normalize},
    snapshot::ModelSnapshot,
    stats::{self, validate_series, SeriesStatistics, MAX_AQI, MIN_AQI},
};

/// Observations compared against the forecast for trend and confidence.
pub const RECENT_SPAN: usize = 6;
/// Relative change from the recent mean that counts as a trend.
pub const TREND_THRESHOLD: f64 = 0.1;
/// Lowest confidence ever reported.
pub const CONFIDENCE_FLOOR: f64 = 0.3;

const STABILITY_WEIGHT: f64 = 0.4;
const REASONABLENESS_WEIGHT: f64 = 0.4;
const MODEL_QUALITY_WEIGHT: f64 = 0.2;

/// Direction of the forecast relative to recent readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    /// Forecast is more than 10% below the recent mean.
    Improving,
    /// Forecast is within 10% of the recent mean.
    Stable,
    /// Forecast is more than 10% above the recent mean.
    Worsening,
}

/// Health band of an AQI value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AqiCategory {
    /// 0–50.
    Good,
    /// 51–100.
    Moderate,
    /// 101–150.
    UnhealthyForSensitiveGroups,
    /// 151–200.
    Unhealthy,
    /// 201–300.
    VeryUnhealthy,
    /// Above 300.
    Hazardous,
}

impl AqiCategory {
    /// Band containing `aqi`.
    #[must_use]
    pub fn from_aqi(aqi: i32) -> Self {
        match aqi {
            i32::MIN..=50 => Self::Good,
            51..=100 => Self::Moderate,
            101..=150 => Self::UnhealthyForSensitiveGroups,
            151..=200 => Self::Unhealthy,
            201..=300 => Self::VeryUnhealthy,
            _ => Self::Hazardous,
        }
    }

    /// Display label used on dashboards.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Moderate => "Moderate",
            Self::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            Self::Unhealthy => "Unhealthy",
            Self::VeryUnhealthy => "Very Unhealthy",
            Self::Hazardous => "Hazardous",
        }
    }
}

/// A single short-horizon forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    /// Forecast AQI, rounded and clamped to `[0, 500]`.
    pub predicted_aqi: i32,
    /// Heuristic score in `[0.3, 1.0]`.
    pub confidence: f64,
    /// Direction relative to the recent mean.
    pub trend: Trend,
    /// Health band of `predicted_aqi`.
    pub category: AqiCategory,
    /// When the forecast was produced.
    pub generated_at: DateTime<Utc>,
}

impl Prediction {
    /// Derives trend, confidence and category for `predicted_aqi` against `recent`.
    #[must_use]
    pub fn assess(predicted_aqi: i32, recent: &[f64], validation_loss: Option<f32>) -> Self {
        let value = f64::from(predicted_aqi);
        Self {
            predicted_aqi,
            confidence: confidence(recent, value, validation_loss),
            trend: classify_trend(recent, value),
            category: AqiCategory::from_aqi(predicted_aqi),
            generated_at: Utc::now(),
        }
    }
}

/// Labels `prediction` against the mean of `recent` using a ±10% band; the band edges count as stable.
#[must_use]
pub fn classify_trend(recent: &[f64], prediction: f64) -> Trend {
    let average = stats::mean(recent);
    let threshold = average * TREND_THRESHOLD;
    if prediction > average + threshold {
        Trend::Worsening
    } else if prediction < average - threshold {
        Trend::Improving
    } else {
        Trend::Stable
    }
}

/// Blends input stability, closeness to the last reading and model validation loss.
///
/// Each factor lies in `[0, 1]`; the result is clamped to `[0.3, 1.0]`.
#[must_use]
pub fn confidence(recent: &[f64], prediction: f64, validation_loss: Option<f32>) -> f64 {
    let stability = SeriesStatistics::compute(recent).map_or(0.0, |s| 1.0 - s.variability());
    let reasonableness = recent
        .last()
        .map_or(0.0, |&last| reasonableness(prediction, last));
    let model_quality = validation_loss
        .filter(|loss| loss.is_finite())
        .map_or(1.0, |loss| (1.0 - f64::from(loss)).clamp(0.0, 1.0));
    let blended = stability * STABILITY_WEIGHT
        + reasonableness * REASONABLENESS_WEIGHT
        + model_quality * MODEL_QUALITY_WEIGHT;
    if blended.is_finite() {
        blended.clamp(CONFIDENCE_FLOOR, 1.0)
    } else {
        CONFIDENCE_FLOOR
    }
}

fn reasonableness(prediction: f64, last: f64) -> f64 {
    if last <= f64::EPSILON {
        return if (prediction - last).abs() <= f64::EPSILON {
            1.0
        } else {
            0.0
        };
    }
    (1.0 - (prediction - last).abs() / last).clamp(0.0, 1.0)
}

/// Forecasts the next reading from the last `lookback` values of `recent_window`.
///
/// Normalization always uses the statistics stored with the snapshot.
pub fn predict(snapshot: &ModelSnapshot, recent_window: &[f64]) -> ForecastResult<Prediction> {
    let meta = &snapshot.metadata;
    let lookback = meta.window.lookback;
    if recent_window.len() < lookback {
        return Err(ForecastError::InsufficientWindow {
            required: lookback,
            actual: recent_window.len(),
        });
    }
    validate_series(recent_window)?;

    let window = &recent_window[recent_window.len() - lookback..];
    let normalized: Vec<f32> = normalize(window, &meta.series_statistics)?
        .into_iter()
        .map(|z| z as f32)
        .collect();
    let output = snapshot.network.forward(&normalized)?;
    if !output.is_finite() {
        return Err(ForecastError::NonFinite(format!(
            "model {} produced a non-finite output",
            snapshot.id
        )));
    }
    let raw = denormalize(f64::from(output), &meta.series_statistics)?;
    let predicted_aqi = raw.clamp(MIN_AQI, MAX_AQI).round() as i32;

    let recent = &recent_window[recent_window.len().saturating_sub(RECENT_SPAN)..];
    Ok(Prediction::assess(
        predicted_aqi,
        recent,
        meta.last_validation_loss,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::AqiNetwork,
        snapshot::ModelMetadata,
        windower::WindowConfig,
    };
    use rand::{rngs::SmallRng, SeedableRng};

    fn snapshot(stats: SeriesStatistics, val_loss: Option<f32>) -> ModelSnapshot {
        ModelSnapshot::new(
            AqiNetwork::new(6, &mut SmallRng::seed_from_u64(3)),
            ModelMetadata {
                trained_at: Utc::now(),
                last_training_loss: 0.1,
                last_validation_loss: val_loss,
                series_statistics: stats,
                window: WindowConfig::default(),
                samples: 48,
            },
        )
    }

    fn wide_stats() -> SeriesStatistics {
        SeriesStatistics {
            mean: 250.0,
            std_dev: 10_000.0,
            min: 0.0,
            max: 500.0,
        }
    }

    #[test]
    fn trend_uses_ten_percent_band() {
        // Flat readings with a tiny jitter so the sample still has spread.
        let recent = [100.0, 100.01, 99.99, 100.0, 100.01, 99.99];
        assert_eq!(classify_trend(&recent, 100.0), Trend::Stable);
        assert_eq!(classify_trend(&recent, 109.0), Trend::Stable);
        assert_eq!(classify_trend(&recent, 111.0), Trend::Worsening);
        assert_eq!(classify_trend(&recent, 89.0), Trend::Improving);
        assert_eq!(classify_trend(&recent, 91.0), Trend::Stable);
    }

    #[test]
    fn exact_band_edges_stay_stable() {
        let recent = [100.0; 6];
        assert_eq!(classify_trend(&recent, 110.0), Trend::Stable);
        assert_eq!(classify_trend(&recent, 90.0), Trend::Stable);
        assert_eq!(classify_trend(&recent, 110.01), Trend::Worsening);
        assert_eq!(classify_trend(&recent, 89.99), Trend::Improving);
    }

    #[test]
    fn confidence_stays_within_bounds() {
        let cases: [(&[f64], f64, Option<f32>); 6] = [
            (&[50.0, 52.0, 51.0, 50.0, 49.0, 50.0], 50.0, Some(0.01)),
            (&[0.0, 500.0, 0.0, 500.0, 0.0, 500.0], 0.0, Some(3.0)),
            (&[0.0; 6], 0.0, None),
            (&[0.0; 6], 500.0, Some(f32::NAN)),
            (&[1.0, 1.0, 1.0, 1.0, 1.0, 1.0], 500.0, Some(-2.0)),
            (&[300.0], 10.0, None),
        ];
        for (recent, prediction, loss) in cases {
            let c = confidence(recent, prediction, loss);
            assert!((CONFIDENCE_FLOOR..=1.0).contains(&c), "{c} for {recent:?}");
        }
    }

    #[test]
    fn steady_accurate_forecast_is_confident() {
        let recent = [80.0, 80.0, 80.0, 80.0, 80.0, 80.0];
        assert!((confidence(&recent, 80.0, Some(0.0)) - 1.0).abs() < 1e-12);
        assert!((confidence(&recent, 80.0, None) - 1.0).abs() < 1e-12);
        assert!(confidence(&recent, 80.0, Some(1.0)) < 0.81);
    }

    #[test]
    fn categories_follow_breakpoints() {
        assert_eq!(AqiCategory::from_aqi(0), AqiCategory::Good);
        assert_eq!(AqiCategory::from_aqi(50), AqiCategory::Good);
        assert_eq!(AqiCategory::from_aqi(51), AqiCategory::Moderate);
        assert_eq!(AqiCategory::from_aqi(150), AqiCategory::UnhealthyForSensitiveGroups);
        assert_eq!(AqiCategory::from_aqi(200), AqiCategory::Unhealthy);
        assert_eq!(AqiCategory::from_aqi(301), AqiCategory::Hazardous);
        assert_eq!(AqiCategory::Hazardous.label(), "Hazardous");
    }

    #[test]
    fn short_window_is_rejected_with_required_length() {
        let snap = snapshot(wide_stats(), None);
        let err = predict(&snap, &[10.0, 20.0]).unwrap_err();
        assert!(matches!(
            err,
            ForecastError::InsufficientWindow {
                required: 6,
                actual: 2
            }
        ));
    }

    #[test]
    fn invalid_window_values_are_rejected() {
        let snap = snapshot(wide_stats(), None);
        assert!(matches!(
            predict(&snap, &[10.0, 20.0, 30.0, 40.0, 50.0, 600.0]),
            Err(ForecastError::InvalidInput(_))
        ));
    }

    #[test]
    fn prediction_is_clamped_to_aqi_range() {
        // A huge stored spread turns any nonzero network output into an extreme value.
        let snap = snapshot(wide_stats(), Some(0.2));
        for window in [[0.0; 6], [500.0; 6], [0.0, 500.0, 0.0, 500.0, 0.0, 500.0]] {
            let prediction = predict(&snap, &window).unwrap();
            assert!((0..=500).contains(&prediction.predicted_aqi));
            assert!((CONFIDENCE_FLOOR..=1.0).contains(&prediction.confidence));
            assert_eq!(
                prediction.category,
                AqiCategory::from_aqi(prediction.predicted_aqi)
            );
        }
    }

    #[test]
    fn only_last_lookback_values_feed_the_model() {
        let snap = snapshot(
            SeriesStatistics {
                mean: 80.0,
                std_dev: 20.0,
                min: 40.0,
                max: 120.0,
            },
            Some(0.1),
        );
        let tail = [60.0, 65.0, 70.0, 75.0, 80.0, 85.0];
        let mut long = vec![400.0, 10.0, 250.0];
        long.extend_from_slice(&tail);
        let short = predict(&snap, &tail).unwrap();
        let long = predict(&snap, &long).unwrap();
        assert_eq!(short.predicted_aqi, long.predicted_aqi);
        assert_eq!(short.trend, long.trend);
    }

    #[test]
    fn degenerate_stored_statistics_are_rejected() {
        let snap = snapshot(
            SeriesStatistics {
                mean: 75.0,
                std_dev: 0.0,
                min: 75.0,
                max: 75.0,
            },
            None,
        );
        assert!(matches!(
            predict(&snap, &[75.0; 6]),
            Err(ForecastError::DegenerateDistribution)
        ));
    }

    #[test]
    fn prediction_serializes_with_camel_case_keys() {
        let prediction = Prediction::assess(88, &[80.0, 82.0, 84.0, 86.0, 88.0, 90.0], None);
        let json = serde_json::to_value(&prediction).unwrap();
        assert_eq!(json["predictedAqi"], 88);
        assert_eq!(json["trend"], "stable");
        assert_eq!(json["category"], "moderate");
        assert!(json["generatedAt"].is_string());
    }
}
