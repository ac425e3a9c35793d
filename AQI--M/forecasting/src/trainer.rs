use chrono::Utc;
use ndarray::{Array2, Axis};
use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ForecastError, ForecastResult},
    model::AqiNetwork,
    normalizer::normalize,
    snapshot::{ModelMetadata, ModelSnapshot},
    stats::{validate_series, SeriesStatistics},
    windower::{make_windows, WindowConfig, WindowSample},
};

/// Default SGD step size.
pub const DEFAULT_LEARNING_RATE: f32 = 0.05;
/// Default number of passes over the training windows.
pub const DEFAULT_EPOCHS: usize = 400;

/// Training hyperparameters.
///
/// Defaults train long enough for the network to track the local slope of a
/// daily cycle; five epochs at 0.01 leave it predicting the series mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// SGD learning rate.
    pub learning_rate: f32,
    /// Full passes over the training windows.
    pub epochs: usize,
    /// Windows per gradient step.
    pub batch_size: usize,
    /// Trailing fraction of windows held out for validation.
    pub validation_split: f32,
    /// Only the most recent `max_samples` observations are used.
    pub max_samples: usize,
    /// Reshuffle training windows every epoch.
    pub shuffle: bool,
    /// Fixes initialisation and shuffling for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
            epochs: DEFAULT_EPOCHS,
            batch_size: 32,
            validation_split: 0.2,
            max_samples: 1000,
            shuffle: true,
            seed: None,
        }
    }
}

impl TrainingConfig {
    /// Rejects values that would make training meaningless.
    pub fn validate(&self) -> ForecastResult<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ForecastError::Config(
                "training.learning_rate must be a positive number".into(),
            ));
        }
        if self.epochs == 0 {
            return Err(ForecastError::Config("training.epochs must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(ForecastError::Config(
                "training.batch_size must be at least 1".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(ForecastError::Config(
                "training.validation_split must be in [0, 1)".into(),
            ));
        }
        if self.max_samples == 0 {
            return Err(ForecastError::Config(
                "training.max_samples must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Losses reported by a completed training run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingResult {
    /// Mean training loss of the final epoch.
    pub last_loss: f32,
    /// Validation loss after the final epoch, if any windows were held out.
    pub last_validation_loss: Option<f32>,
}

/// Loss curve entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochLoss {
    /// Zero-based epoch index.
    pub epoch: usize,
    /// Sample-weighted mean of the epoch's batch losses.
    pub loss: f32,
    /// Hold-out loss measured after the epoch.
    pub val_loss: Option<f32>,
}

/// Output of [`Trainer::fit`].
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    /// Newly trained parameters with metadata.
    pub snapshot: ModelSnapshot,
    /// Per-epoch losses.
    pub history: Vec<EpochLoss>,
}

impl TrainingOutcome {
    /// Final losses as reported to callers.
    #[must_use]
    pub fn result(&self) -> TrainingResult {
        TrainingResult {
            last_loss: self.snapshot.metadata.last_training_loss,
            last_validation_loss: self.snapshot.metadata.last_validation_loss,
        }
    }
}

/// Fits a fresh network to a series. Every call retrains from scratch.
#[derive(Debug, Clone)]
pub struct Trainer {
    window: WindowConfig,
    config: TrainingConfig,
}

impl Trainer {
    /// Creates a trainer.
    #[must_use]
    pub fn new(window: WindowConfig, config: TrainingConfig) -> Self {
        Self { window, config }
    }

    /// Training hyperparameters in use.
    #[must_use]
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Validates, normalizes and windows `series`, then runs mini-batch SGD on MSE.
    pub fn fit(&self, series: &[f64]) -> ForecastResult<TrainingOutcome> {
        self.window.validate()?;
        self.config.validate()?;
        validate_series(series)?;

        let recent = &series[series.len().saturating_sub(self.config.max_samples)..];
        let stats = SeriesStatistics::compute(recent)?;
        let normalized = normalize(recent, &stats)?;
        let samples = make_windows(&normalized, self.window);
        if samples.is_empty() {
            return Err(ForecastError::InsufficientData {
                required: self.window.min_series_len(),
                actual: recent.len(),
            });
        }

        let (inputs, targets) = to_arrays(&samples, self.window.lookback);
        let train_len = split_point(samples.len(), self.config.validation_split);
        let train_x = inputs.slice(ndarray::s![..train_len, ..]).to_owned();
        let train_y = targets.slice(ndarray::s![..train_len, ..]).to_owned();
        let val_x = inputs.slice(ndarray::s![train_len.., ..]).to_owned();
        let val_y = targets.slice(ndarray::s![train_len.., ..]).to_owned();

        let mut rng = self
            .config
            .seed
            .map_or_else(SmallRng::from_entropy, SmallRng::seed_from_u64);
        let mut network = AqiNetwork::new(self.window.lookback, &mut rng);
        let mut order: Vec<usize> = (0..train_len).collect();
        let mut history = Vec::with_capacity(self.config.epochs);

        for epoch in 0..self.config.epochs {
            if self.config.shuffle {
                order.shuffle(&mut rng);
            }
            let mut weighted = 0.0_f32;
            for chunk in order.chunks(self.config.batch_size) {
                let batch_x = train_x.select(Axis(0), chunk);
                let batch_y = train_y.select(Axis(0), chunk);
                let loss = network.sgd_step(&batch_x, &batch_y, self.config.learning_rate);
                weighted += loss * chunk.len() as f32;
            }
            let loss = weighted / train_len as f32;
            let val_loss = (val_x.nrows() > 0).then(|| network.mse(&val_x, &val_y));
            if !loss.is_finite() || val_loss.is_some_and(|v| !v.is_finite()) || !network.is_finite()
            {
                return Err(ForecastError::NonFinite(format!(
                    "training diverged at epoch {epoch}; lower training.learning_rate"
                )));
            }
            history.push(EpochLoss {
                epoch,
                loss,
                val_loss,
            });
        }

        let last = history.last().copied().ok_or_else(|| {
            ForecastError::Config("training.epochs must be at least 1".into())
        })?;
        let metadata = ModelMetadata {
            trained_at: Utc::now(),
            last_training_loss: last.loss,
            last_validation_loss: last.val_loss,
            series_statistics: stats,
            window: self.window,
            samples: recent.len(),
        };
        Ok(TrainingOutcome {
            snapshot: ModelSnapshot::new(network, metadata),
            history,
        })
    }
}

/// Number of leading windows used for training; the rest are held out.
fn split_point(total: usize, validation_split: f32) -> usize {
    let train = ((1.0 - validation_split) * total as f32).floor() as usize;
    if train == 0 {
        total
    } else {
        train.min(total)
    }
}

fn to_arrays(samples: &[WindowSample], lookback: usize) -> (Array2<f32>, Array2<f32>) {
    let inputs = Array2::from_shape_fn((samples.len(), lookback), |(row, col)| {
        samples[row].window[col] as f32
    });
    let targets = Array2::from_shape_fn((samples.len(), 1), |(row, _)| samples[row].target as f32);
    (inputs, targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sinusoid(len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| 80.0 + 40.0 * (2.0 * std::f64::consts::PI * i as f64 / 24.0).sin())
            .collect()
    }

    fn seeded(epochs: usize) -> Trainer {
        Trainer::new(
            WindowConfig::default(),
            TrainingConfig {
                epochs,
                seed: Some(42),
                ..TrainingConfig::default()
            },
        )
    }

    #[test]
    fn fit_records_statistics_and_losses() {
        let series = sinusoid(48);
        let outcome = seeded(5).fit(&series).unwrap();
        let meta = &outcome.snapshot.metadata;
        assert_eq!(outcome.history.len(), 5);
        assert_eq!(meta.series_statistics, SeriesStatistics::compute(&series).unwrap());
        assert_eq!(meta.samples, 48);
        assert!(meta.last_training_loss.is_finite());
        assert!(meta.last_validation_loss.is_some());
        assert_eq!(outcome.result().last_loss, meta.last_training_loss);
        assert!(outcome.snapshot.is_consistent());
    }

    #[test]
    fn longer_training_lowers_validation_loss() {
        let series = sinusoid(96);
        let trainer = Trainer::new(
            WindowConfig::default(),
            TrainingConfig {
                epochs: 300,
                learning_rate: 0.05,
                seed: Some(7),
                ..TrainingConfig::default()
            },
        );
        let outcome = trainer.fit(&series).unwrap();
        let first = outcome.history.first().unwrap().loss;
        let last = outcome.history.last().unwrap();
        assert!(last.loss < first);
        assert!(last.val_loss.unwrap() < 0.5, "val loss {:?}", last.val_loss);
    }

    #[test]
    fn same_seed_gives_same_parameters() {
        let series = sinusoid(60);
        let a = seeded(3).fit(&series).unwrap();
        let b = seeded(3).fit(&series).unwrap();
        assert_eq!(a.snapshot.network, b.snapshot.network);
        assert_eq!(a.history, b.history);
    }

    #[test]
    fn empty_series_is_invalid_input() {
        assert!(matches!(
            seeded(1).fit(&[]),
            Err(ForecastError::InvalidInput(_))
        ));
    }

    #[test]
    fn short_series_reports_required_length() {
        let err = seeded(1).fit(&[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(
            err,
            ForecastError::InsufficientData {
                required: 7,
                actual: 3
            }
        ));
    }

    #[test]
    fn flat_series_is_degenerate() {
        let err = seeded(5).fit(&[75.0; 48]).unwrap_err();
        assert!(matches!(err, ForecastError::DegenerateDistribution));
    }

    #[test]
    fn sample_cap_keeps_most_recent_observations() {
        let mut series = vec![400.0; 500];
        series.extend(sinusoid(48));
        let trainer = Trainer::new(
            WindowConfig::default(),
            TrainingConfig {
                max_samples: 48,
                seed: Some(1),
                ..TrainingConfig::default()
            },
        );
        let meta = trainer.fit(&series).unwrap().snapshot.metadata;
        assert_eq!(meta.samples, 48);
        assert!(meta.series_statistics.max < 121.0);
    }

    #[test]
    fn tiny_dataset_trains_without_validation() {
        let outcome = seeded(2).fit(&[10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0]).unwrap();
        assert_eq!(outcome.snapshot.metadata.last_validation_loss, None);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let trainer = Trainer::new(
            WindowConfig::default(),
            TrainingConfig {
                batch_size: 0,
                ..TrainingConfig::default()
            },
        );
        assert!(matches!(
            trainer.fit(&sinusoid(48)),
            Err(ForecastError::Config(_))
        ));
    }

    #[test]
    fn defaults_train_past_the_series_mean() {
        let config = TrainingConfig::default();
        assert_eq!(config.epochs, DEFAULT_EPOCHS);
        assert!((config.learning_rate - DEFAULT_LEARNING_RATE).abs() < f32::EPSILON);
        assert_eq!(config.batch_size, 32);
        assert!(config.validate().is_ok());

        let series = sinusoid(48);
        let trainer = Trainer::new(
            WindowConfig::default(),
            TrainingConfig {
                seed: Some(42),
                ..TrainingConfig::default()
            },
        );
        let outcome = trainer.fit(&series).unwrap();
        assert_eq!(outcome.history.len(), DEFAULT_EPOCHS);
        assert!(outcome.result().last_loss < 0.5, "{:?}", outcome.result());
    }

    #[test]
    fn split_point_holds_out_trailing_windows() {
        assert_eq!(split_point(42, 0.2), 33);
        assert_eq!(split_point(1, 0.2), 1);
        assert_eq!(split_point(10, 0.0), 10);
    }
}
