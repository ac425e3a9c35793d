use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{model::AqiNetwork, stats::SeriesStatistics, windower::WindowConfig};

/// Facts recorded at the end of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetadata {
    /// When training completed.
    pub trained_at: DateTime<Utc>,
    /// Mean training loss of the final epoch (normalized units).
    pub last_training_loss: f32,
    /// Validation loss after the final epoch, absent when the split left no hold-out windows.
    pub last_validation_loss: Option<f32>,
    /// Statistics of the training series; every later normalization uses these.
    pub series_statistics: SeriesStatistics,
    /// Window geometry the network was fit with.
    pub window: WindowConfig,
    /// Observations used for training after the sample cap.
    pub samples: usize,
}

/// Immutable pairing of trained parameters and their metadata.
///
/// Replaced wholesale by each training run and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    /// Identifier of this training run.
    pub id: Uuid,
    /// Trained network parameters.
    pub network: AqiNetwork,
    /// Statistics and losses from the run.
    pub metadata: ModelMetadata,
}

impl ModelSnapshot {
    /// Bundles a freshly trained network with its metadata.
    #[must_use]
    pub fn new(network: AqiNetwork, metadata: ModelMetadata) -> Self {
        Self {
            id: Uuid::new_v4(),
            network,
            metadata,
        }
    }

    /// Whether parameters and metadata agree with each other and hold usable numbers.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let window = self.metadata.window;
        window.validate().is_ok()
            && self.network.is_consistent(window.lookback)
            && !self.metadata.series_statistics.is_degenerate()
            && self.metadata.last_training_loss.is_finite()
            && self
                .metadata
                .last_validation_loss
                .map_or(true, f32::is_finite)
    }
}
