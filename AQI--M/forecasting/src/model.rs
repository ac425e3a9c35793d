use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, ForecastResult};

/// Units in the two hidden layers.
pub const HIDDEN_UNITS: [usize; 2] = [16, 8];

/// Fully connected layer, `output = input · weights + bias`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    weights: Array2<f32>,
    bias: Array1<f32>,
}

impl DenseLayer {
    /// Glorot-uniform weights with zero bias.
    fn glorot<R: Rng>(input_dim: usize, output_dim: usize, rng: &mut R) -> Self {
        let limit = (6.0 / (input_dim + output_dim) as f32).sqrt();
        let weights = Array2::from_shape_fn((input_dim, output_dim), |_| {
            rng.gen_range(-limit..limit)
        });
        Self {
            weights,
            bias: Array1::zeros(output_dim),
        }
    }

    fn forward(&self, input: &Array2<f32>) -> Array2<f32> {
        input.dot(&self.weights) + &self.bias
    }

    fn apply_gradient(&mut self, grad_w: &Array2<f32>, grad_b: &Array1<f32>, lr: f32) {
        self.weights.scaled_add(-lr, grad_w);
        self.bias.scaled_add(-lr, grad_b);
    }

    fn dims(&self) -> (usize, usize) {
        self.weights.dim()
    }

    fn is_finite(&self) -> bool {
        self.weights.iter().chain(self.bias.iter()).all(|w| w.is_finite())
    }
}

/// Two ReLU hidden layers and a linear scalar head.
///
/// The network knows nothing about AQI; it maps a window of z-scores to a z-score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AqiNetwork {
    hidden: DenseLayer,
    bottleneck: DenseLayer,
    head: DenseLayer,
}

struct Activations {
    z1: Array2<f32>,
    a1: Array2<f32>,
    z2: Array2<f32>,
    a2: Array2<f32>,
    out: Array2<f32>,
}

impl AqiNetwork {
    /// Creates a randomly initialised network for windows of `lookback` values.
    #[must_use]
    pub fn new<R: Rng>(lookback: usize, rng: &mut R) -> Self {
        let [h1, h2] = HIDDEN_UNITS;
        Self {
            hidden: DenseLayer::glorot(lookback, h1, rng),
            bottleneck: DenseLayer::glorot(h1, h2, rng),
            head: DenseLayer::glorot(h2, 1, rng),
        }
    }

    /// Window length the network expects.
    #[must_use]
    pub fn input_dim(&self) -> usize {
        self.hidden.dims().0
    }

    /// Number of trainable scalars.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        [&self.hidden, &self.bottleneck, &self.head]
            .iter()
            .map(|layer| layer.weights.len() + layer.bias.len())
            .sum()
    }

    /// Predicts the next z-score for a single window.
    pub fn forward(&self, window: &[f32]) -> ForecastResult<f32> {
        if window.len() != self.input_dim() {
            return Err(ForecastError::InvalidInput(format!(
                "model expects windows of {} values, got {}",
                self.input_dim(),
                window.len()
            )));
        }
        let input = Array2::from_shape_vec((1, window.len()), window.to_vec())
            .map_err(|err| ForecastError::InvalidInput(err.to_string()))?;
        Ok(self.activations(&input).out[[0, 0]])
    }

    /// Batched forward pass; `inputs` is `(samples, lookback)`, the result `(samples, 1)`.
    #[must_use]
    pub fn forward_batch(&self, inputs: &Array2<f32>) -> Array2<f32> {
        self.activations(inputs).out
    }

    /// Mean squared error over a batch. Empty batches score zero.
    #[must_use]
    pub fn mse(&self, inputs: &Array2<f32>, targets: &Array2<f32>) -> f32 {
        if inputs.nrows() == 0 {
            return 0.0;
        }
        let residual = self.forward_batch(inputs) - targets;
        residual.mapv(|r| r * r).mean().unwrap_or(0.0)
    }

    /// One SGD step on MSE. Returns the batch loss measured before the update.
    pub(crate) fn sgd_step(&mut self, inputs: &Array2<f32>, targets: &Array2<f32>, lr: f32) -> f32 {
        let batch = inputs.nrows();
        if batch == 0 {
            return 0.0;
        }
        let acts = self.activations(inputs);
        let residual = &acts.out - targets;
        let loss = residual.mapv(|r| r * r).mean().unwrap_or(0.0);

        let d_out = residual * (2.0 / batch as f32);
        let grad_head_w = acts.a2.t().dot(&d_out);
        let grad_head_b = d_out.sum_axis(Axis(0));

        let d_z2 = d_out.dot(&self.head.weights.t()) * relu_mask(&acts.z2);
        let grad_bottleneck_w = acts.a1.t().dot(&d_z2);
        let grad_bottleneck_b = d_z2.sum_axis(Axis(0));

        let d_z1 = d_z2.dot(&self.bottleneck.weights.t()) * relu_mask(&acts.z1);
        let grad_hidden_w = inputs.t().dot(&d_z1);
        let grad_hidden_b = d_z1.sum_axis(Axis(0));

        self.head.apply_gradient(&grad_head_w, &grad_head_b, lr);
        self.bottleneck
            .apply_gradient(&grad_bottleneck_w, &grad_bottleneck_b, lr);
        self.hidden.apply_gradient(&grad_hidden_w, &grad_hidden_b, lr);
        loss
    }

    /// Checks layer shapes chain together for `lookback` inputs and every weight is finite.
    #[must_use]
    pub fn is_consistent(&self, lookback: usize) -> bool {
        let [h1, h2] = HIDDEN_UNITS;
        self.hidden.dims() == (lookback, h1)
            && self.hidden.bias.len() == h1
            && self.bottleneck.dims() == (h1, h2)
            && self.bottleneck.bias.len() == h2
            && self.head.dims() == (h2, 1)
            && self.head.bias.len() == 1
            && self.is_finite()
    }

    /// True when no weight has diverged to NaN/Infinity.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.hidden.is_finite() && self.bottleneck.is_finite() && self.head.is_finite()
    }

    fn activations(&self, inputs: &Array2<f32>) -> Activations {
        let z1 = self.hidden.forward(inputs);
        let a1 = relu(&z1);
        let z2 = self.bottleneck.forward(&a1);
        let a2 = relu(&z2);
        let out = self.head.forward(&a2);
        Activations { z1, a1, z2, a2, out }
    }
}

fn relu(z: &Array2<f32>) -> Array2<f32> {
    z.mapv(|v| v.max(0.0))
}

fn relu_mask(z: &Array2<f32>) -> Array2<f32> {
    z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::SmallRng, SeedableRng};

    fn network(seed: u64) -> AqiNetwork {
        AqiNetwork::new(6, &mut SmallRng::seed_from_u64(seed))
    }

    #[test]
    fn has_expected_topology() {
        let net = network(1);
        assert_eq!(net.input_dim(), 6);
        assert_eq!(net.parameter_count(), 6 * 16 + 16 + 16 * 8 + 8 + 8 + 1);
        assert!(net.is_consistent(6));
        assert!(!net.is_consistent(5));
    }

    #[test]
    fn forward_matches_batched_forward() {
        let net = network(7);
        let window = [0.1_f32, -0.4, 0.9, 1.2, -1.0, 0.0];
        let single = net.forward(&window).unwrap();
        let batch = Array2::from_shape_vec((1, 6), window.to_vec()).unwrap();
        assert!((net.forward_batch(&batch)[[0, 0]] - single).abs() < 1e-6);
    }

    #[test]
    fn forward_rejects_wrong_window_length() {
        let net = network(3);
        assert!(matches!(
            net.forward(&[0.0; 4]),
            Err(ForecastError::InvalidInput(_))
        ));
    }

    #[test]
    fn sgd_reduces_loss_on_linear_target() {
        let mut rng = SmallRng::seed_from_u64(11);
        let mut net = AqiNetwork::new(6, &mut rng);
        let inputs = Array2::from_shape_fn((64, 6), |(row, col)| {
            ((row * 7 + col * 3) % 13) as f32 / 6.5 - 1.0
        });
        let targets = inputs
            .mean_axis(Axis(1))
            .unwrap()
            .insert_axis(Axis(1));
        let before = net.mse(&inputs, &targets);
        for _ in 0..300 {
            net.sgd_step(&inputs, &targets, 0.05);
        }
        let after = net.mse(&inputs, &targets);
        assert!(after < before, "loss went from {before} to {after}");
        assert!(net.is_finite());
    }

    #[test]
    fn empty_batches_are_noops() {
        let mut net = network(5);
        let original = net.clone();
        let empty = Array2::<f32>::zeros((0, 6));
        let targets = Array2::<f32>::zeros((0, 1));
        assert_eq!(net.sgd_step(&empty, &targets, 0.1), 0.0);
        assert_eq!(net.mse(&empty, &targets), 0.0);
        assert_eq!(net, original);
    }
}
