use ndarray::{Array2, Array3};
use rand::Rng;

use crate::layers::activation::Activation;
use crate::layers::linear::{LinearGradients, LinearLayer};
use crate::optimizers::Optimizer;

#[derive(Clone, Debug)]
pub struct ForecastHeadCache {
    pub pre_activation: Array2<f64>,
    pub activated: Array2<f64>,
    pub encode_len: usize,
}

/// Maps the decode-window suffix of the extracted features to point forecasts
///
/// The last `decode_len` time steps of the (batch, encode_len, channels)
/// features are flattened time-major into (batch, decode_len * channels),
/// gated by the activation and projected to (batch, decode_len).
#[derive(Clone, Debug)]
pub struct ForecastHead {
    pub fc: LinearLayer,
    pub activation: Activation,
    pub decode_len: usize,
    pub channels: usize,
}

impl ForecastHead {
    pub fn new<R: Rng + ?Sized>(decode_len: usize, channels: usize, activation: Activation, rng: &mut R) -> Self {
        ForecastHead {
            fc: LinearLayer::new(decode_len * channels, decode_len, rng),
            activation,
            decode_len,
            channels,
        }
    }

    pub fn from_layer(fc: LinearLayer, activation: Activation, decode_len: usize) -> Self {
        let channels = fc.input_size / decode_len;
        ForecastHead {
            fc,
            activation,
            decode_len,
            channels,
        }
    }

    pub fn forward(&self, features: &Array3<f64>) -> Array2<f64> {
        let flat = self.flatten_suffix(features);
        self.fc.forward(&self.activation.apply(&flat))
    }

    pub fn forward_with_cache(&self, features: &Array3<f64>) -> (Array2<f64>, ForecastHeadCache) {
        let pre_activation = self.flatten_suffix(features);
        let activated = self.activation.apply(&pre_activation);
        let output = self.fc.forward(&activated);
        let cache = ForecastHeadCache {
            pre_activation,
            activated,
            encode_len: features.dim().1,
        };
        (output, cache)
    }

    /// Returns the projection gradients and the gradient w.r.t. the full
    /// (batch, encode_len, channels) feature tensor; steps before the decode
    /// window receive zero gradient.
    pub fn backward(&self, grad_output: &Array2<f64>, cache: &ForecastHeadCache) -> (LinearGradients, Array3<f64>) {
        let (gradients, grad_activated) = self.fc.backward(&cache.activated, grad_output);
        let grad_flat = self.activation.backward(&cache.pre_activation, &grad_activated);

        let batch_size = grad_flat.dim().0;
        let start = cache.encode_len - self.decode_len;
        let channels = self.channels;
        let grad_features = Array3::from_shape_fn((batch_size, cache.encode_len, channels), |(b, t, c)| {
            if t < start {
                0.0
            } else {
                grad_flat[[b, (t - start) * channels + c]]
            }
        });
        (gradients, grad_features)
    }

    pub fn update_parameters<O: Optimizer>(&mut self, gradients: &LinearGradients, optimizer: &mut O) {
        self.fc.update_parameters(gradients, optimizer, "fc");
    }

    pub fn num_parameters(&self) -> usize {
        self.fc.num_parameters()
    }

    fn flatten_suffix(&self, features: &Array3<f64>) -> Array2<f64> {
        let (batch_size, length, channels) = features.dim();
        assert_eq!(channels, self.channels, "Feature channels {} don't match head channels {}", channels, self.channels);
        assert!(length >= self.decode_len, "Feature length {} shorter than decode_len {}", length, self.decode_len);

        let start = length - self.decode_len;
        Array2::from_shape_fn((batch_size, self.decode_len * channels), |(b, j)| {
            features[[b, start + j / channels, j % channels]]
        })
    }
}
