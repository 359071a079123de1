use ndarray::{Array1, Array2, Array3, Axis};
use rand::Rng;
use rand_distr::Uniform;
use ndarray_rand::RandomExt;

use crate::optimizers::Optimizer;

/// Holds gradients for convolution parameters during backpropagation
#[derive(Clone, Debug)]
pub struct Conv1dGradients {
    pub weight: Array2<f64>,
    pub bias: Array1<f64>,
}

/// Unfolded input kept from the forward pass for the backward pass
#[derive(Clone, Debug)]
pub struct Conv1dCache {
    pub columns: Array2<f64>, // (in_channels * kernel_size, batch * length)
    pub batch_size: usize,
    pub length: usize,
}

/// Stride-1 1-D convolution with "same" padding over a channel-first input
///
/// For a kernel of width k the sequence is zero-padded by (k - 1) / 2 steps
/// on the left and the remainder on the right, so even kernels lean one step
/// into the future side. Output length always equals input length.
///
/// The kernel is stored flattened: `weight[[o, i * kernel_size + k]]` is the
/// tap `k` connecting input channel `i` to output channel `o`.
#[derive(Clone, Debug)]
pub struct Conv1dLayer {
    pub weight: Array2<f64>, // (out_channels, in_channels * kernel_size)
    pub bias: Array1<f64>,   // (out_channels)
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
}

impl Conv1dLayer {
    /// Create a layer with weights and biases drawn from U(-1/sqrt(fan_in), 1/sqrt(fan_in))
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        rng: &mut R,
    ) -> Self {
        let fan_in = (in_channels * kernel_size) as f64;
        let bound = 1.0 / fan_in.sqrt();
        let dist = Uniform::new(-bound, bound);

        let weight = Array2::random_using((out_channels, in_channels * kernel_size), dist, rng);
        let bias = Array1::random_using(out_channels, dist, rng);

        Self {
            weight,
            bias,
            in_channels,
            out_channels,
            kernel_size,
        }
    }

    pub fn from_weights(weight: Array2<f64>, bias: Array1<f64>, kernel_size: usize) -> Self {
        let (out_channels, flat) = weight.dim();
        assert_eq!(flat % kernel_size, 0, "Flattened kernel width must be a multiple of kernel_size");
        assert_eq!(bias.len(), out_channels, "Bias length must equal out_channels");

        Self {
            weight,
            bias,
            in_channels: flat / kernel_size,
            out_channels,
            kernel_size,
        }
    }

    /// Zero padding inserted before the first time step
    pub fn padding_left(&self) -> usize {
        (self.kernel_size - 1) / 2
    }

    /// Forward pass without keeping intermediate values
    ///
    /// # Arguments
    /// * `input` - Tensor of shape (batch, in_channels, length)
    ///
    /// # Returns
    /// * Tensor of shape (batch, out_channels, length)
    pub fn forward(&self, input: &Array3<f64>) -> Array3<f64> {
        self.forward_with_cache(input).0
    }

    pub fn forward_with_cache(&self, input: &Array3<f64>) -> (Array3<f64>, Conv1dCache) {
        let (batch_size, channels, length) = input.dim();
        assert_eq!(channels, self.in_channels,
                  "Input channels {} don't match layer input channels {}",
                  channels, self.in_channels);

        let columns = self.unfold(input);
        let product = self.weight.dot(&columns); // (out_channels, batch * length)

        let output = Array3::from_shape_fn((batch_size, self.out_channels, length), |(b, o, t)| {
            product[[o, b * length + t]] + self.bias[o]
        });

        let cache = Conv1dCache {
            columns,
            batch_size,
            length,
        };
        (output, cache)
    }

    /// Backward pass through the convolution
    ///
    /// # Arguments
    /// * `grad_output` - Gradient w.r.t. output of shape (batch, out_channels, length)
    /// * `cache` - Values stored by `forward_with_cache`
    ///
    /// # Returns
    /// * Tuple of (parameter gradients, gradient w.r.t. input of shape (batch, in_channels, length))
    pub fn backward(&self, grad_output: &Array3<f64>, cache: &Conv1dCache) -> (Conv1dGradients, Array3<f64>) {
        let (batch_size, out_channels, length) = grad_output.dim();
        assert_eq!(out_channels, self.out_channels, "Gradient output channels mismatch");
        assert_eq!((batch_size, length), (cache.batch_size, cache.length), "Cache does not match gradient");

        let grad_flat = Array2::from_shape_fn((out_channels, batch_size * length), |(o, c)| {
            grad_output[[c / length, o, c % length]]
        });

        let weight_grad = grad_flat.dot(&cache.columns.t());
        let bias_grad = grad_flat.sum_axis(Axis(1));
        let columns_grad = self.weight.t().dot(&grad_flat);

        let input_grad = self.fold(&columns_grad, batch_size, length);

        let gradients = Conv1dGradients {
            weight: weight_grad,
            bias: bias_grad,
        };
        (gradients, input_grad)
    }

    /// im2col: one row per (input channel, kernel tap), one column per (sample, time step)
    fn unfold(&self, input: &Array3<f64>) -> Array2<f64> {
        let (batch_size, _, length) = input.dim();
        let pad = self.padding_left();
        let k = self.kernel_size;

        let mut columns = Array2::zeros((self.in_channels * k, batch_size * length));
        for b in 0..batch_size {
            for i in 0..self.in_channels {
                for tap in 0..k {
                    let row = i * k + tap;
                    for t in 0..length {
                        // padded index t + tap maps to original index t + tap - pad
                        let src = t + tap;
                        if src >= pad && src - pad < length {
                            columns[[row, b * length + t]] = input[[b, i, src - pad]];
                        }
                    }
                }
            }
        }
        columns
    }

    /// col2im: scatter-add column gradients back onto the unpadded input
    fn fold(&self, columns: &Array2<f64>, batch_size: usize, length: usize) -> Array3<f64> {
        let pad = self.padding_left();
        let k = self.kernel_size;

        let mut input_grad = Array3::zeros((batch_size, self.in_channels, length));
        for b in 0..batch_size {
            for i in 0..self.in_channels {
                for tap in 0..k {
                    let row = i * k + tap;
                    for t in 0..length {
                        let src = t + tap;
                        if src >= pad && src - pad < length {
                            input_grad[[b, i, src - pad]] += columns[[row, b * length + t]];
                        }
                    }
                }
            }
        }
        input_grad
    }

    /// Update parameters using the provided optimizer
    pub fn update_parameters<O: Optimizer>(&mut self, gradients: &Conv1dGradients, optimizer: &mut O, prefix: &str) {
        optimizer.update(&format!("{}_weight", prefix), self.weight.view_mut().into_dyn(), gradients.weight.view().into_dyn());
        optimizer.update(&format!("{}_bias", prefix), self.bias.view_mut().into_dyn(), gradients.bias.view().into_dyn());
    }

    pub fn num_parameters(&self) -> usize {
        self.weight.len() + self.bias.len()
    }
}
