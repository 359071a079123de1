use ndarray::Array3;
use rand::Rng;

use crate::layers::conv1d::{Conv1dCache, Conv1dGradients, Conv1dLayer};
use crate::optimizers::Optimizer;

/// Output channels of the three stacked convolutions
pub const CHANNELS: [usize; 3] = [100, 50, 25];
/// Kernel widths of the three stacked convolutions
pub const KERNEL_SIZES: [usize; 3] = [4, 8, 16];

#[derive(Clone, Debug)]
pub struct SequenceBlockCache {
    pub conv1: Conv1dCache,
    pub conv2: Conv1dCache,
    pub conv3: Conv1dCache,
}

#[derive(Clone, Debug)]
pub struct SequenceBlockGradients {
    pub conv1: Conv1dGradients,
    pub conv2: Conv1dGradients,
    pub conv3: Conv1dGradients,
}

/// Temporal feature extractor: feat_dim -> 100 -> 50 -> 25 channels
///
/// Three length-preserving convolutions with widening kernels. There is no
/// nonlinearity between them; the only gate is applied later by the head.
/// Inputs and outputs are time-major (batch, length, channels); the
/// convolutions run on a channel-first copy.
#[derive(Clone, Debug)]
pub struct SequenceBlock {
    pub conv1: Conv1dLayer,
    pub conv2: Conv1dLayer,
    pub conv3: Conv1dLayer,
}

impl SequenceBlock {
    pub fn new<R: Rng + ?Sized>(feat_dim: usize, rng: &mut R) -> Self {
        SequenceBlock {
            conv1: Conv1dLayer::new(feat_dim, CHANNELS[0], KERNEL_SIZES[0], rng),
            conv2: Conv1dLayer::new(CHANNELS[0], CHANNELS[1], KERNEL_SIZES[1], rng),
            conv3: Conv1dLayer::new(CHANNELS[1], CHANNELS[2], KERNEL_SIZES[2], rng),
        }
    }

    pub fn output_channels(&self) -> usize {
        self.conv3.out_channels
    }

    /// (batch, length, feat_dim) -> (batch, length, 25)
    pub fn forward(&self, input: &Array3<f64>) -> Array3<f64> {
        let x = swap_time_channels(input);
        let x = self.conv1.forward(&x);
        let x = self.conv2.forward(&x);
        let x = self.conv3.forward(&x);
        swap_time_channels(&x)
    }

    pub fn forward_with_cache(&self, input: &Array3<f64>) -> (Array3<f64>, SequenceBlockCache) {
        let x = swap_time_channels(input);
        let (x, conv1) = self.conv1.forward_with_cache(&x);
        let (x, conv2) = self.conv2.forward_with_cache(&x);
        let (x, conv3) = self.conv3.forward_with_cache(&x);
        (swap_time_channels(&x), SequenceBlockCache { conv1, conv2, conv3 })
    }

    /// Backpropagate a time-major gradient of shape (batch, length, 25).
    /// The gradient w.r.t. the raw input is not needed and is dropped.
    pub fn backward(&self, grad_output: &Array3<f64>, cache: &SequenceBlockCache) -> SequenceBlockGradients {
        let grad = swap_time_channels(grad_output);
        let (conv3, grad) = self.conv3.backward(&grad, &cache.conv3);
        let (conv2, grad) = self.conv2.backward(&grad, &cache.conv2);
        let (conv1, _) = self.conv1.backward(&grad, &cache.conv1);
        SequenceBlockGradients { conv1, conv2, conv3 }
    }

    pub fn update_parameters<O: Optimizer>(&mut self, gradients: &SequenceBlockGradients, optimizer: &mut O) {
        self.conv1.update_parameters(&gradients.conv1, optimizer, "conv1");
        self.conv2.update_parameters(&gradients.conv2, optimizer, "conv2");
        self.conv3.update_parameters(&gradients.conv3, optimizer, "conv3");
    }

    pub fn num_parameters(&self) -> usize {
        self.conv1.num_parameters() + self.conv2.num_parameters() + self.conv3.num_parameters()
    }
}

/// (batch, a, b) -> (batch, b, a) in standard layout
fn swap_time_channels(x: &Array3<f64>) -> Array3<f64> {
    x.view().permuted_axes([0, 2, 1]).as_standard_layout().into_owned()
}
