use ndarray::{Array2, Array3};
use rand::Rng;

use crate::error::{ForecastError, Result};
use crate::layers::activation::Activation;
use crate::layers::linear::LinearGradients;
use crate::models::forecast_head::{ForecastHead, ForecastHeadCache};
use crate::models::sequence_block::{SequenceBlock, SequenceBlockCache, SequenceBlockGradients};
use crate::optimizers::Optimizer;

/// Holds cached values for both stages during a training forward pass
#[derive(Clone, Debug)]
pub struct NetworkCache {
    pub block: SequenceBlockCache,
    pub head: ForecastHeadCache,
}

#[derive(Clone, Debug)]
pub struct NetworkGradients {
    pub block: SequenceBlockGradients,
    pub head: LinearGradients,
}

/// Convolutional sequence-to-sequence forecaster network
///
/// Maps a (batch, encode_len, feat_dim) history window to a
/// (batch, decode_len) point forecast of feature 0. The topology is fully
/// determined by (feat_dim, encode_len, decode_len, activation).
#[derive(Clone, Debug)]
pub struct ConvForecastNetwork {
    pub block: SequenceBlock,
    pub head: ForecastHead,
    pub feat_dim: usize,
    pub encode_len: usize,
    pub decode_len: usize,
}

impl ConvForecastNetwork {
    /// Build a freshly initialised network.
    ///
    /// Fails with `ShapeMismatch` when `decode_len > encode_len` and with
    /// `InvalidConfig` when any dimension is zero.
    pub fn new<R: Rng + ?Sized>(
        feat_dim: usize,
        encode_len: usize,
        decode_len: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Result<Self> {
        validate_dimensions(feat_dim, encode_len, decode_len)?;

        let block = SequenceBlock::new(feat_dim, rng);
        let head = ForecastHead::new(decode_len, block.output_channels(), activation, rng);

        Ok(ConvForecastNetwork {
            block,
            head,
            feat_dim,
            encode_len,
            decode_len,
        })
    }

    pub fn activation(&self) -> Activation {
        self.head.activation
    }

    /// Inference forward pass; keeps nothing for backpropagation
    pub fn forward(&self, input: &Array3<f64>) -> Array2<f64> {
        let features = self.block.forward(input);
        self.head.forward(&features)
    }

    pub fn forward_with_cache(&self, input: &Array3<f64>) -> (Array2<f64>, NetworkCache) {
        let (features, block) = self.block.forward_with_cache(input);
        let (output, head) = self.head.forward_with_cache(&features);
        (output, NetworkCache { block, head })
    }

    /// Backpropagate the loss gradient w.r.t. the (batch, decode_len) output
    pub fn backward(&self, grad_output: &Array2<f64>, cache: &NetworkCache) -> NetworkGradients {
        let (head, grad_features) = self.head.backward(grad_output, &cache.head);
        let block = self.block.backward(&grad_features, &cache.block);
        NetworkGradients { block, head }
    }

    pub fn update_parameters<O: Optimizer>(&mut self, gradients: &NetworkGradients, optimizer: &mut O) {
        self.block.update_parameters(&gradients.block, optimizer);
        self.head.update_parameters(&gradients.head, optimizer);
    }

    /// Total number of learned scalars
    pub fn num_parameters(&self) -> usize {
        self.block.num_parameters() + self.head.num_parameters()
    }
}

pub(crate) fn validate_dimensions(feat_dim: usize, encode_len: usize, decode_len: usize) -> Result<()> {
    if feat_dim == 0 || encode_len == 0 || decode_len == 0 {
        return Err(ForecastError::InvalidConfig(format!(
            "encode_len, decode_len and feat_dim must be positive (got {}, {}, {})",
            encode_len, decode_len, feat_dim
        )));
    }
    if decode_len > encode_len {
        return Err(ForecastError::shape(
            "decode_len (must not exceed encode_len)",
            format!("<= {}", encode_len),
            decode_len,
        ));
    }
    Ok(())
}
