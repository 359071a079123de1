use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{ForecastError, Result};
use crate::layers::activation::Activation;
use crate::models::cnn_network::validate_dimensions;
use crate::windowing::WindowSpec;

/// Hyperparameter keys understood by [`ModelParams::from_hyperparameters`]
pub const RECOGNIZED_KEYS: [&str; 1] = ["activation"];

/// Hyperparameter set fully determining the network topology
///
/// This is also the hyperparameter record written next to the weights, so
/// two equal `ModelParams` always describe interchangeable networks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelParams {
    pub encode_len: usize,
    pub decode_len: usize,
    pub feat_dim: usize,
    pub activation: String,
}

impl ModelParams {
    pub fn new(encode_len: usize, decode_len: usize, feat_dim: usize, activation: impl Into<String>) -> Self {
        ModelParams {
            encode_len,
            decode_len,
            feat_dim,
            activation: activation.into(),
        }
    }

    /// Build from window geometry plus a caller-supplied hyperparameter map.
    ///
    /// `activation` is required and must be a string; other keys are ignored
    /// with a warning.
    pub fn from_hyperparameters(
        encode_len: usize,
        decode_len: usize,
        feat_dim: usize,
        hyperparameters: &Map<String, Value>,
    ) -> Result<Self> {
        for key in hyperparameters.keys() {
            if !RECOGNIZED_KEYS.contains(&key.as_str()) {
                warn!(key = %key, "ignoring unrecognized hyperparameter");
            }
        }

        let activation = match hyperparameters.get("activation") {
            Some(Value::String(name)) => name.clone(),
            Some(other) => {
                return Err(ForecastError::InvalidConfig(format!(
                    "hyperparameter 'activation' must be a string, found {}",
                    other
                )))
            }
            None => {
                return Err(ForecastError::InvalidConfig(
                    "missing required hyperparameter 'activation'".to_string(),
                ))
            }
        };

        let params = ModelParams::new(encode_len, decode_len, feat_dim, activation);
        params.validate()?;
        Ok(params)
    }

    /// Check the set without allocating anything; the activation name is
    /// checked before the dimensions.
    pub fn validate(&self) -> Result<Activation> {
        let activation = self.activation.parse::<Activation>()?;
        validate_dimensions(self.feat_dim, self.encode_len, self.decode_len)?;
        Ok(activation)
    }

    pub fn window_spec(&self) -> WindowSpec {
        WindowSpec {
            encode_len: self.encode_len,
            decode_len: self.decode_len,
            feat_dim: self.feat_dim,
        }
    }
}
