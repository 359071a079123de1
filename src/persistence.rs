use ndarray::{Array, ArrayBase, Data, Dimension, IxDyn};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{ForecastError, Result};
use crate::models::cnn_network::ConvForecastNetwork;
use crate::params::ModelParams;
use crate::training::EpochLoss;

/// Hyperparameter record (JSON)
pub const MODEL_PARAMS_FNAME: &str = "model_params.save";
/// Weights record (bincode)
pub const MODEL_WTS_FNAME: &str = "model_wts.save";
/// Optional training-run history (JSON)
pub const HISTORY_FNAME: &str = "history.json";

/// Serializable n-dimensional array for persistence
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SerializableArray {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl<S: Data<Elem = f64>, D: Dimension> From<&ArrayBase<S, D>> for SerializableArray {
    fn from(array: &ArrayBase<S, D>) -> Self {
        Self {
            shape: array.shape().to_vec(),
            data: array.iter().cloned().collect(),
        }
    }
}

impl SerializableArray {
    /// Rebuild the array, checking it has exactly `expected` shape
    pub fn into_array<D: Dimension>(self, name: &str, expected: &[usize]) -> Result<Array<f64, D>> {
        if self.shape != expected {
            return Err(ForecastError::shape(format!("tensor {}", name), format!("{:?}", expected), format!("{:?}", self.shape)));
        }
        let array = Array::from_shape_vec(IxDyn(&self.shape), self.data)
            .map_err(|e| ForecastError::shape(format!("tensor {}", name), format!("{:?}", expected), e))?;
        array
            .into_dimensionality::<D>()
            .map_err(|e| ForecastError::shape(format!("tensor {}", name), format!("{:?}", expected), e))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NamedTensor {
    pub name: String,
    pub tensor: SerializableArray,
}

/// Learned weights of a network plus provenance metadata
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ModelState {
    pub version: String,
    pub created_at: String,
    pub tensors: Vec<NamedTensor>,
}

impl From<&ConvForecastNetwork> for ModelState {
    fn from(network: &ConvForecastNetwork) -> Self {
        let block = &network.block;
        let fc = &network.head.fc;
        let tensors = vec![
            named("conv1_weight", &block.conv1.weight),
            named("conv1_bias", &block.conv1.bias),
            named("conv2_weight", &block.conv2.weight),
            named("conv2_bias", &block.conv2.bias),
            named("conv3_weight", &block.conv3.weight),
            named("conv3_bias", &block.conv3.bias),
            named("fc_weight", &fc.weight),
            named("fc_bias", &fc.bias),
        ];

        ModelState {
            version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            tensors,
        }
    }
}

fn named<S: Data<Elem = f64>, D: Dimension>(name: &str, array: &ArrayBase<S, D>) -> NamedTensor {
    NamedTensor {
        name: name.to_string(),
        tensor: array.into(),
    }
}

impl ModelState {
    /// Copy the stored weights into `network`.
    ///
    /// Every tensor must be present with exactly the shape the network's
    /// topology implies; on any mismatch the network is left untouched.
    pub fn apply_to(mut self, network: &mut ConvForecastNetwork) -> Result<()> {
        let block = &network.block;
        let fc = &network.head.fc;

        let conv1_weight = self.take("conv1_weight", block.conv1.weight.shape())?;
        let conv1_bias = self.take("conv1_bias", block.conv1.bias.shape())?;
        let conv2_weight = self.take("conv2_weight", block.conv2.weight.shape())?;
        let conv2_bias = self.take("conv2_bias", block.conv2.bias.shape())?;
        let conv3_weight = self.take("conv3_weight", block.conv3.weight.shape())?;
        let conv3_bias = self.take("conv3_bias", block.conv3.bias.shape())?;
        let fc_weight = self.take("fc_weight", fc.weight.shape())?;
        let fc_bias = self.take("fc_bias", fc.bias.shape())?;

        let block = &mut network.block;
        block.conv1.weight = conv1_weight;
        block.conv1.bias = conv1_bias;
        block.conv2.weight = conv2_weight;
        block.conv2.bias = conv2_bias;
        block.conv3.weight = conv3_weight;
        block.conv3.bias = conv3_bias;
        network.head.fc.weight = fc_weight;
        network.head.fc.bias = fc_bias;
        Ok(())
    }

    fn take<D: Dimension>(&mut self, name: &str, expected: &[usize]) -> Result<Array<f64, D>> {
        let position = self
            .tensors
            .iter()
            .position(|t| t.name == name)
            .ok_or_else(|| ForecastError::shape(format!("tensor {}", name), format!("{:?}", expected), "missing"))?;
        self.tensors.swap_remove(position).tensor.into_array(name, expected)
    }
}

/// Model persistence operations over an artifact directory
pub struct ModelPersistence;

impl ModelPersistence {
    /// Save the hyperparameter record (human-readable JSON)
    pub fn save_params<P: AsRef<Path>>(params: &ModelParams, dir: P) -> Result<()> {
        let json = serde_json::to_string_pretty(params)?;
        let mut file = File::create(dir.as_ref().join(MODEL_PARAMS_FNAME))?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    pub fn load_params<P: AsRef<Path>>(dir: P) -> Result<ModelParams> {
        let path = dir.as_ref().join(MODEL_PARAMS_FNAME);
        if !path.is_file() {
            return Err(ForecastError::ConfigMissing(path));
        }
        let mut contents = String::new();
        File::open(&path)?.read_to_string(&mut contents)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Save the weights record (compact binary)
    pub fn save_weights<P: AsRef<Path>>(network: &ConvForecastNetwork, dir: P) -> Result<()> {
        let state = ModelState::from(network);
        let encoded = bincode::serialize(&state)?;
        let mut file = File::create(dir.as_ref().join(MODEL_WTS_FNAME))?;
        file.write_all(&encoded)?;
        Ok(())
    }

    pub fn load_weights<P: AsRef<Path>>(dir: P) -> Result<ModelState> {
        let path = dir.as_ref().join(MODEL_WTS_FNAME);
        if !path.is_file() {
            return Err(ForecastError::WeightsMissing(path));
        }
        let mut contents = Vec::new();
        File::open(&path)?.read_to_end(&mut contents)?;
        Ok(bincode::deserialize(&contents)?)
    }

    pub fn save_history<P: AsRef<Path>>(losses: &[EpochLoss], dir: P) -> Result<()> {
        let json = serde_json::to_string_pretty(losses)?;
        fs::write(dir.as_ref().join(HISTORY_FNAME), json)?;
        Ok(())
    }

    pub fn load_history<P: AsRef<Path>>(dir: P) -> Result<Vec<EpochLoss>> {
        let contents = fs::read_to_string(dir.as_ref().join(HISTORY_FNAME))?;
        Ok(serde_json::from_str(&contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::activation::Activation;
    use ndarray::{arr2, Array2, Ix2};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::tempdir;

    fn network(seed: u64, decode_len: usize) -> ConvForecastNetwork {
        let mut rng = StdRng::seed_from_u64(seed);
        ConvForecastNetwork::new(2, 10, decode_len, Activation::Relu, &mut rng).unwrap()
    }

    #[test]
    fn test_serializable_array_checks_shape() {
        let stored = SerializableArray::from(&arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]));
        assert_eq!(stored.shape, vec![2, 3]);

        let back: Array2<f64> = stored.clone().into_array("w", &[2, 3]).unwrap();
        assert_eq!(back[[1, 2]], 6.0);

        let err = stored.into_array::<Ix2>("w", &[3, 2]).unwrap_err();
        assert!(matches!(err, ForecastError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_state_transfers_weights() {
        let source = network(1, 4);
        let mut target = network(2, 4);
        assert_ne!(source.head.fc.weight, target.head.fc.weight);

        ModelState::from(&source).apply_to(&mut target).unwrap();
        assert_eq!(source.block.conv2.weight, target.block.conv2.weight);
        assert_eq!(source.head.fc.bias, target.head.fc.bias);
    }

    #[test]
    fn test_state_rejects_other_topology() {
        let source = network(1, 4);
        let mut target = network(2, 3);
        let before = target.head.fc.weight.clone();

        let err = ModelState::from(&source).apply_to(&mut target).unwrap_err();
        assert!(matches!(err, ForecastError::ShapeMismatch { .. }));
        assert_eq!(target.head.fc.weight, before);
    }

    #[test]
    fn test_missing_tensor_is_shape_mismatch() {
        let source = network(1, 4);
        let mut target = network(2, 4);
        let mut state = ModelState::from(&source);
        state.tensors.retain(|t| t.name != "conv3_bias");

        let err = state.apply_to(&mut target).unwrap_err();
        assert!(matches!(err, ForecastError::ShapeMismatch { ref actual, .. } if actual == "missing"));
    }

    #[test]
    fn test_missing_files() {
        let dir = tempdir().unwrap();
        assert!(matches!(ModelPersistence::load_params(dir.path()), Err(ForecastError::ConfigMissing(_))));
        assert!(matches!(ModelPersistence::load_weights(dir.path()), Err(ForecastError::WeightsMissing(_))));
    }

    #[test]
    fn test_weights_file_round_trip() {
        let dir = tempdir().unwrap();
        let source = network(4, 2);
        ModelPersistence::save_weights(&source, dir.path()).unwrap();

        let state = ModelPersistence::load_weights(dir.path()).unwrap();
        assert_eq!(state.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(state.tensors.len(), 8);

        let mut target = network(5, 2);
        state.apply_to(&mut target).unwrap();
        assert_eq!(target.block.conv1.bias, source.block.conv1.bias);
    }

    #[test]
    fn test_history_round_trip() {
        let dir = tempdir().unwrap();
        let losses = vec![EpochLoss { epoch: 0, loss: 0.5 }, EpochLoss { epoch: 1, loss: 0.25 }];
        ModelPersistence::save_history(&losses, dir.path()).unwrap();
        assert_eq!(ModelPersistence::load_history(dir.path()).unwrap(), losses);
    }
}
