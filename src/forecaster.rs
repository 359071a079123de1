//! Forecaster facade: windowing, network, training and persistence behind a
//! fit/predict/evaluate/save/load contract.

use ndarray::{s, Array3, ArrayBase, ArrayView3, Axis, Data, Ix3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{ForecastError, Result};
use crate::loss::MSELoss;
use crate::models::cnn_network::ConvForecastNetwork;
use crate::optimizers::Adam;
use crate::params::ModelParams;
use crate::persistence::ModelPersistence;
use crate::training::{evaluate_loss, ForecastTrainer, TrainingConfig, TrainingHistory};
use crate::windowing::{extract, Batches, WindowMode, WindowSpec, WindowedData};

pub const MODEL_NAME: &str = "CNN_Timeseries_Forecaster";

/// Convolutional time-series forecaster
///
/// Owns its network and optimizer exclusively. All operations are
/// synchronous; `fit` needs `&mut self`, so the borrow checker rules out
/// concurrent training and inference on one instance.
pub struct Forecaster {
    params: ModelParams,
    network: ConvForecastNetwork,
    optimizer: Adam,
    loss_function: MSELoss,
    device: Device,
    training_config: TrainingConfig,
    history: Option<TrainingHistory>,
}

impl Forecaster {
    /// Batch size for training and prediction
    pub const BATCH_SIZE: usize = 64;
    /// Batch size for `evaluate`
    pub const EVAL_BATCH_SIZE: usize = 32;

    /// Build an untrained forecaster on the auto-detected device
    pub fn new(params: ModelParams) -> Result<Self> {
        Self::build(params, Device::auto(), &mut StdRng::from_entropy())
    }

    pub fn with_device(params: ModelParams, device: Device) -> Result<Self> {
        Self::build(params, device, &mut StdRng::from_entropy())
    }

    /// Build with a reproducible weight initialisation
    pub fn with_seed(params: ModelParams, seed: u64) -> Result<Self> {
        Self::build(params, Device::auto(), &mut StdRng::seed_from_u64(seed))
    }

    fn build(params: ModelParams, device: Device, rng: &mut StdRng) -> Result<Self> {
        // activation is checked before any tensor is allocated
        let activation = params.validate()?;
        let network = ConvForecastNetwork::new(params.feat_dim, params.encode_len, params.decode_len, activation, rng)?;

        debug!(
            encode_len = params.encode_len,
            decode_len = params.decode_len,
            feat_dim = params.feat_dim,
            activation = %activation,
            device = %device,
            parameters = network.num_parameters(),
            "built forecaster"
        );

        Ok(Forecaster {
            params,
            network,
            optimizer: Adam::default(),
            loss_function: MSELoss,
            device,
            training_config: TrainingConfig {
                batch_size: Self::BATCH_SIZE,
                ..TrainingConfig::default()
            },
            history: None,
        })
    }

    /// Defaults applied by `fit` (its own `max_epochs`/`verbose` still win)
    pub fn with_training_config(mut self, config: TrainingConfig) -> Self {
        self.training_config = config;
        self
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    pub fn encode_len(&self) -> usize {
        self.params.encode_len
    }

    pub fn decode_len(&self) -> usize {
        self.params.decode_len
    }

    pub fn feat_dim(&self) -> usize {
        self.params.feat_dim
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn network(&self) -> &ConvForecastNetwork {
        &self.network
    }

    /// History of the most recent `fit` call
    pub fn history(&self) -> Option<&TrainingHistory> {
        self.history.as_ref()
    }

    pub fn num_parameters(&self) -> usize {
        self.network.num_parameters()
    }

    fn window_spec(&self) -> WindowSpec {
        self.params.window_spec()
    }

    /// Train on (N, encode_len + decode_len, feat_dim) windows
    pub fn fit<S: Data<Elem = f64>>(
        &mut self,
        train_data: &ArrayBase<S, Ix3>,
        valid_data: Option<ArrayView3<'_, f64>>,
        max_epochs: usize,
        verbose: bool,
    ) -> Result<TrainingHistory> {
        let config = TrainingConfig {
            max_epochs,
            verbose,
            ..self.training_config.clone()
        };
        self.fit_with_config(train_data, valid_data, config)
    }

    pub fn fit_with_config<S: Data<Elem = f64>>(
        &mut self,
        train_data: &ArrayBase<S, Ix3>,
        valid_data: Option<ArrayView3<'_, f64>>,
        config: TrainingConfig,
    ) -> Result<TrainingHistory> {
        let spec = self.window_spec();
        let train = extract(train_data, WindowMode::Train, &spec)?;
        let valid = match valid_data {
            Some(data) => Some(extract(&data, WindowMode::Train, &spec)?),
            None => None,
        };

        let history = ForecastTrainer::new(&mut self.network, &mut self.optimizer, self.loss_function)
            .with_config(config)
            .train(&train, valid.as_ref())?;

        info!(
            epochs = history.len(),
            final_loss = history.final_loss().unwrap_or(f64::NAN),
            stopped_early = history.stopped_early(),
            "training finished"
        );
        self.history = Some(history.clone());
        Ok(history)
    }

    /// Forecast the next `decode_len` steps of feature 0.
    ///
    /// Accepts (N, >= encode_len, feat_dim) and returns (N, decode_len, 1),
    /// rows in input order.
    pub fn predict<S: Data<Elem = f64>>(&self, data: &ArrayBase<S, Ix3>) -> Result<Array3<f64>> {
        let windows = extract(data, WindowMode::Infer, &self.window_spec())?;
        self.predict_windows(&windows)
    }

    fn predict_windows(&self, windows: &WindowedData) -> Result<Array3<f64>> {
        let mut forecasts = Array3::zeros((windows.len(), self.params.decode_len, 1));
        let mut start = 0;
        for batch in Batches::new(windows, Self::BATCH_SIZE)?.sequential() {
            let end = start + batch.history.len_of(Axis(0));
            let predictions = self.network.forward(&batch.history);
            forecasts.slice_mut(s![start..end, .., 0]).assign(&predictions);
            start = end;
        }
        Ok(forecasts)
    }

    /// Mean squared error over (N, encode_len + decode_len, feat_dim) windows
    pub fn evaluate<S: Data<Elem = f64>>(&self, test_data: &ArrayBase<S, Ix3>) -> Result<f64> {
        let windows = extract(test_data, WindowMode::Train, &self.window_spec())?;
        evaluate_loss(&self.network, &self.loss_function, &windows, Self::EVAL_BATCH_SIZE)
    }

    /// Write the hyperparameter and weights records under `dir`, creating it if absent
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        ModelPersistence::save_params(&self.params, dir)?;
        ModelPersistence::save_weights(&self.network, dir)?;
        debug!(path = %dir.display(), "saved forecaster");
        Ok(())
    }

    /// Write the most recent training history, if there is one
    pub fn save_history<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        match &self.history {
            Some(history) => {
                fs::create_dir_all(dir.as_ref())?;
                ModelPersistence::save_history(&history.losses, dir)
            }
            None => Ok(()),
        }
    }

    /// Rebuild a forecaster from the records written by `save`
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let params = ModelPersistence::load_params(dir)?;
        let mut forecaster = Forecaster::new(params)?;
        let state = ModelPersistence::load_weights(dir)?;
        state.apply_to(&mut forecaster.network)?;
        debug!(path = %dir.display(), "loaded forecaster");
        Ok(forecaster)
    }
}

impl fmt::Display for Forecaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Model name: {}", MODEL_NAME)
    }
}

impl fmt::Debug for Forecaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forecaster")
            .field("params", &self.params)
            .field("device", &self.device)
            .field("learning_rate", &self.optimizer.learning_rate())
            .field("parameters", &self.num_parameters())
            .finish()
    }
}

/// Build and train a forecaster on `history` (N, T, D), forecasting the
/// last `forecast_length` steps; no validation set is used.
pub fn train_predictor_model<S: Data<Elem = f64>>(
    history: &ArrayBase<S, Ix3>,
    forecast_length: usize,
    hyperparameters: &Map<String, Value>,
) -> Result<Forecaster> {
    let (_, time_steps, feat_dim) = history.dim();
    if forecast_length >= time_steps {
        return Err(ForecastError::shape(
            "history length (must exceed forecast length)",
            format!("> {}", forecast_length),
            time_steps,
        ));
    }
    let params = ModelParams::from_hyperparameters(time_steps - forecast_length, forecast_length, feat_dim, hyperparameters)?;
    let mut model = Forecaster::new(params)?;
    let defaults = TrainingConfig::default();
    model.fit(history, None, defaults.max_epochs, defaults.verbose)?;
    Ok(model)
}

pub fn predict_with_model<S: Data<Elem = f64>>(model: &Forecaster, test_data: &ArrayBase<S, Ix3>) -> Result<Array3<f64>> {
    model.predict(test_data)
}

pub fn save_predictor_model<P: AsRef<Path>>(model: &Forecaster, predictor_dir_path: P) -> Result<()> {
    model.save(predictor_dir_path)
}

pub fn load_predictor_model<P: AsRef<Path>>(predictor_dir_path: P) -> Result<Forecaster> {
    Forecaster::load(predictor_dir_path)
}

pub fn evaluate_predictor_model<S: Data<Elem = f64>>(model: &Forecaster, test_data: &ArrayBase<S, Ix3>) -> Result<f64> {
    model.evaluate(test_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sine(n: usize, t: usize) -> Array3<f64> {
        Array3::from_shape_fn((n, t, 1), |(i, j, _)| ((i as f64) * 0.3 + (j as f64) * 0.5).sin())
    }

    #[test]
    fn test_construction_errors() {
        let err = Forecaster::new(ModelParams::new(15, 5, 1, "sigmoid")).unwrap_err();
        assert!(matches!(err, ForecastError::UnrecognizedActivation(_)));

        let err = Forecaster::new(ModelParams::new(4, 5, 1, "relu")).unwrap_err();
        assert!(matches!(err, ForecastError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_predict_shape_and_order() {
        let model = Forecaster::with_seed(ModelParams::new(10, 3, 1, "relu"), 1).unwrap();
        let data = sine(70, 12);
        let forecasts = model.predict(&data).unwrap();
        assert_eq!(forecasts.dim(), (70, 3, 1));

        // row 65 sits in the second batch; predicting it alone must agree
        let single = model.predict(&data.slice(s![65..66, .., ..])).unwrap();
        for step in 0..3 {
            assert!((single[[0, step, 0]] - forecasts[[65, step, 0]]).abs() < 1e-10);
        }
    }

    #[test]
    fn test_predict_requires_history() {
        let model = Forecaster::with_seed(ModelParams::new(10, 3, 1, "relu"), 1).unwrap();
        let err = model.predict(&sine(2, 9)).unwrap_err();
        assert!(matches!(err, ForecastError::InsufficientHistory { required: 10, actual: 9 }));
    }

    #[test]
    fn test_display() {
        let model = Forecaster::with_seed(ModelParams::new(10, 3, 1, "none"), 1).unwrap();
        assert_eq!(model.to_string(), "Model name: CNN_Timeseries_Forecaster");

        let debug = format!("{:?}", model);
        assert!(debug.contains("learning_rate: 0.001"));
    }

    #[test]
    fn test_train_predictor_model_derives_windows() {
        let hp = json!({"activation": "tanh"}).as_object().cloned().unwrap();
        let err = train_predictor_model(&sine(4, 5), 5, &hp).unwrap_err();
        assert!(matches!(err, ForecastError::ShapeMismatch { .. }));

        let err = train_predictor_model(&sine(4, 12), 7, &hp).unwrap_err();
        assert!(matches!(err, ForecastError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_save_history_without_fit_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let model = Forecaster::with_seed(ModelParams::new(10, 3, 1, "relu"), 1).unwrap();
        model.save_history(dir.path()).unwrap();
        assert!(!dir.path().join(crate::persistence::HISTORY_FNAME).exists());
    }
}
