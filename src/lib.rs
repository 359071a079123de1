//! # CNN Forecaster
//!
//! A convolutional sequence-to-sequence forecaster for multivariate time
//! series: given a history window of shape (encode_len, feat_dim) it predicts
//! the next decode_len values of feature 0.
//!
//! ## Core Components
//!
//! - **Windowing**: splits raw (N, T, D) arrays into history/target pairs and batches them
//! - **Sequence Block**: three stacked "same"-padded 1-D convolutions (100, 50, 25 channels)
//! - **Forecast Head**: activation-gated linear projection of the decode-window features
//! - **Training**: Adam + MSE mini-batch training with size-adaptive early stopping
//! - **Persistence**: hyperparameter and weight records written as two separate files
//! - **Forecaster**: the facade tying everything together behind fit/predict/evaluate/save/load
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cnn_forecaster::{Forecaster, ModelParams};
//! use ndarray::Array3;
//!
//! // 200 series of 20 steps with one feature: 15 steps of history, 5 to forecast
//! let data = Array3::from_shape_fn((200, 20, 1), |(i, t, _)| ((i + t) as f64 * 0.3).sin());
//! let mut model = Forecaster::new(ModelParams::new(15, 5, 1, "relu")).unwrap();
//! let history = model.fit(&data, None, 50, false).unwrap();
//! let forecast = model.predict(&data).unwrap(); // (200, 5, 1)
//! ```

pub mod error;
pub mod utils;
pub mod device;
pub mod layers;
pub mod models;
pub mod windowing;
pub mod loss;
pub mod optimizers;
pub mod training;
pub mod params;
pub mod persistence;
pub mod forecaster;

// Re-export commonly used items
pub use error::{ForecastError, Result};
pub use device::Device;
pub use layers::activation::Activation;
pub use models::cnn_network::ConvForecastNetwork;
pub use windowing::{extract, WindowMode, WindowSpec, WindowedData};
pub use training::{EpochLoss, ForecastTrainer, LossSignal, StopReason, TrainingConfig, TrainingHistory};
pub use optimizers::Adam;
pub use loss::MSELoss;
pub use params::ModelParams;
pub use persistence::{ModelPersistence, ModelState, MODEL_PARAMS_FNAME, MODEL_WTS_FNAME, HISTORY_FNAME};
pub use forecaster::{
    Forecaster, MODEL_NAME, train_predictor_model, predict_with_model, save_predictor_model,
    load_predictor_model, evaluate_predictor_model,
};
