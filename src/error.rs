//! Error types for the forecaster.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`ForecastError`].
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Errors raised by windowing, construction, training and persistence.
///
/// Every variant is fatal for the operation that produced it; nothing in
/// the crate retries or pads its way around a failure.
#[derive(Error, Debug)]
pub enum ForecastError {
    /// Array dimension disagreement (feature count, sequence length,
    /// decode/encode lengths, weight tensor shapes).
    #[error("Shape mismatch in {context}: expected {expected}, found {actual}")]
    ShapeMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    /// Inference input shorter than the encode window.
    #[error("Insufficient history: expected at least {required} time steps, found {actual}")]
    InsufficientHistory { required: usize, actual: usize },

    #[error("Unrecognized activation type: {0}. Must be one of ['relu', 'tanh', 'none']")]
    UnrecognizedActivation(String),

    /// Hyperparameter or training configuration that cannot produce a model.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Hyperparameter record not found at {0}")]
    ConfigMissing(PathBuf),

    #[error("Weights record not found at {0}")]
    WeightsMissing(PathBuf),

    /// Raised only when `TrainingConfig::fail_on_non_finite` is set.
    #[error("Non-finite loss {loss} at epoch {epoch}")]
    NonFiniteLoss { epoch: usize, loss: f64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ForecastError {
    pub(crate) fn shape(
        context: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        ForecastError::ShapeMismatch {
            context: context.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(error: serde_json::Error) -> Self {
        ForecastError::Serialization(error.to_string())
    }
}

impl From<bincode::Error> for ForecastError {
    fn from(error: bincode::Error) -> Self {
        ForecastError::Serialization(error.to_string())
    }
}
