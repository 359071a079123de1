use std::fmt;
use std::str::FromStr;

use ndarray::{Array, Dimension, Zip};

use crate::error::ForecastError;
use crate::utils::{relu, tanh};

/// Elementwise gate applied to the flattened decode-window features
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    Relu,
    Tanh,
    /// Identity
    None,
}

impl Activation {
    pub fn name(&self) -> &'static str {
        match self {
            Activation::Relu => "relu",
            Activation::Tanh => "tanh",
            Activation::None => "none",
        }
    }

    pub fn apply<D: Dimension>(&self, x: &Array<f64, D>) -> Array<f64, D> {
        match self {
            Activation::Relu => x.mapv(relu),
            Activation::Tanh => x.mapv(tanh),
            Activation::None => x.clone(),
        }
    }

    /// Backpropagate through the activation given its pre-activation input.
    pub fn backward<D: Dimension>(
        &self,
        pre_activation: &Array<f64, D>,
        grad_output: &Array<f64, D>,
    ) -> Array<f64, D> {
        match self {
            Activation::Relu => Zip::from(pre_activation)
                .and(grad_output)
                .map_collect(|&x, &g| if x > 0.0 { g } else { 0.0 }),
            Activation::Tanh => Zip::from(pre_activation)
                .and(grad_output)
                .map_collect(|&x, &g| {
                    let t = x.tanh();
                    g * (1.0 - t * t)
                }),
            Activation::None => grad_output.clone(),
        }
    }
}

impl FromStr for Activation {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relu" => Ok(Activation::Relu),
            "tanh" => Ok(Activation::Tanh),
            "none" => Ok(Activation::None),
            other => Err(ForecastError::UnrecognizedActivation(other.to_string())),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
