use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Zip};
use std::collections::HashMap;

/// Optimizer trait for parameter updates during training
///
/// Parameters of any rank are passed as dynamic-dimension views so that
/// convolution kernels, linear weights and bias vectors share one update path.
pub trait Optimizer {
    fn update(&mut self, param_id: &str, param: ArrayViewMutD<f64>, gradient: ArrayViewD<f64>);
}

/// Per-parameter moment estimates
struct AdamState {
    step: i32,
    m: ArrayD<f64>,
    v: ArrayD<f64>,
}

/// Adam optimizer with adaptive learning rates
///
/// Implements: m_t = β₁m_{t-1} + (1-β₁)g_t
///             v_t = β₂v_{t-1} + (1-β₂)g_t²
///             θ_t = θ_{t-1} - η * m̂_t / (√v̂_t + ε)
/// where m̂_t and v̂_t are bias-corrected estimates. The step counter used
/// for bias correction is tracked per parameter.
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    state: HashMap<String, AdamState>,
}

impl Adam {
    pub const DEFAULT_LEARNING_RATE: f64 = 1e-3;

    pub fn new(learning_rate: f64) -> Self {
        Adam::with_params(learning_rate, 0.9, 0.999, 1e-8)
    }

    pub fn with_params(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Adam {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            state: HashMap::new(),
        }
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }
}

impl Default for Adam {
    fn default() -> Self {
        Adam::new(Adam::DEFAULT_LEARNING_RATE)
    }
}

impl Optimizer for Adam {
    fn update(&mut self, param_id: &str, mut param: ArrayViewMutD<f64>, gradient: ArrayViewD<f64>) {
        let state = self.state.entry(param_id.to_string()).or_insert_with(|| AdamState {
            step: 0,
            m: ArrayD::zeros(gradient.raw_dim()),
            v: ArrayD::zeros(gradient.raw_dim()),
        });
        state.step += 1;

        let (beta1, beta2) = (self.beta1, self.beta2);
        let bias_correction1 = 1.0 - beta1.powi(state.step);
        let bias_correction2 = 1.0 - beta2.powi(state.step);
        let (lr, eps) = (self.learning_rate, self.epsilon);

        Zip::from(&mut param)
            .and(&gradient)
            .and(&mut state.m)
            .and(&mut state.v)
            .for_each(|p, &g, m, v| {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let m_hat = *m / bias_correction1;
                let v_hat = *v / bias_correction2;
                *p -= lr * m_hat / (v_hat.sqrt() + eps);
            });
    }
}
