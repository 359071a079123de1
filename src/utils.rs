/// Numeric helpers shared by layers and training.

/// Rectified linear unit: relu(x) = max(0, x)
pub fn relu(x: f64) -> f64 {
    if x > 0.0 { x } else { 0.0 }
}

/// Hyperbolic tangent activation: tanh(x) = (e^x - e^(-x)) / (e^x + e^(-x))
pub fn tanh(x: f64) -> f64 {
    x.tanh()
}

/// Early-stopping patience for a training set of `n` instances.
///
/// Small sets get a flat 30 epochs; from 100 instances on, patience
/// shrinks as floor(37 - log_1.5(n)).
pub fn patience_factor(n: usize) -> usize {
    if n < 100 {
        return 30;
    }
    let patience = (37.0 - (n as f64).ln() / 1.5f64.ln()).floor();
    patience.max(0.0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relu() {
        assert_eq!(relu(-2.0), 0.0);
        assert_eq!(relu(0.0), 0.0);
        assert_eq!(relu(3.5), 3.5);
    }

    #[test]
    fn test_tanh() {
        assert!((tanh(0.0) - 0.0).abs() < 1e-10);
        assert!(tanh(1000.0) > 0.99);
        assert!(tanh(-1000.0) < -0.99);
    }

    #[test]
    fn test_patience_small_datasets() {
        assert_eq!(patience_factor(0), 30);
        assert_eq!(patience_factor(50), 30);
        assert_eq!(patience_factor(99), 30);
    }

    #[test]
    fn test_patience_shrinks_with_size() {
        // log_1.5(100) ~ 11.36, log_1.5(1000) ~ 17.04
        assert_eq!(patience_factor(100), 25);
        assert_eq!(patience_factor(1000), 19);
        assert!(patience_factor(1000) < patience_factor(100));
        assert!(patience_factor(100_000) < patience_factor(1000));
    }
}
