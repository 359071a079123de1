use cnn_forecaster::utils::patience_factor;
use cnn_forecaster::{Forecaster, LossSignal, ModelParams, StopReason, TrainingConfig};
use ndarray::Array3;

fn noise_like(n: usize, t: usize) -> Array3<f64> {
    // deterministic but hard to learn: early stopping should kick in
    Array3::from_shape_fn((n, t, 1), |(i, j, _)| (((i * 7919 + j * 104_729) % 97) as f64 / 48.5) - 1.0)
}

/// Patience schedule follows the size heuristic
#[test]
fn test_patience_schedule() {
    assert_eq!(patience_factor(50), 30);
    assert!(patience_factor(1000) < patience_factor(100));
    assert!(patience_factor(100) <= 30);
}

/// Even with a tiny patience, no stop happens before epoch 10
#[test]
fn test_minimum_epoch_floor() {
    let mut model = Forecaster::with_seed(ModelParams::new(8, 2, 1, "relu"), 4).unwrap();
    let config = TrainingConfig {
        max_epochs: 30,
        patience: Some(1),
        seed: Some(9),
        verbose: false,
        ..TrainingConfig::default()
    };

    let history = model.fit_with_config(&noise_like(40, 10), None, config).unwrap();

    match history.stop_reason {
        StopReason::EarlyStopped { epoch } => {
            assert!(epoch >= 10, "stopped at epoch {}", epoch);
            assert_eq!(history.len(), epoch + 1);
        }
        StopReason::MaxEpochsReached => assert_eq!(history.len(), 30),
    }
    assert!(history.len() >= 11);
}

/// Reaching max_epochs records every epoch in order
#[test]
fn test_max_epochs_reached() {
    let mut model = Forecaster::with_seed(ModelParams::new(8, 2, 1, "tanh"), 4).unwrap();
    let history = model.fit(&noise_like(20, 10), None, 6, false).unwrap();

    assert_eq!(history.stop_reason, StopReason::MaxEpochsReached);
    let epochs: Vec<usize> = history.losses.iter().map(|l| l.epoch).collect();
    assert_eq!(epochs, (0..6).collect::<Vec<_>>());
    assert_eq!(model.history().unwrap(), &history);
}

/// Counters reset between fit calls on one forecaster
#[test]
fn test_each_fit_starts_fresh() {
    let mut model = Forecaster::with_seed(ModelParams::new(8, 2, 1, "relu"), 4).unwrap();
    let config = TrainingConfig {
        max_epochs: 25,
        patience: Some(1),
        seed: Some(2),
        verbose: false,
        ..TrainingConfig::default()
    };
    let data = noise_like(30, 10);

    let first = model.fit_with_config(&data, None, config.clone()).unwrap();
    let second = model.fit_with_config(&data, None, config).unwrap();

    // a carried-over stagnation counter would allow stopping before the floor
    for history in [&first, &second] {
        if let StopReason::EarlyStopped { epoch } = history.stop_reason {
            assert!(epoch >= 10);
        }
        assert_eq!(history.losses[0].epoch, 0);
    }
}

/// Validation loss drives stopping when supplied
#[test]
fn test_validation_signal_with_epoch_mean_option() {
    let mut model = Forecaster::with_seed(ModelParams::new(8, 2, 1, "none"), 4).unwrap();
    let config = TrainingConfig {
        max_epochs: 4,
        batch_size: 16,
        loss_signal: LossSignal::EpochMean,
        seed: Some(6),
        verbose: false,
        ..TrainingConfig::default()
    };
    let train = noise_like(50, 10);
    let valid = noise_like(12, 10);

    let history = model.fit_with_config(&train, Some(valid.view()), config).unwrap();
    assert_eq!(history.len(), 4);

    let evaluated = model.evaluate(&valid).unwrap();
    assert!(history.final_loss().unwrap().is_finite());
    assert!(evaluated.is_finite());
}
