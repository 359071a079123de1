use ndarray::{Array2, Array3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

use crate::error::{ForecastError, Result};
use crate::loss::LossFunction;
use crate::models::cnn_network::ConvForecastNetwork;
use crate::optimizers::Optimizer;
use crate::utils::patience_factor;
use crate::windowing::{Batches, WindowedData};

/// Which per-epoch value drives early stopping when no validation set is given
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LossSignal {
    /// Loss of the final mini-batch of the epoch
    #[default]
    LastBatch,
    /// Mean of every mini-batch loss of the epoch
    EpochMean,
}

/// Configuration for training hyperparameters
#[derive(Clone, Debug)]
pub struct TrainingConfig {
    pub max_epochs: usize,
    pub batch_size: usize,
    /// Early stopping never fires before this epoch index
    pub min_epochs: usize,
    /// Fixed patience; derived from the training-set size when `None`
    pub patience: Option<usize>,
    pub loss_signal: LossSignal,
    /// Abort with `NonFiniteLoss` instead of training through NaN/Inf
    pub fail_on_non_finite: bool,
    /// Seed for the per-epoch shuffle
    pub seed: Option<u64>,
    pub verbose: bool,
    pub print_every: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            max_epochs: 100,
            batch_size: 64,
            min_epochs: 10,
            patience: None,
            loss_signal: LossSignal::LastBatch,
            fail_on_non_finite: false,
            seed: None,
            verbose: true,
            print_every: 1,
        }
    }
}

/// One recorded epoch
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpochLoss {
    pub epoch: usize,
    pub loss: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    EarlyStopped { epoch: usize },
    MaxEpochsReached,
}

/// Per-epoch loss record of one `train` call
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingHistory {
    pub losses: Vec<EpochLoss>,
    pub stop_reason: StopReason,
    pub patience: usize,
}

impl TrainingHistory {
    pub fn len(&self) -> usize {
        self.losses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.losses.is_empty()
    }

    pub fn first_loss(&self) -> Option<f64> {
        self.losses.first().map(|l| l.loss)
    }

    pub fn final_loss(&self) -> Option<f64> {
        self.losses.last().map(|l| l.loss)
    }

    pub fn stopped_early(&self) -> bool {
        matches!(self.stop_reason, StopReason::EarlyStopped { .. })
    }
}

/// Trainer driving a network and optimizer it borrows from its owner
///
/// Early-stopping counters live inside `train`, so every call starts from a
/// clean slate even when the same network is trained repeatedly.
pub struct ForecastTrainer<'a, L: LossFunction, O: Optimizer> {
    pub network: &'a mut ConvForecastNetwork,
    pub optimizer: &'a mut O,
    pub loss_function: L,
    pub config: TrainingConfig,
}

impl<'a, L: LossFunction, O: Optimizer> ForecastTrainer<'a, L, O> {
    pub fn new(network: &'a mut ConvForecastNetwork, optimizer: &'a mut O, loss_function: L) -> Self {
        ForecastTrainer {
            network,
            optimizer,
            loss_function,
            config: TrainingConfig::default(),
        }
    }

    pub fn with_config(mut self, config: TrainingConfig) -> Self {
        self.config = config;
        self
    }

    /// One optimisation step on a single mini-batch; returns its loss
    pub fn train_batch(&mut self, history: &Array3<f64>, target: &Array2<f64>) -> f64 {
        let (predictions, cache) = self.network.forward_with_cache(history);
        let loss = self.loss_function.compute_loss(&predictions, target);
        let grad = self.loss_function.compute_gradient(&predictions, target);
        let gradients = self.network.backward(&grad, &cache);
        self.network.update_parameters(&gradients, &mut *self.optimizer);
        loss
    }

    /// Train until early stopping triggers or `max_epochs` is reached
    pub fn train(&mut self, train_data: &WindowedData, validation_data: Option<&WindowedData>) -> Result<TrainingHistory> {
        check_windows(&*self.network, train_data, "training")?;
        if let Some(valid) = validation_data {
            check_windows(&*self.network, valid, "validation")?;
            if valid.is_empty() {
                return Err(ForecastError::InvalidConfig("validation set is empty".to_string()));
            }
        }
        if train_data.is_empty() {
            return Err(ForecastError::InvalidConfig("training set is empty".to_string()));
        }
        let config = self.config.clone();
        let batches = Batches::new(train_data, config.batch_size)?;
        let patience = config.patience.unwrap_or_else(|| patience_factor(train_data.len()));
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        debug!(
            instances = train_data.len(),
            patience,
            max_epochs = config.max_epochs,
            "starting training"
        );

        let mut best_loss = f64::INFINITY;
        let mut trigger_times = 0usize;
        let mut losses = Vec::new();

        for epoch in 0..config.max_epochs {
            let start_time = Instant::now();
            let mut last_loss = f64::NAN;
            let mut loss_sum = 0.0;
            let mut batch_count = 0usize;

            for batch in batches.shuffled(&mut rng) {
                let target = batch.target.as_ref().ok_or_else(missing_targets)?;
                last_loss = self.train_batch(&batch.history, target);
                loss_sum += last_loss;
                batch_count += 1;
            }

            let train_loss = match config.loss_signal {
                LossSignal::LastBatch => last_loss,
                LossSignal::EpochMean => loss_sum / batch_count as f64,
            };
            let current_loss = match validation_data {
                Some(valid) => evaluate_loss(&*self.network, &self.loss_function, valid, config.batch_size)?,
                None => train_loss,
            };

            if config.fail_on_non_finite && !current_loss.is_finite() {
                return Err(ForecastError::NonFiniteLoss { epoch, loss: current_loss });
            }

            losses.push(EpochLoss { epoch, loss: current_loss });

            if current_loss < best_loss {
                best_loss = current_loss;
                trigger_times = 0;
            } else {
                trigger_times += 1;
                if trigger_times >= patience && epoch >= config.min_epochs {
                    info!(epoch, best_loss, "Early stopping after epoch {}", epoch);
                    return Ok(TrainingHistory {
                        losses,
                        stop_reason: StopReason::EarlyStopped { epoch },
                        patience,
                    });
                }
            }

            let elapsed = start_time.elapsed().as_secs_f64();
            if epoch % config.print_every.max(1) == 0 || epoch + 1 == config.max_epochs {
                if config.verbose {
                    info!("Epoch: {}/{}, loss: {:.5}, time: {:.2}s", epoch + 1, config.max_epochs, current_loss, elapsed);
                } else {
                    debug!("Epoch: {}/{}, loss: {:.5}, time: {:.2}s", epoch + 1, config.max_epochs, current_loss, elapsed);
                }
            }
        }

        Ok(TrainingHistory {
            losses,
            stop_reason: StopReason::MaxEpochsReached,
            patience,
        })
    }
}

/// Mean of per-batch losses over sequential batches, without touching any
/// parameter or optimizer state
///
/// A short final batch counts as much as a full one.
pub fn evaluate_loss<L: LossFunction>(
    network: &ConvForecastNetwork,
    loss_function: &L,
    data: &WindowedData,
    batch_size: usize,
) -> Result<f64> {
    check_windows(network, data, "evaluation")?;
    if data.is_empty() {
        return Err(ForecastError::InvalidConfig("evaluation set is empty".to_string()));
    }

    let batches = Batches::new(data, batch_size)?;
    let mut total = 0.0;
    for batch in batches.sequential() {
        let target = batch.target.as_ref().ok_or_else(missing_targets)?;
        let predictions = network.forward(&batch.history);
        total += loss_function.compute_loss(&predictions, target);
    }
    Ok(total / batches.len() as f64)
}

fn missing_targets() -> ForecastError {
    ForecastError::shape("windowed targets", "target window", "none")
}

fn check_windows(network: &ConvForecastNetwork, data: &WindowedData, context: &str) -> Result<()> {
    let (n, encode_len, feat_dim) = data.history.dim();
    let expected = (encode_len, feat_dim);
    if expected != (network.encode_len, network.feat_dim) {
        return Err(ForecastError::shape(
            format!("{} history window", context),
            format!("(N, {}, {})", network.encode_len, network.feat_dim),
            format!("({}, {}, {})", n, encode_len, feat_dim),
        ));
    }
    let target = data.target.as_ref().ok_or_else(missing_targets)?;
    if target.dim() != (n, network.decode_len) {
        return Err(ForecastError::shape(
            format!("{} target window", context),
            format!("({}, {})", n, network.decode_len),
            format!("{:?}", target.dim()),
        ));
    }
    Ok(())
}
