//! Early stopping on the aggregate validation loss.

use serde::{Deserialize, Serialize};

/// What the training loop should do after an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    /// Keep going; the epoch did not improve on the best loss.
    Continue,
    /// Keep going; the epoch is the new best and should be checkpointed.
    Checkpoint,
    /// Patience exhausted.
    Stop,
}

/// Stops after `patience` consecutive epochs without a lower validation loss.
///
/// The first epoch is always the best so far, even with a NaN loss (no
/// validation data). A later NaN never improves; a real loss improves on a
/// NaN best.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarlyStopping {
    pub patience: usize,
    pub min_delta: f64,
    #[serde(skip)]
    counter: usize,
    #[serde(skip)]
    best_loss: Option<f64>,
    #[serde(skip)]
    best_epoch: Option<usize>,
}

impl EarlyStopping {
    pub fn new(patience: usize, min_delta: f64) -> Self {
        Self {
            patience,
            min_delta,
            counter: 0,
            best_loss: None,
            best_epoch: None,
        }
    }

    pub fn on_epoch_end(&mut self, epoch: usize, loss: f64) -> CallbackAction {
        let improved = match self.best_loss {
            None => true,
            Some(best) if best.is_nan() => !loss.is_nan(),
            Some(best) => loss < best - self.min_delta,
        };
        if improved {
            self.best_loss = Some(loss);
            self.best_epoch = Some(epoch);
            self.counter = 0;
            return CallbackAction::Checkpoint;
        }
        self.counter += 1;
        if self.counter >= self.patience {
            CallbackAction::Stop
        } else {
            CallbackAction::Continue
        }
    }

    /// Consecutive non-improving epochs so far.
    pub fn counter(&self) -> usize {
        self.counter
    }

    pub fn best_loss(&self) -> Option<f64> {
        self.best_loss
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn should_stop(&self) -> bool {
        self.counter >= self.patience
    }
}
