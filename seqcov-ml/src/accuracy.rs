//! Accuracy of a prediction pass: per-target R² and Pearson r over all positions.

use serde::{Deserialize, Serialize};

use crate::error::MlError;
use crate::stats::{nan_mean, pearson_r, r_squared};
use crate::tensor::Tensor3;

/// Predictions and targets from one evaluation pass plus its mean loss.
///
/// Holds the full tensors, so instances are dropped as soon as their
/// summary has been printed.
#[derive(Debug, Clone)]
pub struct Accuracy {
    pub preds: Tensor3,
    pub targets: Tensor3,
    pub loss: f64,
}

/// Per-target accuracy vectors, cheap to keep around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracySummary {
    pub loss: f64,
    pub r2: Vec<f64>,
    pub pearson_r: Vec<f64>,
}

impl Accuracy {
    pub fn new(preds: Tensor3, targets: Tensor3, loss: f64) -> Result<Self, MlError> {
        if preds.shape() != targets.shape() {
            return Err(MlError::shape(format!(
                "predictions {:?} vs targets {:?}",
                preds.shape(),
                targets.shape()
            )));
        }
        Ok(Self {
            preds,
            targets,
            loss,
        })
    }

    pub fn num_targets(&self) -> usize {
        self.targets.num_targets()
    }

    /// R² for each target.
    pub fn r2(&self) -> Vec<f64> {
        (0..self.num_targets())
            .map(|ti| r_squared(&self.targets.target_values(ti), &self.preds.target_values(ti)))
            .collect()
    }

    /// Pearson r for each target.
    pub fn pearson_r(&self) -> Vec<f64> {
        (0..self.num_targets())
            .map(|ti| pearson_r(&self.targets.target_values(ti), &self.preds.target_values(ti)))
            .collect()
    }

    pub fn summary(&self) -> AccuracySummary {
        AccuracySummary {
            loss: self.loss,
            r2: self.r2(),
            pearson_r: self.pearson_r(),
        }
    }
}

impl AccuracySummary {
    pub fn mean_r2(&self) -> f64 {
        nan_mean(&self.r2)
    }

    pub fn mean_pearson_r(&self) -> f64 {
        nan_mean(&self.pearson_r)
    }
}
