//! Sequence-to-coverage models.
//!
//! The evaluation driver and the training loop only talk to [`SeqModel`];
//! [`CompositionModel`] is the reference implementation used by the binaries.

pub mod composition;
pub mod ensemble;

pub use composition::CompositionModel;
pub use ensemble::{Augmentation, Ensemble, PositionLayout};

use std::path::Path;

use crate::error::MlError;
use crate::tensor::Tensor3;

const LOSS_EPSILON: f64 = 1e-7;

/// A model mapping DNA sequences to per-position, per-target coverage.
pub trait SeqModel: Send {
    fn num_genomes(&self) -> usize;

    fn num_targets(&self, genome: usize) -> usize;

    /// Output positions per sequence.
    fn output_length(&self) -> usize;

    /// Predict a (sequences × positions × targets) tensor for one genome's head.
    fn predict(&self, sequences: &[Vec<u8>], genome: usize) -> Result<Tensor3, MlError>;

    /// Take one optimisation step on a batch and return its loss before the update.
    fn train_step(
        &mut self,
        sequences: &[Vec<u8>],
        targets: &Tensor3,
        genome: usize,
    ) -> Result<f64, MlError>;

    /// Write the model weights to `path`.
    fn save(&self, path: &Path) -> Result<(), MlError>;

    /// Replace the model weights with those stored at `path`.
    fn restore(&mut self, path: &Path) -> Result<(), MlError>;
}

/// Mean Poisson negative log-likelihood (up to a constant): `pred - y * ln(pred)`.
pub fn poisson_loss(preds: &Tensor3, targets: &Tensor3) -> Result<f64, MlError> {
    if preds.shape() != targets.shape() {
        return Err(MlError::shape(format!(
            "predictions {:?} vs targets {:?}",
            preds.shape(),
            targets.shape()
        )));
    }
    let n = preds.as_slice().len();
    if n == 0 {
        return Ok(f64::NAN);
    }
    let total: f64 = preds
        .as_slice()
        .iter()
        .zip(targets.as_slice())
        .map(|(&p, &y)| {
            let p = f64::from(p);
            p - f64::from(y) * (p + LOSS_EPSILON).ln()
        })
        .sum();
    Ok(total / n as f64)
}
