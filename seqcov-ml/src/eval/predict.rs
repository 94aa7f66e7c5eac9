//! Prediction passes over a dataset.

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::accuracy::Accuracy;
use crate::data::SeqDataset;
use crate::error::MlError;
use crate::model::{Ensemble, SeqModel, poisson_loss};
use crate::tensor::Tensor3;

/// Ensemble settings plus the RNG used by Monte Carlo passes.
#[derive(Debug, Clone)]
pub struct Predictor {
    pub ensemble: Ensemble,
    pub mc_iterations: usize,
    rng: StdRng,
}

impl Predictor {
    pub fn new(ensemble: Ensemble, mc_iterations: usize, seed: u64) -> Self {
        Self {
            ensemble,
            mc_iterations,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn predict<M: SeqModel + ?Sized>(
        &mut self,
        model: &M,
        sequences: &[Vec<u8>],
        genome: usize,
    ) -> Result<Tensor3, MlError> {
        if self.mc_iterations == 0 {
            self.ensemble.predict(model, sequences, genome)
        } else {
            self.ensemble.predict_monte_carlo(
                model,
                sequences,
                genome,
                self.mc_iterations,
                &mut self.rng,
            )
        }
    }
}

impl Default for Predictor {
    fn default() -> Self {
        Self::new(Ensemble::default(), 0, 0)
    }
}

/// Predict every batch (optionally capped) and score against the dataset's targets.
pub fn evaluate_dataset<M: SeqModel + ?Sized>(
    model: &M,
    dataset: &SeqDataset,
    genome: usize,
    predictor: &mut Predictor,
    max_batches: Option<usize>,
) -> Result<Accuracy, MlError> {
    let batches = dataset.batches(max_batches);
    if batches.is_empty() {
        return Err(MlError::dataset("no records to evaluate"));
    }

    let mut preds = Tensor3::zeros(0, 0, 0);
    let mut targets = Tensor3::zeros(0, 0, 0);
    for batch in &batches {
        let batch_preds = predictor.predict(model, &batch.sequences, genome)?;
        if batch_preds.shape() != batch.targets.shape() {
            return Err(MlError::shape(format!(
                "model predicts {:?} but records hold {:?}",
                batch_preds.shape(),
                batch.targets.shape()
            )));
        }
        preds.append(&batch_preds)?;
        targets.append(&batch.targets)?;
    }

    let loss = poisson_loss(&preds, &targets)?;
    tracing::debug!(
        genome,
        batches = batches.len(),
        sequences = preds.num_seqs(),
        loss,
        "Evaluated dataset"
    );
    Accuracy::new(preds, targets, loss)
}
