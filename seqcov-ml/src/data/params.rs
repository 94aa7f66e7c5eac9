//! Job parameter file: model geometry and training hyperparameters.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::MlError;

/// Parameters read from the JSON params file (`{"model": {...}, "train": {...}}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobParams {
    pub model: ModelParams,
    pub train: TrainParams,
}

/// Either one target count shared by every genome or one count per genome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumTargets {
    Shared(usize),
    PerGenome(Vec<usize>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParams {
    pub seq_length: usize,
    pub target_length: usize,
    pub num_targets: NumTargets,
    #[serde(default)]
    pub num_genomes: Option<usize>,
    /// Hi-C: bins skipped next to the diagonal.
    #[serde(default = "default_diagonal_offset")]
    pub diagonal_offset: usize,
    /// Hi-C: bins cropped from each end.
    #[serde(default)]
    pub target_crop: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainParams {
    pub batch_size: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_patience")]
    pub patience: usize,
}

fn default_diagonal_offset() -> usize {
    2
}

fn default_learning_rate() -> f64 {
    0.01
}

fn default_patience() -> usize {
    20
}

impl JobParams {
    pub fn from_file(path: &Path) -> Result<Self, MlError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| MlError::not_found(format!("params file {}: {e}", path.display())))?;
        let params: JobParams = serde_json::from_str(&text)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), MlError> {
        let m = &self.model;
        if m.seq_length == 0 || m.target_length == 0 {
            return Err(MlError::invalid_input(
                "seq_length and target_length must be positive",
            ));
        }
        if m.seq_length % m.target_length != 0 {
            return Err(MlError::invalid_input(format!(
                "seq_length {} is not a multiple of target_length {}",
                m.seq_length, m.target_length
            )));
        }
        if self.train.batch_size == 0 {
            return Err(MlError::invalid_input("batch_size must be positive"));
        }
        if let (NumTargets::PerGenome(counts), Some(n)) = (&m.num_targets, m.num_genomes) {
            if counts.len() != n {
                return Err(MlError::invalid_input(format!(
                    "num_targets lists {} genomes but num_genomes is {n}",
                    counts.len()
                )));
            }
        }
        Ok(())
    }
}

impl ModelParams {
    pub fn num_genomes(&self) -> usize {
        match (&self.num_targets, self.num_genomes) {
            (NumTargets::PerGenome(counts), _) => counts.len(),
            (NumTargets::Shared(_), Some(n)) => n,
            (NumTargets::Shared(_), None) => 1,
        }
    }

    pub fn num_targets_for(&self, genome: usize) -> usize {
        match &self.num_targets {
            NumTargets::Shared(n) => *n,
            NumTargets::PerGenome(counts) => counts.get(genome).copied().unwrap_or(0),
        }
    }

    /// Output positions per sequence; Hi-C maps store the upper triangle.
    pub fn output_length(&self, hic: bool) -> Result<usize, MlError> {
        if !hic {
            return Ok(self.target_length);
        }
        let side = self.hic_side()?;
        Ok(side * (side + 1) / 2)
    }

    /// Side of the cropped Hi-C contact map.
    pub fn hic_side(&self) -> Result<usize, MlError> {
        self
            .target_length
            .checked_sub(self.diagonal_offset + 2 * self.target_crop)
            .filter(|&l| l > 0)
            .ok_or_else(|| {
                MlError::invalid_input(format!(
                    "target_length {} too short for diagonal_offset {} and target_crop {}",
                    self.target_length, self.diagonal_offset, self.target_crop
                ))
            })
    }
}
