//! Reference model: Poisson regression on per-bin nucleotide composition.
//!
//! Each output position pools a contiguous window of the input sequence into
//! five features (A, C, G, T fractions and CpG density). Every genome has its
//! own head with one linear unit per target followed by a softplus, fit by
//! SGD on the Poisson loss.

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{SeqModel, poisson_loss};
use crate::data::dna::base_index;
use crate::data::params::JobParams;
use crate::error::MlError;
use crate::tensor::Tensor3;

/// Features per output position.
pub const NUM_FEATURES: usize = 5;

const INIT_SCALE: f64 = 0.05;
const GRAD_CLIP: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Head {
    weights: Vec<[f64; NUM_FEATURES]>,
    bias: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionModel {
    seq_length: usize,
    output_length: usize,
    learning_rate: f64,
    heads: Vec<Head>,
}

impl CompositionModel {
    /// Build a model with small random weights drawn from `seed`.
    pub fn new(
        seq_length: usize,
        output_length: usize,
        targets_per_genome: &[usize],
        learning_rate: f64,
        seed: u64,
    ) -> Result<Self, MlError> {
        if output_length == 0 || output_length > seq_length {
            return Err(MlError::model(format!(
                "output length {output_length} must be within 1..={seq_length}"
            )));
        }
        if targets_per_genome.is_empty() {
            return Err(MlError::model("at least one genome head is required"));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let heads = targets_per_genome
            .iter()
            .map(|&n| Head {
                weights: (0..n)
                    .map(|_| std::array::from_fn(|_| rng.gen_range(-INIT_SCALE..INIT_SCALE)))
                    .collect(),
                bias: vec![0.0; n],
            })
            .collect();
        Ok(Self {
            seq_length,
            output_length,
            learning_rate,
            heads,
        })
    }

    /// Geometry and optimiser settings from a params file.
    pub fn from_params(params: &JobParams, hic: bool, seed: u64) -> Result<Self, MlError> {
        let model = &params.model;
        let targets: Vec<usize> = (0..model.num_genomes())
            .map(|gi| model.num_targets_for(gi))
            .collect();
        Self::new(
            model.seq_length,
            model.output_length(hic)?,
            &targets,
            params.train.learning_rate,
            seed,
        )
    }

    fn head(&self, genome: usize) -> Result<&Head, MlError> {
        self.heads
            .get(genome)
            .ok_or_else(|| MlError::model(format!("no head for genome {genome}")))
    }

    fn window(&self, position: usize) -> (usize, usize) {
        let start = position * self.seq_length / self.output_length;
        let end = (position + 1) * self.seq_length / self.output_length;
        (start, end.max(start + 1))
    }

    /// Composition features for every output position of one sequence.
    fn features(&self, sequence: &[u8]) -> Result<Vec<[f64; NUM_FEATURES]>, MlError> {
        if sequence.len() != self.seq_length {
            return Err(MlError::shape(format!(
                "sequence length {} != {}",
                sequence.len(),
                self.seq_length
            )));
        }
        Ok((0..self.output_length)
            .map(|p| {
                let (start, end) = self.window(p);
                let bases = &sequence[start..end];
                let mut x = [0.0; NUM_FEATURES];
                for &b in bases {
                    if let Some(i) = base_index(b) {
                        x[i] += 1.0;
                    }
                }
                x[4] = bases
                    .windows(2)
                    .filter(|w| w[0].eq_ignore_ascii_case(&b'C') && w[1].eq_ignore_ascii_case(&b'G'))
                    .count() as f64;
                let len = bases.len() as f64;
                for v in &mut x {
                    *v /= len;
                }
                x
            })
            .collect())
    }
}

fn softplus(z: f64) -> f64 {
    if z > 30.0 { z } else { z.exp().ln_1p() }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn linear(weights: &[f64; NUM_FEATURES], bias: f64, x: &[f64; NUM_FEATURES]) -> f64 {
    weights.iter().zip(x).map(|(w, v)| w * v).sum::<f64>() + bias
}

impl SeqModel for CompositionModel {
    fn num_genomes(&self) -> usize {
        self.heads.len()
    }

    fn num_targets(&self, genome: usize) -> usize {
        self.heads.get(genome).map_or(0, |h| h.bias.len())
    }

    fn output_length(&self) -> usize {
        self.output_length
    }

    fn predict(&self, sequences: &[Vec<u8>], genome: usize) -> Result<Tensor3, MlError> {
        let head = self.head(genome)?;
        let num_targets = head.bias.len();
        let mut out = Tensor3::zeros(sequences.len(), self.output_length, num_targets);
        for (s, seq) in sequences.iter().enumerate() {
            for (p, x) in self.features(seq)?.iter().enumerate() {
                for t in 0..num_targets {
                    let z = linear(&head.weights[t], head.bias[t], x);
                    out.set(s, p, t, softplus(z) as f32);
                }
            }
        }
        Ok(out)
    }

    fn train_step(
        &mut self,
        sequences: &[Vec<u8>],
        targets: &Tensor3,
        genome: usize,
    ) -> Result<f64, MlError> {
        let preds = self.predict(sequences, genome)?;
        let loss = poisson_loss(&preds, targets)?;

        let features = sequences
            .iter()
            .map(|s| self.features(s))
            .collect::<Result<Vec<_>, _>>()?;
        let lr = self.learning_rate;
        let head = self
            .heads
            .get_mut(genome)
            .ok_or_else(|| MlError::model(format!("no head for genome {genome}")))?;

        let num_targets = head.bias.len();
        let count = (sequences.len() * features.first().map_or(0, Vec::len)) as f64;
        if count == 0.0 {
            return Ok(loss);
        }
        for t in 0..num_targets {
            let mut grad_w = [0.0; NUM_FEATURES];
            let mut grad_b = 0.0;
            for (s, seq_features) in features.iter().enumerate() {
                for (p, x) in seq_features.iter().enumerate() {
                    let z = linear(&head.weights[t], head.bias[t], x);
                    let pred = softplus(z);
                    let y = f64::from(targets.get(s, p, t));
                    // d/dz [pred - y ln pred]
                    let g = ((1.0 - y / (pred + 1e-7)) * sigmoid(z)).clamp(-GRAD_CLIP, GRAD_CLIP);
                    for (gw, xv) in grad_w.iter_mut().zip(x) {
                        *gw += g * xv;
                    }
                    grad_b += g;
                }
            }
            for (w, gw) in head.weights[t].iter_mut().zip(&grad_w) {
                *w -= lr * gw / count;
            }
            head.bias[t] -= lr * grad_b / count;
        }
        Ok(loss)
    }

    fn save(&self, path: &Path) -> Result<(), MlError> {
        seqcov_core::persistence::atomic_write_json(path, self)?;
        Ok(())
    }

    fn restore(&mut self, path: &Path) -> Result<(), MlError> {
        let loaded: CompositionModel = seqcov_core::persistence::load_json(path)?
            .ok_or_else(|| MlError::not_found(format!("model checkpoint {}", path.display())))?;
        if loaded.seq_length != self.seq_length || loaded.output_length != self.output_length {
            return Err(MlError::model(format!(
                "checkpoint geometry {}→{} does not match {}→{}",
                loaded.seq_length, loaded.output_length, self.seq_length, self.output_length
            )));
        }
        let shapes = |m: &CompositionModel| m.heads.iter().map(|h| h.bias.len()).collect::<Vec<_>>();
        if shapes(&loaded) != shapes(self) {
            return Err(MlError::model(format!(
                "checkpoint heads {:?} do not match {:?}",
                shapes(&loaded),
                shapes(self)
            )));
        }
        self.heads = loaded.heads;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn gc_rich_targets(sequences: &[Vec<u8>], model: &CompositionModel) -> Tensor3 {
        let mut t = Tensor3::zeros(sequences.len(), model.output_length(), 1);
        for (s, seq) in sequences.iter().enumerate() {
            for p in 0..model.output_length() {
                let (a, b) = model.window(p);
                let gc = seq[a..b].iter().filter(|&&c| c == b'G' || c == b'C').count();
                t.set(s, p, 0, gc as f32);
            }
        }
        t
    }

    #[test]
    fn test_predict_shape_and_positivity() {
        let model = CompositionModel::new(16, 4, &[3], 0.1, 1).unwrap();
        let preds = model.predict(&[b"ACGTACGTACGTACGT".to_vec()], 0).unwrap();
        assert_eq!(preds.shape(), [1, 4, 3]);
        assert!(preds.as_slice().iter().all(|&v| v > 0.0));
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut model = CompositionModel::new(32, 4, &[1], 0.5, 7).unwrap();
        let sequences = vec![
            b"GCGCGCGCAAAAAAAAGCGCGCGCTTTTTTTT".to_vec(),
            b"AAAAAAAAGGGGCCCCTTTTTTTTCGCGCGCG".to_vec(),
        ];
        let targets = gc_rich_targets(&sequences, &model);
        let first = model.train_step(&sequences, &targets, 0).unwrap();
        let mut last = first;
        for _ in 0..200 {
            last = model.train_step(&sequences, &targets, 0).unwrap();
        }
        assert!(last < first, "loss {last} did not drop below {first}");
    }

    #[test]
    fn test_save_restore_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model_best.tf");
        let model = CompositionModel::new(8, 2, &[2, 1], 0.1, 3).unwrap();
        model.save(&path).unwrap();

        let seq = vec![b"ACGTTGCA".to_vec()];
        let mut other = CompositionModel::new(8, 2, &[2, 1], 0.1, 99).unwrap();
        assert_ne!(other, model);
        other.restore(&path).unwrap();
        let expected = model.predict(&seq, 0).unwrap();
        let restored = other.predict(&seq, 0).unwrap();
        for (a, b) in expected.as_slice().iter().zip(restored.as_slice()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_restore_rejects_other_geometry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.tf");
        CompositionModel::new(8, 2, &[2], 0.1, 3).unwrap().save(&path).unwrap();
        let mut other = CompositionModel::new(8, 4, &[2], 0.1, 3).unwrap();
        assert!(other.restore(&path).is_err());
    }

    #[test]
    fn test_rejects_bad_sequence_length() {
        let model = CompositionModel::new(8, 2, &[1], 0.1, 3).unwrap();
        assert!(model.predict(&[b"ACGT".to_vec()], 0).is_err());
        assert!(model.predict(&[b"ACGTACGT".to_vec()], 1).is_err());
    }
}
