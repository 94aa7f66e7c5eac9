//! Prediction ensembling and training-time augmentation.
//!
//! Ensembling averages predictions over input shifts and, optionally, the
//! reverse-complement strand (whose predictions are mirrored back before
//! averaging). Augmentation draws one shift/strand per training batch.

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::SeqModel;
use crate::data::dna::{reverse_complement, shift_sequence};
use crate::error::MlError;
use crate::tensor::Tensor3;

/// How output positions map onto the sequence, which decides how
/// reverse-strand predictions are mirrored back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionLayout {
    /// One bin per position along the sequence.
    #[default]
    Linear,
    /// Row-major upper triangle (diagonal included) of a `side × side` contact map.
    HicTriangle { side: usize },
}

impl PositionLayout {
    /// For each position, the position it lands on when the strand flips.
    pub fn mirror_indexes(&self, positions: usize) -> Result<Vec<usize>, MlError> {
        match *self {
            Self::Linear => Ok((0..positions).rev().collect()),
            Self::HicTriangle { side } => {
                if side * (side + 1) / 2 != positions {
                    return Err(MlError::shape(format!(
                        "{positions} positions do not form a {side}x{side} upper triangle"
                    )));
                }
                // start of row a in the flattened triangle
                let row_start = |a: usize| a * side - a * a.saturating_sub(1) / 2;
                let mut map = Vec::with_capacity(positions);
                for i in 0..side {
                    for j in i..side {
                        let (a, b) = (side - 1 - j, side - 1 - i);
                        map.push(row_start(a) + (b - a));
                    }
                }
                Ok(map)
            }
        }
    }

    /// Bring reverse-strand predictions back into forward-strand coordinates.
    pub fn mirror(&self, tensor: &Tensor3) -> Result<Tensor3, MlError> {
        match self {
            Self::Linear => Ok(tensor.reverse_positions()),
            Self::HicTriangle { .. } => {
                tensor.permute_positions(&self.mirror_indexes(tensor.num_positions())?)
            }
        }
    }
}

/// Deterministic ensemble over shifts and strands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ensemble {
    pub rc: bool,
    pub shifts: Vec<i64>,
    #[serde(default)]
    pub layout: PositionLayout,
}

impl Default for Ensemble {
    fn default() -> Self {
        Self {
            rc: false,
            shifts: vec![0],
            layout: PositionLayout::Linear,
        }
    }
}

fn transform(sequences: &[Vec<u8>], shift: i64, rc: bool) -> Vec<Vec<u8>> {
    sequences
        .iter()
        .map(|seq| {
            let shifted = shift_sequence(seq, shift);
            if rc {
                reverse_complement(&shifted)
            } else {
                shifted
            }
        })
        .collect()
}

impl Ensemble {
    pub fn new(rc: bool, shifts: Vec<i64>) -> Self {
        let shifts = if shifts.is_empty() { vec![0] } else { shifts };
        Self {
            rc,
            shifts,
            layout: PositionLayout::Linear,
        }
    }

    pub fn with_layout(mut self, layout: PositionLayout) -> Self {
        self.layout = layout;
        self
    }

    fn predict_one<M: SeqModel + ?Sized>(
        &self,
        model: &M,
        sequences: &[Vec<u8>],
        genome: usize,
        shift: i64,
        rc: bool,
    ) -> Result<Tensor3, MlError> {
        let preds = model.predict(&transform(sequences, shift, rc), genome)?;
        if rc { self.layout.mirror(&preds) } else { Ok(preds) }
    }

    /// Number of forward passes per batch.
    pub fn size(&self) -> usize {
        self.shifts.len() * if self.rc { 2 } else { 1 }
    }

    fn members(&self) -> impl Iterator<Item = (i64, bool)> + '_ {
        let strands: &[bool] = if self.rc { &[false, true] } else { &[false] };
        self.shifts
            .iter()
            .flat_map(move |&shift| strands.iter().map(move |&rc| (shift, rc)))
    }

    /// Average of the model's predictions over every ensemble member.
    pub fn predict<M: SeqModel + ?Sized>(
        &self,
        model: &M,
        sequences: &[Vec<u8>],
        genome: usize,
    ) -> Result<Tensor3, MlError> {
        let mut sum: Option<Tensor3> = None;
        for (shift, rc) in self.members() {
            let preds = self.predict_one(model, sequences, genome, shift, rc)?;
            match sum.as_mut() {
                Some(acc) => acc.add_assign(&preds)?,
                None => sum = Some(preds),
            }
        }
        let mut mean = sum.ok_or_else(|| MlError::model("empty ensemble"))?;
        mean.scale(1.0 / self.size() as f32);
        Ok(mean)
    }

    /// Deterministic ensemble plus `iterations` passes with a random strand and
    /// a random shift within the configured shift range, all averaged.
    pub fn predict_monte_carlo<M: SeqModel + ?Sized, R: Rng>(
        &self,
        model: &M,
        sequences: &[Vec<u8>],
        genome: usize,
        iterations: usize,
        rng: &mut R,
    ) -> Result<Tensor3, MlError> {
        let mut sum = self.predict(model, sequences, genome)?;
        if iterations == 0 {
            return Ok(sum);
        }
        sum.scale(self.size() as f32);

        let lo = self.shifts.iter().copied().min().unwrap_or(0);
        let hi = self.shifts.iter().copied().max().unwrap_or(0);
        for _ in 0..iterations {
            let shift = rng.gen_range(lo..=hi);
            let rc = rng.gen_bool(0.5);
            sum.add_assign(&self.predict_one(model, sequences, genome, shift, rc)?)?;
        }
        sum.scale(1.0 / (self.size() + iterations) as f32);
        Ok(sum)
    }
}

/// Random shift/strand augmentation applied to each training batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Augmentation {
    pub rc: bool,
    pub shifts: Vec<i64>,
}

impl Default for Augmentation {
    fn default() -> Self {
        Self {
            rc: false,
            shifts: vec![0],
        }
    }
}

impl Augmentation {
    pub fn new(rc: bool, shifts: Vec<i64>) -> Self {
        let shifts = if shifts.is_empty() { vec![0] } else { shifts };
        Self { rc, shifts }
    }

    pub fn is_identity(&self) -> bool {
        !self.rc && self.shifts.iter().all(|&s| s == 0)
    }

    /// Transform a batch; reverse-complemented inputs get mirrored targets.
    pub fn apply<R: Rng>(
        &self,
        rng: &mut R,
        sequences: &[Vec<u8>],
        targets: &Tensor3,
    ) -> (Vec<Vec<u8>>, Tensor3) {
        if self.is_identity() {
            return (sequences.to_vec(), targets.clone());
        }
        let shift = self.shifts.choose(rng).copied().unwrap_or(0);
        let rc = self.rc && rng.gen_bool(0.5);
        let seqs = transform(sequences, shift, rc);
        let targets = if rc {
            targets.reverse_positions()
        } else {
            targets.clone()
        };
        (seqs, targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CompositionModel;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn model() -> CompositionModel {
        CompositionModel::new(16, 4, &[2], 0.1, 11).unwrap()
    }

    #[test]
    fn test_single_member_matches_model() {
        let m = model();
        let seqs = vec![b"ACGTTTGGCCAAACGT".to_vec()];
        let direct = m.predict(&seqs, 0).unwrap();
        let ens = Ensemble::default().predict(&m, &seqs, 0).unwrap();
        assert_eq!(direct, ens);
    }

    #[test]
    fn test_rc_ensemble_is_strand_symmetric() {
        // averaging fwd and mirrored rc predictions gives the same answer for
        // a sequence and its reverse complement (mirrored)
        let m = model();
        let seq = b"AACCGGTTACGTGCAT".to_vec();
        let ens = Ensemble::new(true, vec![0]);
        let fwd = ens.predict(&m, &[seq.clone()], 0).unwrap();
        let rev = ens
            .predict(&m, &[reverse_complement(&seq)], 0)
            .unwrap()
            .reverse_positions();
        for (a, b) in fwd.as_slice().iter().zip(rev.as_slice()) {
            assert!((a - b).abs() < 1e-5);
        }
        assert_eq!(ens.size(), 2);
    }

    #[test]
    fn test_hic_mirror_maps_contact_pairs() {
        // side 3: (0,0) (0,1) (0,2) (1,1) (1,2) (2,2); (i,j) -> (2-j, 2-i)
        let layout = PositionLayout::HicTriangle { side: 3 };
        assert_eq!(layout.mirror_indexes(6).unwrap(), vec![5, 4, 2, 3, 1, 0]);

        let t = Tensor3::from_vec([1, 6, 1], vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let m = layout.mirror(&t).unwrap();
        assert_eq!(m.as_slice(), &[5.0, 4.0, 2.0, 3.0, 1.0, 0.0]);
        assert_eq!(layout.mirror(&m).unwrap(), t);
        // plain reversal would send (0,2) to (1,1)
        assert_ne!(m, t.reverse_positions());
    }

    #[test]
    fn test_hic_mirror_is_an_involution() {
        for side in 1..8 {
            let n = side * (side + 1) / 2;
            let map = PositionLayout::HicTriangle { side }.mirror_indexes(n).unwrap();
            for (p, &q) in map.iter().enumerate() {
                assert_eq!(map[q], p);
            }
        }
    }

    #[test]
    fn test_hic_mirror_rejects_non_triangular_length() {
        let layout = PositionLayout::HicTriangle { side: 3 };
        assert!(layout.mirror_indexes(5).is_err());
        assert_eq!(PositionLayout::Linear.mirror_indexes(3).unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn test_hic_rc_ensemble_uses_triangle_mirror() {
        let m = CompositionModel::new(16, 6, &[1], 0.1, 3).unwrap();
        let seqs = vec![b"AACCGGTTACGTGCAT".to_vec()];
        let layout = PositionLayout::HicTriangle { side: 3 };
        let ens = Ensemble::new(true, vec![0]).with_layout(layout);

        let fwd = m.predict(&seqs, 0).unwrap();
        let rev = m.predict(&[reverse_complement(&seqs[0])], 0).unwrap();
        let expected = layout.mirror(&rev).unwrap();
        let got = ens.predict(&m, &seqs, 0).unwrap();
        for p in 0..6 {
            let want = (fwd.get(0, p, 0) + expected.get(0, p, 0)) / 2.0;
            assert!((got.get(0, p, 0) - want).abs() < 1e-6);
        }
    }

    #[test]
    fn test_monte_carlo_without_iterations_is_deterministic() {
        let m = model();
        let seqs = vec![b"ACGTACGTACGTACGT".to_vec()];
        let ens = Ensemble::new(false, vec![-1, 0, 1]);
        let mut rng = StdRng::seed_from_u64(1);
        let a = ens.predict_monte_carlo(&m, &seqs, 0, 0, &mut rng).unwrap();
        let b = ens.predict(&m, &seqs, 0).unwrap();
        assert_eq!(a, b);
        let c = ens.predict_monte_carlo(&m, &seqs, 0, 4, &mut rng).unwrap();
        assert_eq!(c.shape(), b.shape());
    }

    #[test]
    fn test_augmentation_mirrors_targets_with_rc() {
        let aug = Augmentation::new(true, vec![0]);
        let seqs = vec![b"AACG".to_vec()];
        let targets = Tensor3::from_vec([1, 2, 1], vec![1.0, 2.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let mut saw_rc = false;
        for _ in 0..32 {
            let (s, t) = aug.apply(&mut rng, &seqs, &targets);
            if s[0] == b"CGTT".to_vec() {
                saw_rc = true;
                assert_eq!(t.as_slice(), &[2.0, 1.0]);
            } else {
                assert_eq!(t, targets);
            }
        }
        assert!(saw_rc);
    }

    #[test]
    fn test_identity_augmentation() {
        assert!(Augmentation::default().is_identity());
        assert!(!Augmentation::new(false, vec![0, 1]).is_identity());
    }
}
