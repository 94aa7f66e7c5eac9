//! Dense coverage tensors: sequences × positions × targets.

use crate::error::MlError;
use serde::{Deserialize, Serialize};

/// Row-major `f32` tensor of shape (sequences, positions, targets).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor3 {
    shape: [usize; 3],
    data: Vec<f32>,
}

/// A 2-D (sequences × positions) slice for a single target, copied out.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl Tensor3 {
    pub fn zeros(seqs: usize, positions: usize, targets: usize) -> Self {
        Self {
            shape: [seqs, positions, targets],
            data: vec![0.0; seqs * positions * targets],
        }
    }

    pub fn from_vec(shape: [usize; 3], data: Vec<f32>) -> Result<Self, MlError> {
        let expected = shape.iter().product::<usize>();
        if data.len() != expected {
            return Err(MlError::shape(format!(
                "tensor {:?} needs {expected} values, got {}",
                shape,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn num_seqs(&self) -> usize {
        self.shape[0]
    }

    pub fn num_positions(&self) -> usize {
        self.shape[1]
    }

    pub fn num_targets(&self) -> usize {
        self.shape[2]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    fn offset(&self, s: usize, p: usize, t: usize) -> usize {
        (s * self.shape[1] + p) * self.shape[2] + t
    }

    pub fn get(&self, s: usize, p: usize, t: usize) -> f32 {
        self.data[self.offset(s, p, t)]
    }

    pub fn set(&mut self, s: usize, p: usize, t: usize, value: f32) {
        let i = self.offset(s, p, t);
        self.data[i] = value;
    }

    /// The (positions × targets) block of one sequence.
    pub fn sequence_block(&self, s: usize) -> &[f32] {
        let len = self.shape[1] * self.shape[2];
        &self.data[s * len..(s + 1) * len]
    }

    /// Append the sequences of `other` (same positions and targets).
    pub fn append(&mut self, other: &Tensor3) -> Result<(), MlError> {
        if self.shape[0] == 0 && self.data.is_empty() {
            *self = other.clone();
            return Ok(());
        }
        if self.shape[1..] != other.shape[1..] {
            return Err(MlError::shape(format!(
                "cannot append {:?} to {:?}",
                other.shape, self.shape
            )));
        }
        self.data.extend_from_slice(&other.data);
        self.shape[0] += other.shape[0];
        Ok(())
    }

    /// Element-wise in-place addition.
    pub fn add_assign(&mut self, other: &Tensor3) -> Result<(), MlError> {
        if self.shape != other.shape {
            return Err(MlError::shape(format!(
                "cannot add {:?} to {:?}",
                other.shape, self.shape
            )));
        }
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += *b;
        }
        Ok(())
    }

    pub fn scale(&mut self, factor: f32) {
        for v in &mut self.data {
            *v *= factor;
        }
    }

    /// Mirror every sequence along the position axis.
    pub fn reverse_positions(&self) -> Tensor3 {
        let [seqs, positions, targets] = self.shape;
        let mut out = Tensor3::zeros(seqs, positions, targets);
        for s in 0..seqs {
            for p in 0..positions {
                for t in 0..targets {
                    out.set(s, positions - 1 - p, t, self.get(s, p, t));
                }
            }
        }
        out
    }

    /// Gather positions: output position `p` takes input position `map[p]`.
    pub fn permute_positions(&self, map: &[usize]) -> Result<Tensor3, MlError> {
        let [seqs, positions, targets] = self.shape;
        if map.len() != positions || map.iter().any(|&q| q >= positions) {
            return Err(MlError::shape(format!(
                "position map of length {} for {positions} positions",
                map.len()
            )));
        }
        let mut out = Tensor3::zeros(seqs, positions, targets);
        for s in 0..seqs {
            for (p, &q) in map.iter().enumerate() {
                for t in 0..targets {
                    out.set(s, p, t, self.get(s, q, t));
                }
            }
        }
        Ok(out)
    }

    /// Copy out the (sequences × positions) matrix of target `ti`.
    pub fn target_matrix(&self, ti: usize) -> Matrix {
        let [seqs, positions, _] = self.shape;
        let mut data = Vec::with_capacity(seqs * positions);
        for s in 0..seqs {
            for p in 0..positions {
                data.push(self.get(s, p, ti));
            }
        }
        Matrix {
            rows: seqs,
            cols: positions,
            data,
        }
    }

    /// All values of target `ti`, flattened (sequence-major).
    pub fn target_values(&self, ti: usize) -> Vec<f32> {
        self.target_matrix(ti).data
    }
}

impl Matrix {
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, MlError> {
        if rows * cols != data.len() {
            return Err(MlError::shape(format!(
                "matrix {rows}x{cols} needs {} values, got {}",
                rows * cols,
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Keep every `stride`-th column starting at 0 and flatten row-major.
    pub fn downsample_flatten(&self, stride: usize) -> Vec<f32> {
        let cols = downsample_indexes(self.cols, stride);
        let mut out = Vec::with_capacity(self.rows * cols.len());
        for r in 0..self.rows {
            let row = &self.data[r * self.cols..(r + 1) * self.cols];
            out.extend(cols.iter().map(|&c| row[c]));
        }
        out
    }
}

/// Column indexes `0, stride, 2*stride, ...` below `len` (`ceil(len/stride)` of them).
pub fn downsample_indexes(len: usize, stride: usize) -> Vec<usize> {
    (0..len).step_by(stride.max(1)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Tensor3 {
        // 2 seqs x 3 positions x 2 targets
        Tensor3::from_vec([2, 3, 2], (0..12).map(|v| v as f32).collect()).unwrap()
    }

    #[test]
    fn test_indexing_is_row_major() {
        let t = sample();
        assert_eq!(t.get(0, 0, 1), 1.0);
        assert_eq!(t.get(0, 2, 0), 4.0);
        assert_eq!(t.get(1, 0, 0), 6.0);
        assert_eq!(t.get(1, 2, 1), 11.0);
    }

    #[test]
    fn test_target_matrix() {
        let m = sample().target_matrix(1);
        assert_eq!((m.rows, m.cols), (2, 3));
        assert_eq!(m.data, vec![1.0, 3.0, 5.0, 7.0, 9.0, 11.0]);
    }

    #[test]
    fn test_from_vec_rejects_bad_length() {
        assert!(Tensor3::from_vec([2, 2, 2], vec![0.0; 7]).is_err());
    }

    #[test]
    fn test_append_and_add() {
        let mut t = Tensor3::zeros(0, 0, 0);
        t.append(&sample()).unwrap();
        t.append(&sample()).unwrap();
        assert_eq!(t.shape(), [4, 3, 2]);

        let mut a = sample();
        a.add_assign(&sample()).unwrap();
        a.scale(0.5);
        assert_eq!(a, sample());
    }

    #[test]
    fn test_reverse_positions() {
        let t = sample();
        let r = t.reverse_positions();
        assert_eq!(r.get(0, 0, 1), t.get(0, 2, 1));
        assert_eq!(r.reverse_positions(), t);
    }

    #[test]
    fn test_permute_positions() {
        let t = sample();
        let p = t.permute_positions(&[2, 2, 0]).unwrap();
        assert_eq!(p.get(0, 0, 1), t.get(0, 2, 1));
        assert_eq!(p.get(0, 1, 0), t.get(0, 2, 0));
        assert_eq!(p.get(0, 2, 1), t.get(0, 0, 1));
        assert!(t.permute_positions(&[0, 1]).is_err());
        assert!(t.permute_positions(&[0, 1, 3]).is_err());
    }

    #[test]
    fn test_downsample_indexes() {
        assert_eq!(downsample_indexes(17, 8), vec![0, 8, 16]);
        assert_eq!(downsample_indexes(16, 8), vec![0, 8]);
        assert_eq!(downsample_indexes(1, 8), vec![0]);
        assert!(downsample_indexes(0, 8).is_empty());
    }

    #[test]
    fn test_downsample_flatten() {
        let m = Matrix::new(2, 10, (0..20).map(|v| v as f32).collect()).unwrap();
        assert_eq!(m.downsample_flatten(8), vec![0.0, 8.0, 10.0, 18.0]);
    }
}
