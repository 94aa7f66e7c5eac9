//! Peak-calling accuracy.
//!
//! Coverage for one target is down-sampled along positions, a single Poisson
//! rate is fit to the remaining samples, and each sample's upper-tail p-value
//! is FDR-corrected. Samples with q below the threshold are peaks; the
//! predictions are then scored against those labels.

use std::io::Write;
use std::path::Path;

use seqcov_core::FdrMethod;
use serde::{Deserialize, Serialize};

use crate::error::MlError;
use crate::stats::{average_precision, benjamini_hochberg, mean, poisson, roc_auc};
use crate::tensor::{Matrix, Tensor3};

/// AUROC reported for a target with no called peaks.
pub const NO_PEAKS_AUROC: f64 = 0.5;
/// AUPRC reported for a target with no called peaks.
pub const NO_PEAKS_AUPRC: f64 = 0.0;

/// Peak-calling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakCaller {
    /// Keep every `stride`-th position.
    pub stride: usize,
    /// q-value below which a sample is a peak.
    pub q_threshold: f64,
    pub fdr: FdrMethod,
}

impl Default for PeakCaller {
    fn default() -> Self {
        Self {
            stride: 8,
            q_threshold: 0.01,
            fdr: FdrMethod::Simplified,
        }
    }
}

/// Flattened, down-sampled samples for one target with their peak labels.
#[derive(Debug, Clone)]
pub struct PeakCalls {
    pub targets: Vec<f32>,
    pub preds: Vec<f32>,
    pub labels: Vec<bool>,
    pub lambda: f64,
}

impl PeakCalls {
    pub fn num_peaks(&self) -> usize {
        self.labels.iter().filter(|&&l| l).count()
    }

    /// Fraction of samples called as peaks.
    pub fn peak_fraction(&self) -> f64 {
        if self.labels.is_empty() {
            0.0
        } else {
            self.num_peaks() as f64 / self.labels.len() as f64
        }
    }
}

/// Accuracy of one target's predictions against called peaks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakStats {
    pub target_index: usize,
    pub num_peaks: usize,
    pub auroc: f64,
    pub auprc: f64,
}

/// Peak statistics for every target plus their means.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeakReport {
    pub targets: Vec<PeakStats>,
    pub mean_auroc: f64,
    pub mean_auprc: f64,
}

impl PeakCaller {
    pub fn new(stride: usize, q_threshold: f64, fdr: FdrMethod) -> Self {
        Self {
            stride,
            q_threshold,
            fdr,
        }
    }

    /// Label the down-sampled coverage of one target as peak or background.
    ///
    /// The p-values and q-values are recomputed on every call.
    pub fn call(&self, targets: &Matrix, preds: &Matrix) -> Result<PeakCalls, MlError> {
        if (targets.rows, targets.cols) != (preds.rows, preds.cols) {
            return Err(MlError::shape(format!(
                "targets {}x{} vs predictions {}x{}",
                targets.rows, targets.cols, preds.rows, preds.cols
            )));
        }
        let target_flat = targets.downsample_flatten(self.stride);
        let pred_flat = preds.downsample_flatten(self.stride);

        let lambda = mean_f32(&target_flat);
        let p_values = poisson::upper_tail_p_values(&target_flat, lambda);
        let q_values = benjamini_hochberg(&p_values, self.fdr);
        let labels = q_values.iter().map(|&q| q < self.q_threshold).collect();

        Ok(PeakCalls {
            targets: target_flat,
            preds: pred_flat,
            labels,
            lambda,
        })
    }

    /// Peak count, AUROC and AUPRC for one target.
    pub fn target_stats(
        &self,
        target_index: usize,
        targets: &Matrix,
        preds: &Matrix,
    ) -> Result<PeakStats, MlError> {
        let calls = self.call(targets, preds)?;
        let num_peaks = calls.num_peaks();
        let (auroc, auprc) = if num_peaks == 0 {
            (NO_PEAKS_AUROC, NO_PEAKS_AUPRC)
        } else {
            (
                roc_auc(&calls.labels, &calls.preds).unwrap_or(NO_PEAKS_AUROC),
                average_precision(&calls.labels, &calls.preds),
            )
        };
        tracing::debug!(
            target_index,
            num_peaks,
            lambda = calls.lambda,
            auroc,
            auprc,
            "Peak statistics"
        );
        Ok(PeakStats {
            target_index,
            num_peaks,
            auroc,
            auprc,
        })
    }

    /// Peak statistics across every target of a prediction/target pair.
    pub fn evaluate(&self, preds: &Tensor3, targets: &Tensor3) -> Result<PeakReport, MlError> {
        if preds.shape() != targets.shape() {
            return Err(MlError::shape(format!(
                "predictions {:?} vs targets {:?}",
                preds.shape(),
                targets.shape()
            )));
        }
        let stats = (0..targets.num_targets())
            .map(|ti| self.target_stats(ti, &targets.target_matrix(ti), &preds.target_matrix(ti)))
            .collect::<Result<Vec<_>, _>>()?;

        let aurocs: Vec<f64> = stats.iter().map(|s| s.auroc).collect();
        let auprcs: Vec<f64> = stats.iter().map(|s| s.auprc).collect();
        Ok(PeakReport {
            mean_auroc: mean(&aurocs),
            mean_auprc: mean(&auprcs),
            targets: stats,
        })
    }
}

impl PeakStats {
    /// One `peaks.txt` line.
    pub fn format_line(&self) -> String {
        format!(
            "{:4}  {:6}  {:.5}  {:.5}",
            self.target_index, self.num_peaks, self.auroc, self.auprc
        )
    }
}

impl PeakReport {
    /// Write one line per target.
    pub fn write_to<W: Write>(&self, mut out: W) -> Result<(), MlError> {
        for stats in &self.targets {
            writeln!(out, "{}", stats.format_line())?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn write_file(&self, path: &Path) -> Result<(), MlError> {
        let file = std::fs::File::create(path)?;
        self.write_to(std::io::BufWriter::new(file))
    }
}

fn mean_f32(values: &[f32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| f64::from(v)).sum::<f64>() / values.len() as f64
}
