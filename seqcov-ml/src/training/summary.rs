//! Per-epoch progress lines and the JSON-lines summary log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::stats::nan_mean;

/// Suffix appended to the epoch line of a new best epoch.
pub const BEST_SUFFIX: &str = ", best!";

/// Compact elapsed time: seconds below 10 minutes, minutes below 100, else hours.
pub fn time_str(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs < 600.0 {
        format!("{:3}s", secs as u64)
    } else if secs < 6000.0 {
        format!("{:3}m", (secs / 60.0) as u64)
    } else {
        format!("{:3.1}h", secs / 3600.0)
    }
}

/// Accuracy of one genome in one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenomeSummary {
    pub genome: usize,
    pub train_loss: f64,
    /// NaN when the genome has no validation data.
    pub valid_loss: f64,
    pub valid_r2: f64,
    pub valid_r: f64,
}

impl GenomeSummary {
    pub fn has_validation(&self) -> bool {
        !self.valid_loss.is_nan()
    }

    pub fn format_line(&self) -> String {
        format!(
            " Genome:{},                    Train loss: {:7.5}, Valid loss: {:7.5}, Valid R2: {:7.5}, Valid R: {:7.5}",
            self.genome, self.train_loss, self.valid_loss, self.valid_r2, self.valid_r
        )
    }
}

/// Everything printed and logged for one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    /// Zero-based; printed one-based.
    pub epoch: usize,
    pub steps: usize,
    pub train_loss: f64,
    pub valid_loss: f64,
    pub valid_r2: f64,
    pub valid_r: f64,
    pub elapsed_secs: f64,
    pub best: bool,
    pub genomes: Vec<GenomeSummary>,
    pub timestamp: DateTime<Utc>,
}

impl EpochSummary {
    /// Aggregate genome summaries with NaN-aware means.
    pub fn from_genomes(
        epoch: usize,
        steps: usize,
        elapsed: Duration,
        best: bool,
        genomes: Vec<GenomeSummary>,
    ) -> Self {
        let agg = |f: fn(&GenomeSummary) -> f64| nan_mean(&genomes.iter().map(f).collect::<Vec<_>>());
        let train_loss = agg(|g| g.train_loss);
        let valid_loss = agg(|g| g.valid_loss);
        let valid_r2 = agg(|g| g.valid_r2);
        let valid_r = agg(|g| g.valid_r);
        Self {
            epoch,
            steps,
            train_loss,
            valid_loss,
            valid_r2,
            valid_r,
            elapsed_secs: elapsed.as_secs_f64(),
            best,
            genomes,
            timestamp: Utc::now(),
        }
    }

    pub fn format_epoch_line(&self) -> String {
        format!(
            "Epoch: {:3},  Steps: {:7},  Train loss: {:7.5}, Valid loss: {:7.5}, Valid R2: {:7.5}, Valid R: {:7.5}, Time: {}{}",
            self.epoch + 1,
            self.steps,
            self.train_loss,
            self.valid_loss,
            self.valid_r2,
            self.valid_r,
            time_str(Duration::from_secs_f64(self.elapsed_secs.max(0.0))),
            if self.best { BEST_SUFFIX } else { "" }
        )
    }

    /// The epoch line followed by one line per genome that has validation data.
    pub fn format_lines(&self) -> Vec<String> {
        let mut lines = vec![self.format_epoch_line()];
        lines.extend(
            self.genomes
                .iter()
                .filter(|g| g.has_validation())
                .map(GenomeSummary::format_line),
        );
        lines
    }
}
