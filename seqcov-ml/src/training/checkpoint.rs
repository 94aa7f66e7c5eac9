//! Checkpoint manifest for training runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::error::MlError;

pub const MANIFEST_FILE: &str = "checkpoints.json";

/// One saved set of weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    /// Zero-based epoch that produced the weights.
    pub epoch: usize,
    /// `None` when no genome had validation data.
    pub valid_loss: Option<f64>,
    pub path: PathBuf,
    /// SHA-256 of the weights file.
    pub hash: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Keeps `checkpoints.json` in the log directory up to date.
pub struct CheckpointManager {
    log_dir: PathBuf,
    max_checkpoints: usize,
}

impl CheckpointManager {
    pub fn new(log_dir: PathBuf, max_checkpoints: usize) -> Self {
        Self {
            log_dir,
            max_checkpoints: max_checkpoints.max(1),
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.log_dir.join(MANIFEST_FILE)
    }

    pub fn list(&self) -> Result<Vec<Checkpoint>, MlError> {
        Ok(seqcov_core::persistence::load_json(&self.manifest_path())?.unwrap_or_default())
    }

    /// The entry with the lowest validation loss, or the latest when none has one.
    pub fn best(&self) -> Result<Option<Checkpoint>, MlError> {
        let list = self.list()?;
        let best = list
            .iter()
            .filter_map(|c| c.valid_loss.map(|loss| (loss, c)))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, c)| c.clone());
        Ok(best.or_else(|| list.last().cloned()))
    }

    /// The most recent entry recorded for the weights file at `path`.
    pub fn entry_for(&self, path: &Path) -> Result<Option<Checkpoint>, MlError> {
        Ok(self
            .list()?
            .into_iter()
            .rev()
            .find(|c| {
                c.path == path || c.path.file_name().is_some_and(|n| Some(n) == path.file_name())
            }))
    }

    /// Hash the weights at `path` and append an entry, dropping the oldest past the limit.
    pub fn record(&self, epoch: usize, valid_loss: f64, path: &Path) -> Result<Checkpoint, MlError> {
        let bytes = std::fs::read(path)
            .map_err(|e| MlError::not_found(format!("checkpoint {}: {e}", path.display())))?;
        let hash = format!("{:x}", Sha256::digest(&bytes));

        let checkpoint = Checkpoint {
            id: uuid::Uuid::new_v4().to_string(),
            epoch,
            valid_loss: (!valid_loss.is_nan()).then_some(valid_loss),
            path: path.to_path_buf(),
            hash,
            size_bytes: bytes.len() as u64,
            created_at: Utc::now(),
        };

        let mut checkpoints = self.list()?;
        checkpoints.push(checkpoint.clone());
        if checkpoints.len() > self.max_checkpoints {
            let excess = checkpoints.len() - self.max_checkpoints;
            checkpoints.drain(..excess);
        }
        seqcov_core::persistence::atomic_write_json(&self.manifest_path(), &checkpoints)?;

        tracing::debug!(
            epoch,
            valid_loss,
            hash = %checkpoint.hash,
            "Recorded checkpoint"
        );
        Ok(checkpoint)
    }

    /// Whether the file at `checkpoint.path` still matches its recorded hash.
    pub fn verify(&self, checkpoint: &Checkpoint) -> Result<bool, MlError> {
        let bytes = std::fs::read(&checkpoint.path)?;
        Ok(format!("{:x}", Sha256::digest(&bytes)) == checkpoint.hash)
    }
}
