//! Target annotation table: tab-separated, one row per target.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::MlError;

/// One genomic assay/track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub index: usize,
    pub identifier: String,
    pub description: String,
}

/// Targets in table order; row order defines the target index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetsTable {
    pub targets: Vec<Target>,
}

impl TargetsTable {
    /// Parse a tab-separated table with a header naming `identifier` and `description`.
    ///
    /// Other columns (including a leading index column) are ignored.
    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, MlError> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| MlError::dataset(format!("targets table has no '{name}' column")))
        };
        let id_col = column("identifier")?;
        let desc_col = column("description")?;

        let mut targets = Vec::new();
        for (index, row) in rdr.records().enumerate() {
            let row = row?;
            targets.push(Target {
                index,
                identifier: row.get(id_col).unwrap_or_default().to_string(),
                description: row.get(desc_col).unwrap_or_default().to_string(),
            });
        }
        Ok(Self { targets })
    }

    pub fn from_file(path: &Path) -> Result<Self, MlError> {
        let file = std::fs::File::open(path)
            .map_err(|e| MlError::not_found(format!("targets file {}: {e}", path.display())))?;
        Self::from_reader(file)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Target> {
        self.targets.get(index)
    }

    /// Warn when the table and the model disagree on the number of targets.
    pub fn check_count(&self, expected: usize) -> bool {
        if self.len() != expected {
            tracing::warn!(
                target: seqcov_core::logging::MISMATCH_TARGET,
                table = self.len(),
                expected,
                "Targets table row count differs from the number of model targets"
            );
            return false;
        }
        true
    }
}
