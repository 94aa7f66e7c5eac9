//! Sequence/coverage records and batched datasets.
//!
//! Records are stored one JSON object per line:
//! `{"sequence": "ACGT...", "targets": [[t0, t1, ...], ...]}` where `targets`
//! has one row per output position and one column per target.

use rand::Rng;
use rand::seq::SliceRandom;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::error::MlError;
use crate::tensor::Tensor3;

/// One training/evaluation example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeqRecord {
    pub sequence: String,
    pub targets: Vec<Vec<f32>>,
}

/// A batch of sequences with their stacked coverage.
#[derive(Debug, Clone)]
pub struct Batch {
    pub sequences: Vec<Vec<u8>>,
    pub targets: Tensor3,
}

/// Records loaded from every file matching a pattern.
#[derive(Debug, Clone)]
pub struct SeqDataset {
    records: Vec<SeqRecord>,
    pub batch_size: usize,
    pub seq_length: usize,
    pub target_length: usize,
    num_targets: usize,
}

impl SeqDataset {
    /// Load every record file matching `pattern` (wildcards `*` and `?` in the file name).
    ///
    /// An empty match yields an empty dataset rather than an error; callers
    /// decide whether a genome without data is acceptable.
    pub fn open(
        pattern: &Path,
        batch_size: usize,
        seq_length: usize,
        target_length: usize,
    ) -> Result<Self, MlError> {
        let files = resolve_pattern(pattern)?;
        let mut records = Vec::new();
        for file in &files {
            records.extend(read_records(file)?);
        }
        tracing::debug!(
            pattern = %pattern.display(),
            files = files.len(),
            records = records.len(),
            "Loaded records"
        );
        Self::from_records(records, batch_size, seq_length, target_length)
    }

    pub fn from_records(
        records: Vec<SeqRecord>,
        batch_size: usize,
        seq_length: usize,
        target_length: usize,
    ) -> Result<Self, MlError> {
        if batch_size == 0 {
            return Err(MlError::invalid_input("batch_size must be positive"));
        }
        let num_targets = records
            .first()
            .and_then(|r| r.targets.first())
            .map_or(0, Vec::len);
        for (i, record) in records.iter().enumerate() {
            if record.sequence.len() != seq_length {
                return Err(MlError::dataset(format!(
                    "record {i}: sequence length {} != {seq_length}",
                    record.sequence.len()
                )));
            }
            if record.targets.len() != target_length {
                return Err(MlError::dataset(format!(
                    "record {i}: {} target positions != {target_length}",
                    record.targets.len()
                )));
            }
            if record.targets.iter().any(|row| row.len() != num_targets) {
                return Err(MlError::dataset(format!(
                    "record {i}: expected {num_targets} targets per position"
                )));
            }
        }
        Ok(Self {
            records,
            batch_size,
            seq_length,
            target_length,
            num_targets,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn num_targets(&self) -> usize {
        self.num_targets
    }

    /// Targets with any non-zero coverage in the dataset.
    pub fn num_targets_nonzero(&self) -> usize {
        (0..self.num_targets)
            .filter(|&ti| {
                self.records
                    .iter()
                    .any(|r| r.targets.iter().any(|row| row[ti] != 0.0))
            })
            .count()
    }

    pub fn num_batches(&self) -> usize {
        self.records.len().div_ceil(self.batch_size)
    }

    /// Batches in file order, optionally capped.
    pub fn batches(&self, max_batches: Option<usize>) -> Vec<Batch> {
        let order: Vec<usize> = (0..self.records.len()).collect();
        self.batches_in_order(&order, max_batches)
    }

    /// Batches over a freshly shuffled record order.
    pub fn shuffled_batches<R: Rng>(&self, rng: &mut R, max_batches: Option<usize>) -> Vec<Batch> {
        let mut order: Vec<usize> = (0..self.records.len()).collect();
        order.shuffle(rng);
        self.batches_in_order(&order, max_batches)
    }

    fn batches_in_order(&self, order: &[usize], max_batches: Option<usize>) -> Vec<Batch> {
        let cap = max_batches.unwrap_or(usize::MAX);
        order
            .chunks(self.batch_size)
            .take(cap)
            .map(|chunk| self.make_batch(chunk))
            .collect()
    }

    fn make_batch(&self, indexes: &[usize]) -> Batch {
        let mut targets = Tensor3::zeros(indexes.len(), self.target_length, self.num_targets);
        let mut sequences = Vec::with_capacity(indexes.len());
        for (bi, &ri) in indexes.iter().enumerate() {
            let record = &self.records[ri];
            sequences.push(record.sequence.as_bytes().to_vec());
            for (p, row) in record.targets.iter().enumerate() {
                for (t, &v) in row.iter().enumerate() {
                    targets.set(bi, p, t, v);
                }
            }
        }
        Batch { sequences, targets }
    }

}

/// Read a JSON-lines record file, skipping blank lines.
pub fn read_records(path: &Path) -> Result<Vec<SeqRecord>, MlError> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut records = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: SeqRecord = serde_json::from_str(&line).map_err(|e| {
            MlError::dataset(format!("{}:{}: {e}", path.display(), lineno + 1))
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Write records as JSON lines.
pub fn write_records(path: &Path, records: &[SeqRecord]) -> Result<(), MlError> {
    use std::io::Write;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

/// Files in the pattern's directory whose names match its wildcards, sorted.
pub fn resolve_pattern(pattern: &Path) -> Result<Vec<PathBuf>, MlError> {
    let file_pattern = pattern
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| MlError::invalid_input(format!("bad pattern {}", pattern.display())))?;
    let dir = pattern
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    if !file_pattern.contains(['*', '?']) {
        return Ok(if pattern.is_file() {
            vec![pattern.to_path_buf()]
        } else {
            Vec::new()
        });
    }
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let regex = wildcard_regex(file_pattern)?;
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| regex.is_match(n))
        })
        .collect();
    files.sort();
    Ok(files)
}

fn wildcard_regex(pattern: &str) -> Result<Regex, MlError> {
    let mut expr = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|e| MlError::invalid_input(format!("pattern {pattern}: {e}")))
}
