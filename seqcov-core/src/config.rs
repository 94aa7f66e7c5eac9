//! Configuration system for seqcov.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from the user config directory (`config.toml`) and/or
//! `.seqcov/config.toml` in the working directory. CLI flags are applied last by
//! the binaries on the extracted struct.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Top-level configuration for both drivers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeqcovConfig {
    #[serde(default)]
    pub evaluate: EvaluateConfig,
    #[serde(default)]
    pub train: TrainConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How p-values are converted into q-values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FdrMethod {
    /// `q = p * m / rank` with no running minimum.
    #[default]
    Simplified,
    /// Canonical Benjamini-Hochberg with the monotone step-up pass.
    Monotone,
}

impl std::str::FromStr for FdrMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simplified" => Ok(Self::Simplified),
            "monotone" | "bh" => Ok(Self::Monotone),
            other => Err(ConfigError::invalid(
                "fdr",
                format!("unknown method '{other}' (expected simplified or monotone)"),
            )),
        }
    }
}

/// Evaluation driver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateConfig {
    /// Output directory for test statistics.
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
    /// Record file pattern, resolved under `<data_dir>/records/`.
    #[serde(default = "default_tfr_pattern")]
    pub tfr_pattern: String,
    /// Ensemble prediction shifts.
    #[serde(default = "default_shifts")]
    pub shifts: Vec<i64>,
    /// Average forward and reverse-complement predictions.
    #[serde(default)]
    pub rc: bool,
    /// Monte Carlo ensemble iterations.
    #[serde(default)]
    pub mc_iterations: usize,
    /// Column stride used before flattening for peak statistics.
    #[serde(default = "default_peak_stride")]
    pub peak_stride: usize,
    /// q-value below which a sample is called a peak.
    #[serde(default = "default_peak_q_threshold")]
    pub peak_q_threshold: f64,
    #[serde(default)]
    pub fdr: FdrMethod,
    /// Maximum number of points written to a scatter table.
    #[serde(default = "default_scatter_sample")]
    pub scatter_sample: usize,
    #[serde(default = "default_eval_seed")]
    pub seed: u64,
}

impl Default for EvaluateConfig {
    fn default() -> Self {
        Self {
            out_dir: default_out_dir(),
            tfr_pattern: default_tfr_pattern(),
            shifts: default_shifts(),
            rc: false,
            mc_iterations: 0,
            peak_stride: default_peak_stride(),
            peak_q_threshold: default_peak_q_threshold(),
            fdr: FdrMethod::default(),
            scatter_sample: default_scatter_sample(),
            seed: default_eval_seed(),
        }
    }
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("test_out")
}

fn default_tfr_pattern() -> String {
    "test-*.jsonl".to_string()
}

fn default_shifts() -> Vec<i64> {
    vec![0]
}

fn default_peak_stride() -> usize {
    8
}

fn default_peak_q_threshold() -> f64 {
    0.01
}

fn default_scatter_sample() -> usize {
    500
}

fn default_eval_seed() -> u64 {
    44
}

/// Training loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Directory for checkpoints and summary logs.
    #[serde(default = "default_logdir")]
    pub logdir: PathBuf,
    /// Fixed epoch budget; `None` trains until early stopping.
    #[serde(default)]
    pub train_epochs: Option<usize>,
    #[serde(default)]
    pub train_epoch_batches: Option<usize>,
    #[serde(default)]
    pub test_epoch_batches: Option<usize>,
    /// Consecutive non-improving epochs before stopping (params file may override).
    #[serde(default)]
    pub patience: Option<usize>,
    #[serde(default = "default_train_seed")]
    pub seed: u64,
    #[serde(default)]
    pub augment_rc: bool,
    #[serde(default = "default_shifts")]
    pub augment_shifts: Vec<i64>,
    #[serde(default)]
    pub ensemble_rc: bool,
    #[serde(default = "default_shifts")]
    pub ensemble_shifts: Vec<i64>,
    /// Capacity of the accuracy summary queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Checkpoint entries kept in the manifest.
    #[serde(default = "default_max_checkpoints")]
    pub max_checkpoints: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            logdir: default_logdir(),
            train_epochs: None,
            train_epoch_batches: None,
            test_epoch_batches: None,
            patience: None,
            seed: default_train_seed(),
            augment_rc: false,
            augment_shifts: default_shifts(),
            ensemble_rc: false,
            ensemble_shifts: default_shifts(),
            queue_capacity: default_queue_capacity(),
            max_checkpoints: default_max_checkpoints(),
        }
    }
}

fn default_logdir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_train_seed() -> u64 {
    1
}

fn default_queue_capacity() -> usize {
    1
}

fn default_max_checkpoints() -> usize {
    10
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Write a JSON log file next to the run outputs.
    #[serde(default = "default_true")]
    pub file_log: bool,
    /// Filter directive for the JSON file layer.
    #[serde(default = "default_file_level")]
    pub file_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file_log: true,
            file_level: default_file_level(),
        }
    }
}

fn default_file_level() -> String {
    "debug".to_string()
}

fn default_true() -> bool {
    true
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit config file (passed as argument)
/// 2. Environment variables (prefixed with `SEQCOV_`, `__` separates sections)
/// 3. Workspace-local config (`.seqcov/config.toml`)
/// 4. User config (`~/.config/seqcov/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<SeqcovConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(SeqcovConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("org", "seqcov", "seqcov") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".seqcov").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // SEQCOV_TRAIN__PATIENCE, SEQCOV_EVALUATE__OUT_DIR, ...
    figment = figment.merge(Env::prefixed("SEQCOV_").split("__"));

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ConfigError::MissingFile {
                path: path.to_path_buf(),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    let config: SeqcovConfig = figment.extract().map_err(Box::new)?;
    config.validate()?;
    Ok(config)
}

impl SeqcovConfig {
    /// Reject settings the drivers cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.evaluate.peak_stride == 0 {
            return Err(ConfigError::invalid("evaluate.peak_stride", "must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.evaluate.peak_q_threshold) {
            return Err(ConfigError::invalid(
                "evaluate.peak_q_threshold",
                "must be within [0, 1]",
            ));
        }
        if self.evaluate.shifts.is_empty() {
            return Err(ConfigError::invalid("evaluate.shifts", "at least one shift"));
        }
        if self.train.augment_shifts.is_empty() || self.train.ensemble_shifts.is_empty() {
            return Err(ConfigError::invalid("train.shifts", "at least one shift"));
        }
        if self.train.queue_capacity == 0 {
            return Err(ConfigError::invalid("train.queue_capacity", "must be >= 1"));
        }
        if self.train.max_checkpoints == 0 {
            return Err(ConfigError::invalid("train.max_checkpoints", "must be >= 1"));
        }
        Ok(())
    }
}

/// Parse a comma-separated list of integer shifts (`"0,-1,1"`).
pub fn parse_shifts(s: &str) -> Result<Vec<i64>, ConfigError> {
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| {
            t.parse::<i64>()
                .map_err(|e| ConfigError::invalid("shifts", format!("'{t}': {e}")))
        })
        .collect::<Result<Vec<_>, _>>()
        .and_then(|v| {
            if v.is_empty() {
                Err(ConfigError::invalid("shifts", "empty list"))
            } else {
                Ok(v)
            }
        })
}

/// Parse a comma-separated list of target indexes (`"0,3,7"`).
pub fn parse_indexes(s: &str) -> Result<Vec<usize>, ConfigError> {
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| {
            t.parse::<usize>()
                .map_err(|e| ConfigError::invalid("indexes", format!("'{t}': {e}")))
        })
        .collect()
}
