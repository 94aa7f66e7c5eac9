//! Argument surfaces and run helpers for the `seqcov-evaluate` and
//! `seqcov-train` binaries.
//!
//! The binaries only parse, set up logging and print; everything else lives
//! here so it can be driven from tests.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Parser};

use seqcov_core::config::{parse_indexes, parse_shifts};
use seqcov_core::{EvaluateConfig, FdrMethod, SeqcovConfig, TrainConfig, load_config};
use seqcov_ml::data::JobParams;
use seqcov_ml::eval::{EvaluateOptions, EvaluationReport, Evaluator};
use seqcov_ml::model::CompositionModel;
use seqcov_ml::training::{GenomeData, StdoutReporter, Trainer, TrainerConfig, TrainingOutcome};

/// Flags shared by both binaries.
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl CommonArgs {
    /// Layered configuration rooted at the current directory.
    pub fn load_config(&self) -> anyhow::Result<SeqcovConfig> {
        let cwd = std::env::current_dir().context("Failed to read the working directory")?;
        load_config(Some(&cwd), self.config.as_deref()).context("Failed to load configuration")
    }
}

fn parse_fdr(s: &str) -> Result<FdrMethod, String> {
    s.parse().map_err(|e: seqcov_core::ConfigError| e.to_string())
}

/// Evaluate a trained model on held-out records
#[derive(Parser, Debug, Clone)]
#[command(name = "seqcov-evaluate", version, about, long_about = None)]
pub struct EvaluateArgs {
    /// Model parameters (JSON)
    pub params_file: PathBuf,

    /// Trained model weights
    pub model_file: PathBuf,

    /// Data directory holding `targets.txt` and `records/`
    pub data_dir: PathBuf,

    /// Comma-separated target indexes to write plot tables for
    #[arg(long = "ai")]
    pub accuracy_indexes: Option<String>,

    /// Targets are an upper-triangular Hi-C contact map
    #[arg(long)]
    pub hic: bool,

    /// Monte Carlo ensemble iterations
    #[arg(long = "mc")]
    pub mc_iterations: Option<usize>,

    /// Compute peak AUROC/AUPRC
    #[arg(long = "peak", alias = "peaks")]
    pub peaks: bool,

    /// Output directory for test statistics
    #[arg(short = 'o', long = "out-dir")]
    pub out_dir: Option<PathBuf>,

    /// Average forward and reverse-complement predictions
    #[arg(long)]
    pub rc: bool,

    /// Save predictions and targets as .npy arrays
    #[arg(long)]
    pub save: bool,

    /// Comma-separated ensemble shifts
    #[arg(long, allow_hyphen_values = true)]
    pub shifts: Option<String>,

    /// Targets table (defaults to `<data_dir>/targets.txt`)
    #[arg(short = 't', long = "targets")]
    pub targets_file: Option<PathBuf>,

    /// Record file pattern under `<data_dir>/records/`
    #[arg(long = "tfr")]
    pub tfr_pattern: Option<String>,

    /// q-value procedure: simplified or monotone
    #[arg(long, value_parser = parse_fdr)]
    pub fdr: Option<FdrMethod>,

    /// Seed for Monte Carlo passes and scatter sampling
    #[arg(long)]
    pub seed: Option<u64>,

    #[command(flatten)]
    pub common: CommonArgs,
}

impl EvaluateArgs {
    /// Fold command-line overrides into the configured defaults.
    pub fn apply(&self, config: &mut EvaluateConfig) -> anyhow::Result<()> {
        if let Some(out_dir) = &self.out_dir {
            config.out_dir = out_dir.clone();
        }
        if let Some(pattern) = &self.tfr_pattern {
            config.tfr_pattern = pattern.clone();
        }
        if let Some(shifts) = &self.shifts {
            config.shifts = parse_shifts(shifts)?;
        }
        if self.rc {
            config.rc = true;
        }
        if let Some(mc) = self.mc_iterations {
            config.mc_iterations = mc;
        }
        if let Some(fdr) = self.fdr {
            config.fdr = fdr;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        Ok(())
    }

    pub fn options(&self, config: &EvaluateConfig) -> anyhow::Result<EvaluateOptions> {
        let mut options =
            EvaluateOptions::new(&self.params_file, &self.model_file, &self.data_dir, config);
        options.targets_file = self.targets_file.clone();
        options.hic = self.hic;
        options.save = self.save;
        options.peaks = self.peaks;
        if let Some(ai) = &self.accuracy_indexes {
            options.accuracy_indexes = parse_indexes(ai)?;
        }
        Ok(options)
    }
}

/// Load inputs, restore the model and run the evaluation.
pub fn run_evaluate(args: &EvaluateArgs, config: &EvaluateConfig) -> anyhow::Result<EvaluationReport> {
    let options = args.options(config)?;
    let evaluator = Evaluator::new(options).context("Failed to load evaluation inputs")?;
    let mut model = CompositionModel::from_params(evaluator.params(), args.hic, config.seed)?;
    let report = evaluator
        .run(&mut model)
        .with_context(|| format!("Evaluation of {} failed", args.model_file.display()))?;
    Ok(report)
}

/// Train a model across one or more genomes
#[derive(Parser, Debug, Clone)]
#[command(name = "seqcov-train", version, about, long_about = None)]
pub struct TrainArgs {
    /// Model parameters (JSON)
    #[arg(long)]
    pub params: PathBuf,

    /// Comma-separated training record patterns, one per genome
    #[arg(long = "train-data")]
    pub train_data: String,

    /// Comma-separated validation record patterns, one per genome
    #[arg(long = "test-data")]
    pub test_data: String,

    #[arg(long)]
    pub train_epochs: Option<usize>,

    /// Cap on training batches per genome per epoch
    #[arg(long)]
    pub train_epoch_batches: Option<usize>,

    /// Cap on validation batches per genome per epoch
    #[arg(long)]
    pub test_epoch_batches: Option<usize>,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Randomly reverse-complement training batches
    #[arg(long)]
    pub augment_rc: bool,

    /// Comma-separated shifts sampled for training batches
    #[arg(long, allow_hyphen_values = true)]
    pub augment_shifts: Option<String>,

    /// Average validation predictions over both strands
    #[arg(long)]
    pub ensemble_rc: bool,

    /// Comma-separated shifts averaged during validation
    #[arg(long, allow_hyphen_values = true)]
    pub ensemble_shifts: Option<String>,

    /// Restore weights from this file before the first epoch
    #[arg(long)]
    pub restart: Option<PathBuf>,

    /// Directory for checkpoints and summaries
    #[arg(long)]
    pub logdir: Option<PathBuf>,

    /// Non-improving epochs tolerated before stopping
    #[arg(long)]
    pub patience: Option<usize>,

    #[command(flatten)]
    pub common: CommonArgs,
}

impl TrainArgs {
    pub fn apply(&self, config: &mut TrainConfig) -> anyhow::Result<()> {
        if let Some(logdir) = &self.logdir {
            config.logdir = logdir.clone();
        }
        if self.train_epochs.is_some() {
            config.train_epochs = self.train_epochs;
        }
        if self.train_epoch_batches.is_some() {
            config.train_epoch_batches = self.train_epoch_batches;
        }
        if self.test_epoch_batches.is_some() {
            config.test_epoch_batches = self.test_epoch_batches;
        }
        if self.patience.is_some() {
            config.patience = self.patience;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        config.augment_rc |= self.augment_rc;
        config.ensemble_rc |= self.ensemble_rc;
        if let Some(shifts) = &self.augment_shifts {
            config.augment_shifts = parse_shifts(shifts)?;
        }
        if let Some(shifts) = &self.ensemble_shifts {
            config.ensemble_shifts = parse_shifts(shifts)?;
        }
        Ok(())
    }

    /// Pair train and validation patterns per genome.
    pub fn genome_patterns(&self) -> anyhow::Result<Vec<(PathBuf, PathBuf)>> {
        let train = split_patterns(&self.train_data);
        let test = split_patterns(&self.test_data);
        if train.is_empty() {
            bail!("--train-data needs at least one pattern");
        }
        if train.len() != test.len() {
            bail!(
                "--train-data lists {} genomes but --test-data lists {}",
                train.len(),
                test.len()
            );
        }
        Ok(train.into_iter().zip(test).collect())
    }
}

pub fn split_patterns(s: &str) -> Vec<PathBuf> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Open every genome's data, build the trainer and run it to completion.
pub async fn run_train(args: &TrainArgs, config: &TrainConfig) -> anyhow::Result<TrainingOutcome> {
    let params = JobParams::from_file(&args.params)
        .with_context(|| format!("Failed to read params from {}", args.params.display()))?;

    let patterns = args.genome_patterns()?;
    if patterns.len() != params.model.num_genomes() {
        bail!(
            "{} genome data patterns given but params declare {} genomes",
            patterns.len(),
            params.model.num_genomes()
        );
    }

    let genomes = patterns
        .iter()
        .enumerate()
        .map(|(gi, (train, valid))| {
            GenomeData::open(train, valid, &params, gi)
                .with_context(|| format!("Failed to open data for genome {gi}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let model = CompositionModel::from_params(&params, false, config.seed)?;
    let trainer_config = TrainerConfig::from_settings(config, &params);
    let summary_log = trainer_config.summary_log();
    let mut trainer = Trainer::new(model, genomes, trainer_config)?;

    match &args.restart {
        Some(path) => {
            restore(&mut trainer, path)?;
        }
        None => tracing::info!(seed = config.seed, "Initializing"),
    }

    let outcome = trainer.run(StdoutReporter::new(Some(summary_log))).await?;
    Ok(outcome)
}

fn restore(trainer: &mut Trainer<CompositionModel>, path: &Path) -> anyhow::Result<bool> {
    trainer
        .restore(path)
        .with_context(|| format!("Failed to restore weights from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_evaluate_args_positionals_and_flags() {
        let args = EvaluateArgs::try_parse_from([
            "seqcov-evaluate",
            "params.json",
            "model.tf",
            "data",
            "--ai",
            "0,3",
            "--peak",
            "--rc",
            "--shifts",
            "-1,0,1",
            "-o",
            "out",
            "--fdr",
            "monotone",
        ])
        .unwrap();
        assert_eq!(args.params_file, PathBuf::from("params.json"));
        assert!(args.peaks && args.rc && !args.save && !args.hic);

        let mut config = EvaluateConfig::default();
        args.apply(&mut config).unwrap();
        assert_eq!(config.shifts, vec![-1, 0, 1]);
        assert_eq!(config.out_dir, PathBuf::from("out"));
        assert_eq!(config.fdr, FdrMethod::Monotone);

        let options = args.options(&config).unwrap();
        assert_eq!(options.accuracy_indexes, vec![0, 3]);
        assert_eq!(options.targets_path(), PathBuf::from("data/targets.txt"));
    }

    #[test]
    fn test_evaluate_args_require_three_positionals() {
        assert!(EvaluateArgs::try_parse_from(["seqcov-evaluate", "params.json", "model.tf"]).is_err());
    }

    #[test]
    fn test_evaluate_args_reject_unknown_fdr() {
        assert!(
            EvaluateArgs::try_parse_from(["seqcov-evaluate", "p", "m", "d", "--fdr", "storey"])
                .is_err()
        );
    }

    #[test]
    fn test_evaluate_defaults_untouched_without_flags() {
        let args = EvaluateArgs::try_parse_from(["seqcov-evaluate", "p", "m", "d"]).unwrap();
        let mut config = EvaluateConfig::default();
        args.apply(&mut config).unwrap();
        assert_eq!(config.shifts, vec![0]);
        assert_eq!(config.tfr_pattern, "test-*.jsonl");
        assert_eq!(config.mc_iterations, 0);
    }

    #[test]
    fn test_train_args_overrides() {
        let args = TrainArgs::try_parse_from([
            "seqcov-train",
            "--params",
            "params.json",
            "--train-data",
            "h/train-*.jsonl,m/train-*.jsonl",
            "--test-data",
            "h/valid-*.jsonl,m/valid-*.jsonl",
            "--train-epochs",
            "12",
            "--patience",
            "2",
            "--augment-rc",
            "--augment-shifts",
            "-2,0,2",
            "--logdir",
            "runs/a",
        ])
        .unwrap();

        let mut config = TrainConfig::default();
        args.apply(&mut config).unwrap();
        assert_eq!(config.train_epochs, Some(12));
        assert_eq!(config.patience, Some(2));
        assert!(config.augment_rc && !config.ensemble_rc);
        assert_eq!(config.augment_shifts, vec![-2, 0, 2]);
        assert_eq!(config.ensemble_shifts, vec![0]);
        assert_eq!(config.logdir, PathBuf::from("runs/a"));

        let patterns = args.genome_patterns().unwrap();
        assert_eq!(patterns.len(), 2);
        assert_eq!(patterns[1].1, PathBuf::from("m/valid-*.jsonl"));
    }

    #[test]
    fn test_train_args_mismatched_genomes() {
        let args = TrainArgs::try_parse_from([
            "seqcov-train",
            "--params",
            "p.json",
            "--train-data",
            "a,b",
            "--test-data",
            "a",
        ])
        .unwrap();
        assert!(args.genome_patterns().is_err());
    }

    #[test]
    fn test_split_patterns_skips_blanks() {
        assert_eq!(
            split_patterns(" a/*.jsonl, ,b/*.jsonl,"),
            vec![PathBuf::from("a/*.jsonl"), PathBuf::from("b/*.jsonl")]
        );
    }
}
