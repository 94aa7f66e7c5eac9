//! Held-out evaluation driver.
//!
//! Loads the job parameters, the target annotations and the test records,
//! restores a trained model, then writes per-target statistics to the output
//! directory. Nothing outside the output directory is written.

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;

use seqcov_core::EvaluateConfig;

use super::plots;
use super::predict::{Predictor, evaluate_dataset};
use crate::accuracy::{Accuracy, AccuracySummary};
use crate::data::{JobParams, SeqDataset, TargetsTable};
use crate::error::MlError;
use crate::model::{Ensemble, PositionLayout, SeqModel};
use crate::npy;
use crate::peaks::{PeakCaller, PeakReport};

/// Everything the evaluation driver needs, resolved from config and CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateOptions {
    pub params_file: PathBuf,
    pub model_file: PathBuf,
    pub data_dir: PathBuf,
    /// Defaults to `<data_dir>/targets.txt`.
    pub targets_file: Option<PathBuf>,
    pub out_dir: PathBuf,
    pub tfr_pattern: String,
    pub rc: bool,
    pub shifts: Vec<i64>,
    pub mc_iterations: usize,
    pub hic: bool,
    pub save: bool,
    pub peaks: bool,
    /// Targets that get plot data tables.
    pub accuracy_indexes: Vec<usize>,
    pub peak_caller: PeakCaller,
    pub scatter_sample: usize,
    pub seed: u64,
}

impl EvaluateOptions {
    pub fn new(
        params_file: impl Into<PathBuf>,
        model_file: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
        config: &EvaluateConfig,
    ) -> Self {
        Self {
            params_file: params_file.into(),
            model_file: model_file.into(),
            data_dir: data_dir.into(),
            targets_file: None,
            out_dir: config.out_dir.clone(),
            tfr_pattern: config.tfr_pattern.clone(),
            rc: config.rc,
            shifts: config.shifts.clone(),
            mc_iterations: config.mc_iterations,
            hic: false,
            save: false,
            peaks: false,
            accuracy_indexes: Vec::new(),
            peak_caller: PeakCaller::new(config.peak_stride, config.peak_q_threshold, config.fdr),
            scatter_sample: config.scatter_sample,
            seed: config.seed,
        }
    }

    pub fn targets_path(&self) -> PathBuf {
        self.targets_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("targets.txt"))
    }

    pub fn records_pattern(&self) -> PathBuf {
        self.data_dir.join("records").join(&self.tfr_pattern)
    }

    /// Predictions and targets are only kept when something downstream needs them.
    fn needs_tensors(&self) -> bool {
        self.save || self.peaks || !self.accuracy_indexes.is_empty()
    }
}

/// Aggregate results of an evaluation run.
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub summary: AccuracySummary,
    pub peaks: Option<PeakReport>,
    pub out_dir: PathBuf,
}

impl EvaluationReport {
    /// The stdout summary block.
    pub fn print_to<W: Write>(&self, mut out: W) -> Result<(), MlError> {
        writeln!(out)?;
        writeln!(out, "Test Loss:         {:7.5}", self.summary.loss)?;
        writeln!(out, "Test R2:           {:7.5}", self.summary.mean_r2())?;
        writeln!(out, "Test PearsonR:     {:7.5}", self.summary.mean_pearson_r())?;
        if let Some(peaks) = &self.peaks {
            writeln!(out, "Test AUROC:     {:7.5}", peaks.mean_auroc)?;
            writeln!(out, "Test AUPRC:     {:7.5}", peaks.mean_auprc)?;
        }
        out.flush()?;
        Ok(())
    }
}

/// Evaluation driver with its inputs loaded.
pub struct Evaluator {
    options: EvaluateOptions,
    params: JobParams,
    targets: TargetsTable,
    dataset: SeqDataset,
}

impl Evaluator {
    pub fn new(options: EvaluateOptions) -> Result<Self, MlError> {
        let params = JobParams::from_file(&options.params_file)?;
        let targets = TargetsTable::from_file(&options.targets_path())?;
        let target_length = params.model.output_length(options.hic)?;
        let dataset = SeqDataset::open(
            &options.records_pattern(),
            params.train.batch_size,
            params.model.seq_length,
            target_length,
        )?;
        if dataset.is_empty() {
            return Err(MlError::not_found(format!(
                "no test records match {}",
                options.records_pattern().display()
            )));
        }
        tracing::info!(
            records = dataset.len(),
            targets = targets.len(),
            target_length,
            "Loaded evaluation inputs"
        );
        Ok(Self {
            options,
            params,
            targets,
            dataset,
        })
    }

    pub fn params(&self) -> &JobParams {
        &self.params
    }

    pub fn options(&self) -> &EvaluateOptions {
        &self.options
    }

    /// Restore `model` from the checkpoint and run the full evaluation.
    pub fn run<M: SeqModel + ?Sized>(&self, model: &mut M) -> Result<EvaluationReport, MlError> {
        model.restore(&self.options.model_file)?;
        self.evaluate(model)
    }

    /// Evaluate an already-restored model.
    pub fn evaluate<M: SeqModel + ?Sized>(&self, model: &M) -> Result<EvaluationReport, MlError> {
        let opts = &self.options;
        std::fs::create_dir_all(&opts.out_dir)?;
        self.targets.check_count(model.num_targets(0));

        let ensemble = Ensemble::new(opts.rc, opts.shifts.clone()).with_layout(self.layout()?);
        let mut predictor = Predictor::new(ensemble, opts.mc_iterations, opts.seed);
        let accuracy = evaluate_dataset(model, &self.dataset, 0, &mut predictor, None)?;
        let summary = accuracy.summary();
        self.write_acc(&summary)?;

        let mut peaks = None;
        if opts.needs_tensors() {
            peaks = self.write_extras(&accuracy)?;
        }
        // release the prediction tensors before returning the summary
        drop(accuracy);

        Ok(EvaluationReport {
            summary,
            peaks,
            out_dir: opts.out_dir.clone(),
        })
    }

    /// Position layout of the model output, for mirroring reverse-strand passes.
    pub fn layout(&self) -> Result<PositionLayout, MlError> {
        if self.options.hic {
            Ok(PositionLayout::HicTriangle {
                side: self.params.model.hic_side()?,
            })
        } else {
            Ok(PositionLayout::Linear)
        }
    }

    fn write_acc(&self, summary: &AccuracySummary) -> Result<(), MlError> {
        let path = self.options.out_dir.join("acc.txt");
        let mut out = std::io::BufWriter::new(std::fs::File::create(&path)?);
        for (ti, (r2, r)) in summary.r2.iter().zip(&summary.pearson_r).enumerate() {
            let (id, desc) = self
                .targets
                .get(ti)
                .map_or(("", ""), |t| (t.identifier.as_str(), t.description.as_str()));
            writeln!(out, "{ti:4}  {r2:.5}  {r:.5}  {id:>10}  {desc}")?;
        }
        out.flush()?;
        tracing::debug!(path = %path.display(), "Wrote target accuracy");
        Ok(())
    }

    fn write_extras(&self, accuracy: &Accuracy) -> Result<Option<PeakReport>, MlError> {
        let opts = &self.options;
        if opts.save {
            npy::write_npy_file(&opts.out_dir.join("preds.npy"), &accuracy.preds)?;
            npy::write_npy_file(&opts.out_dir.join("targets.npy"), &accuracy.targets)?;
        }

        let mut report = None;
        if opts.peaks {
            let peaks = opts.peak_caller.evaluate(&accuracy.preds, &accuracy.targets)?;
            peaks.write_file(&opts.out_dir.join("peaks.txt"))?;
            report = Some(peaks);
        }

        if !opts.accuracy_indexes.is_empty() {
            plots::create_plot_dirs(&opts.out_dir)?;
            let mut rng = StdRng::seed_from_u64(opts.seed);
            for &ti in &opts.accuracy_indexes {
                if ti >= accuracy.num_targets() {
                    return Err(MlError::invalid_input(format!(
                        "accuracy index {ti} out of range for {} targets",
                        accuracy.num_targets()
                    )));
                }
                let calls = opts.peak_caller.call(
                    &accuracy.targets.target_matrix(ti),
                    &accuracy.preds.target_matrix(ti),
                )?;
                plots::write_target_plots(&opts.out_dir, ti, &calls, opts.scatter_sample, &mut rng)?;
            }
        }
        Ok(report)
    }
}

/// Shortcut used by tests and tools: evaluate with a model restored from disk.
pub fn run_evaluation<M: SeqModel + ?Sized>(
    options: EvaluateOptions,
    model: &mut M,
) -> Result<EvaluationReport, MlError> {
    Evaluator::new(options)?.run(model)
}
