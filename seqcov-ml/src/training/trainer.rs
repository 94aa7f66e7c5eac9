//! Multi-genome training loop with early stopping.
//!
//! Each epoch moves through TRAINING (round-robin over genomes' shuffled
//! batches), VALIDATING (one pass per genome, NaN when a genome has no
//! validation data) and SUMMARIZING (best-loss bookkeeping, checkpointing,
//! hand-off to the accuracy worker). The loop stops when the optional epoch
//! budget runs out or the early-stopping counter reaches the patience.

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::runtime::RuntimeFlavor;

use seqcov_core::TrainConfig;

use super::callbacks::{CallbackAction, EarlyStopping};
use super::checkpoint::{Checkpoint, CheckpointManager};
use super::worker::{AccuracyQueue, AccuracyRecord, AccuracyWorker, EpochReporter};
use crate::accuracy::Accuracy;
use crate::data::{Batch, JobParams, SeqDataset};
use crate::error::MlError;
use crate::eval::{Predictor, evaluate_dataset};
use crate::model::{Augmentation, Ensemble, SeqModel};
use crate::stats::nan_mean;

/// Run CPU-bound epoch work off the async scheduler. On a multi-threaded
/// runtime the current worker hands its queue to another thread first;
/// elsewhere the closure runs inline.
fn compute<T>(f: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

/// File name of the best-so-far weights inside the log directory.
pub const BEST_MODEL_FILE: &str = "model_best.tf";

/// Resolved training settings, passed explicitly into [`Trainer::new`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    pub train_epochs: Option<usize>,
    pub train_epoch_batches: Option<usize>,
    pub test_epoch_batches: Option<usize>,
    pub patience: usize,
    pub seed: u64,
    pub augmentation: Augmentation,
    pub ensemble: Ensemble,
    pub logdir: PathBuf,
    pub queue_capacity: usize,
    pub max_checkpoints: usize,
}

impl TrainerConfig {
    /// Merge driver settings with the params file; an explicit patience wins.
    pub fn from_settings(config: &TrainConfig, params: &JobParams) -> Self {
        Self {
            train_epochs: config.train_epochs,
            train_epoch_batches: config.train_epoch_batches,
            test_epoch_batches: config.test_epoch_batches,
            patience: config.patience.unwrap_or(params.train.patience),
            seed: config.seed,
            augmentation: Augmentation::new(config.augment_rc, config.augment_shifts.clone()),
            ensemble: Ensemble::new(config.ensemble_rc, config.ensemble_shifts.clone()),
            logdir: config.logdir.clone(),
            queue_capacity: config.queue_capacity,
            max_checkpoints: config.max_checkpoints,
        }
    }

    pub fn summary_log(&self) -> PathBuf {
        self.logdir.join("train").join("summary.jsonl")
    }
}

/// Training and validation data for one genome; either side may be absent.
#[derive(Debug, Clone, Default)]
pub struct GenomeData {
    pub train: Option<SeqDataset>,
    pub valid: Option<SeqDataset>,
}

impl GenomeData {
    /// Load both patterns; an empty match leaves that side absent.
    pub fn open(
        train_pattern: &Path,
        valid_pattern: &Path,
        params: &JobParams,
        genome: usize,
    ) -> Result<Self, MlError> {
        let open = |pattern: &Path| -> Result<Option<SeqDataset>, MlError> {
            let ds = SeqDataset::open(
                pattern,
                params.train.batch_size,
                params.model.seq_length,
                params.model.target_length,
            )?;
            Ok((!ds.is_empty()).then_some(ds))
        };
        let data = Self {
            train: open(train_pattern)?,
            valid: open(valid_pattern)?,
        };

        let expected = params.model.num_targets_for(genome);
        if let Some(train) = &data.train {
            let found = train.num_targets_nonzero();
            if found != expected {
                tracing::warn!(
                    target: seqcov_core::logging::MISMATCH_TARGET,
                    genome,
                    found,
                    expected,
                    "Nonzero target count differs from the params file"
                );
            }
        }
        Ok(data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainerState {
    Initializing,
    Training,
    Validating,
    Summarizing,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    EpochBudget,
    EarlyStopping,
}

/// What a finished run did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingOutcome {
    pub epochs: usize,
    pub steps: usize,
    pub best_epoch: Option<usize>,
    pub best_loss: Option<f64>,
    pub stop_reason: StopReason,
}

pub struct Trainer<M: SeqModel> {
    model: M,
    genomes: Vec<GenomeData>,
    config: TrainerConfig,
    rng: StdRng,
    early_stopping: EarlyStopping,
    checkpoints: CheckpointManager,
    state: TrainerState,
    steps: usize,
}

impl<M: SeqModel> Trainer<M> {
    pub fn new(model: M, genomes: Vec<GenomeData>, config: TrainerConfig) -> Result<Self, MlError> {
        if genomes.len() != model.num_genomes() {
            return Err(MlError::training(format!(
                "{} genome datasets for a model with {} genomes",
                genomes.len(),
                model.num_genomes()
            )));
        }
        if genomes.iter().all(|g| g.train.is_none()) {
            return Err(MlError::dataset("no training records for any genome"));
        }
        if config.patience == 0 {
            return Err(MlError::invalid_input("patience must be >= 1"));
        }
        std::fs::create_dir_all(&config.logdir)?;

        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            early_stopping: EarlyStopping::new(config.patience, 0.0),
            checkpoints: CheckpointManager::new(config.logdir.clone(), config.max_checkpoints),
            state: TrainerState::Initializing,
            steps: 0,
            model,
            genomes,
            config,
        })
    }

    /// Load weights before the first epoch instead of training from the seed.
    ///
    /// When the weights sit next to a checkpoint manifest that recorded them,
    /// the file hash is checked first. A mismatch is logged, not fatal.
    /// Returns whether the weights matched a manifest entry.
    pub fn restore(&mut self, path: &Path) -> Result<bool, MlError> {
        let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let manifest = CheckpointManager::new(dir.to_path_buf(), self.config.max_checkpoints);
        let mut verified = false;
        if let Some(entry) = manifest.entry_for(path)? {
            let entry = Checkpoint {
                path: path.to_path_buf(),
                ..entry
            };
            verified = manifest.verify(&entry)?;
            if !verified {
                tracing::warn!(
                    path = %path.display(),
                    epoch = entry.epoch,
                    "Restart weights differ from the recorded checkpoint"
                );
            }
        }
        if let Some(best) = manifest.best()? {
            tracing::info!(epoch = best.epoch, valid_loss = ?best.valid_loss, "Previous best checkpoint");
        }

        self.model.restore(path)?;
        tracing::info!(path = %path.display(), verified, "Restored model weights");
        Ok(verified)
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    pub fn state(&self) -> TrainerState {
        self.state
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    pub fn best_model_path(&self) -> PathBuf {
        self.config.logdir.join(BEST_MODEL_FILE)
    }

    fn set_state(&mut self, state: TrainerState) {
        tracing::trace!(from = ?self.state, to = ?state, "Trainer state");
        self.state = state;
    }

    fn budget_left(&self, epoch: usize) -> bool {
        self.config.train_epochs.is_none_or(|budget| epoch < budget)
    }

    /// Train until the epoch budget or patience runs out.
    pub async fn run<R: EpochReporter>(&mut self, reporter: R) -> Result<TrainingOutcome, MlError> {
        let (queue, worker) = AccuracyWorker::spawn(reporter, self.config.queue_capacity);
        let result = self.run_epochs(&queue).await;

        queue.join().await;
        drop(queue);
        worker
            .await
            .map_err(|e| MlError::training(format!("accuracy worker failed: {e}")))?;
        self.set_state(TrainerState::Stopped);
        result
    }

    async fn run_epochs(&mut self, queue: &AccuracyQueue) -> Result<TrainingOutcome, MlError> {
        let mut epoch = 0;
        while self.budget_left(epoch) && !self.early_stopping.should_stop() {
            let t0 = Instant::now();

            self.set_state(TrainerState::Training);
            let train_losses = compute(|| self.train_epoch())?;

            // the previous epoch's validation tensors must be released first
            queue.join().await;

            self.set_state(TrainerState::Validating);
            let (valid_losses, valid_accs) = compute(|| self.validate_epoch())?;

            self.set_state(TrainerState::Summarizing);
            let valid_loss = nan_mean(&valid_losses);
            let best = self.early_stopping.on_epoch_end(epoch, valid_loss) == CallbackAction::Checkpoint;
            if best {
                let path = self.best_model_path();
                self.model.save(&path)?;
                self.checkpoints.record(epoch, valid_loss, &path)?;
            }
            tracing::debug!(
                epoch,
                valid_loss,
                best,
                counter = self.early_stopping.counter(),
                "Epoch finished"
            );

            queue
                .enqueue(AccuracyRecord {
                    epoch,
                    steps: self.steps,
                    train_losses,
                    valid_losses,
                    valid_accs,
                    elapsed: t0.elapsed(),
                    best,
                })
                .await?;
            epoch += 1;
        }

        let stop_reason = if self.early_stopping.should_stop() {
            StopReason::EarlyStopping
        } else {
            StopReason::EpochBudget
        };
        tracing::info!(
            epochs = epoch,
            steps = self.steps,
            best_epoch = ?self.early_stopping.best_epoch(),
            ?stop_reason,
            "Training stopped"
        );
        Ok(TrainingOutcome {
            epochs: epoch,
            steps: self.steps,
            best_epoch: self.early_stopping.best_epoch(),
            best_loss: self.early_stopping.best_loss().filter(|l| !l.is_nan()),
            stop_reason,
        })
    }

    /// One pass over every genome's shuffled training batches, interleaved
    /// round-robin. Returns the mean loss per genome (NaN without data).
    fn train_epoch(&mut self) -> Result<Vec<f64>, MlError> {
        let cap = self.config.train_epoch_batches;
        let mut queues: Vec<VecDeque<Batch>> = self
            .genomes
            .iter()
            .map(|g| {
                g.train
                    .as_ref()
                    .map(|ds| VecDeque::from(ds.shuffled_batches(&mut self.rng, cap)))
                    .unwrap_or_default()
            })
            .collect();

        let mut sums = vec![0.0; queues.len()];
        let mut counts = vec![0usize; queues.len()];
        loop {
            let mut progressed = false;
            for (gi, batches) in queues.iter_mut().enumerate() {
                let Some(batch) = batches.pop_front() else {
                    continue;
                };
                let (sequences, targets) =
                    self.config
                        .augmentation
                        .apply(&mut self.rng, &batch.sequences, &batch.targets);
                let loss = self.model.train_step(&sequences, &targets, gi)?;
                sums[gi] += loss;
                counts[gi] += 1;
                self.steps += 1;
                progressed = true;
            }
            if !progressed {
                break;
            }
        }

        Ok(sums
            .iter()
            .zip(&counts)
            .map(|(&s, &n)| if n == 0 { f64::NAN } else { s / n as f64 })
            .collect())
    }

    fn validate_epoch(&self) -> Result<(Vec<f64>, Vec<Option<Accuracy>>), MlError> {
        let mut predictor = Predictor::new(self.config.ensemble.clone(), 0, self.config.seed);
        let mut losses = Vec::with_capacity(self.genomes.len());
        let mut accs = Vec::with_capacity(self.genomes.len());
        for (gi, genome) in self.genomes.iter().enumerate() {
            match &genome.valid {
                None => {
                    losses.push(f64::NAN);
                    accs.push(None);
                }
                Some(ds) => {
                    let acc = evaluate_dataset(
                        &self.model,
                        ds,
                        gi,
                        &mut predictor,
                        self.config.test_epoch_batches,
                    )?;
                    losses.push(acc.loss);
                    accs.push(Some(acc));
                }
            }
        }
        Ok((losses, accs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SeqRecord;
    use crate::tensor::Tensor3;
    use crate::training::summary::EpochSummary;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Predicts a constant that follows a script indexed by completed epochs,
    /// so with all-zero targets the validation loss equals the scripted value.
    struct ScriptedModel {
        script: Vec<f32>,
        train_calls: usize,
        batches_per_epoch: usize,
        /// Training steps wait for this flag, recording whether it was set.
        gate: Option<Arc<AtomicBool>>,
        gate_opened: bool,
    }

    impl ScriptedModel {
        fn new(script: Vec<f32>) -> Self {
            Self {
                script,
                train_calls: 0,
                batches_per_epoch: 1,
                gate: None,
                gate_opened: false,
            }
        }
    }

    impl SeqModel for ScriptedModel {
        fn num_genomes(&self) -> usize {
            1
        }

        fn num_targets(&self, _genome: usize) -> usize {
            1
        }

        fn output_length(&self) -> usize {
            2
        }

        fn predict(&self, sequences: &[Vec<u8>], _genome: usize) -> Result<Tensor3, MlError> {
            let epoch = (self.train_calls / self.batches_per_epoch).saturating_sub(1);
            let value = self.script[epoch.min(self.script.len() - 1)];
            Ok(Tensor3::from_vec(
                [sequences.len(), 2, 1],
                vec![value; sequences.len() * 2],
            )?)
        }

        fn train_step(
            &mut self,
            _sequences: &[Vec<u8>],
            _targets: &Tensor3,
            _genome: usize,
        ) -> Result<f64, MlError> {
            self.train_calls += 1;
            if let Some(gate) = &self.gate {
                let deadline = Instant::now() + std::time::Duration::from_secs(2);
                while !gate.load(Ordering::SeqCst) && Instant::now() < deadline {
                    std::thread::sleep(std::time::Duration::from_millis(1));
                }
                self.gate_opened |= gate.load(Ordering::SeqCst);
            }
            Ok(1.0)
        }

        fn save(&self, path: &Path) -> Result<(), MlError> {
            seqcov_core::persistence::atomic_write_json(path, &self.train_calls)?;
            Ok(())
        }

        fn restore(&mut self, _path: &Path) -> Result<(), MlError> {
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct Collect(Arc<Mutex<Vec<EpochSummary>>>);

    impl EpochReporter for Collect {
        fn report(&mut self, summary: &EpochSummary) -> Result<(), MlError> {
            self.0.lock().unwrap().push(summary.clone());
            Ok(())
        }
    }

    fn dataset() -> SeqDataset {
        let records = (0..2)
            .map(|_| SeqRecord {
                sequence: "ACGT".to_string(),
                targets: vec![vec![0.0]; 2],
            })
            .collect();
        SeqDataset::from_records(records, 2, 4, 2).unwrap()
    }

    fn config(dir: &Path, patience: usize, budget: Option<usize>) -> TrainerConfig {
        TrainerConfig {
            train_epochs: budget,
            train_epoch_batches: None,
            test_epoch_batches: None,
            patience,
            seed: 1,
            augmentation: Augmentation::default(),
            ensemble: Ensemble::default(),
            logdir: dir.to_path_buf(),
            queue_capacity: 1,
            max_checkpoints: 10,
        }
    }

    fn trainer(dir: &Path, script: Vec<f32>, patience: usize, budget: Option<usize>) -> Trainer<ScriptedModel> {
        let model = ScriptedModel::new(script);
        let data = GenomeData {
            train: Some(dataset()),
            valid: Some(dataset()),
        };
        Trainer::new(model, vec![data], config(dir, patience, budget)).unwrap()
    }

    #[tokio::test]
    async fn test_early_stopping_after_patience() {
        let dir = TempDir::new().unwrap();
        let mut t = trainer(dir.path(), vec![1.0, 0.5, 0.6, 0.7, 0.8, 0.1], 3, None);
        let collect = Collect::default();
        let outcome = t.run(collect.clone()).await.unwrap();

        // epochs 0 and 1 improve, 2..=4 do not; the improving 0.1 is never reached
        assert_eq!(outcome.epochs, 5);
        assert_eq!(outcome.best_epoch, Some(1));
        assert_eq!(outcome.stop_reason, StopReason::EarlyStopping);
        assert_eq!(t.state(), TrainerState::Stopped);

        let best: Vec<bool> = collect.0.lock().unwrap().iter().map(|s| s.best).collect();
        assert_eq!(best, vec![true, true, false, false, false]);

        let manifest = t.checkpoints().list().unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest[1].epoch, 1);
        assert!(t.best_model_path().is_file());
    }

    #[tokio::test]
    async fn test_epoch_budget_stops_first() {
        let dir = TempDir::new().unwrap();
        let mut t = trainer(dir.path(), vec![1.0, 0.9, 0.8, 0.7], 2, Some(3));
        let outcome = t.run(Collect::default()).await.unwrap();
        assert_eq!(outcome.epochs, 3);
        assert_eq!(outcome.steps, 3);
        assert_eq!(outcome.stop_reason, StopReason::EpochBudget);
        assert_eq!(outcome.best_epoch, Some(2));
    }

    #[tokio::test]
    async fn test_genome_without_validation_reports_nan() {
        let dir = TempDir::new().unwrap();
        let model = ScriptedModel::new(vec![1.0]);
        let data = GenomeData {
            train: Some(dataset()),
            valid: None,
        };
        let mut t = Trainer::new(model, vec![data], config(dir.path(), 2, None)).unwrap();
        let collect = Collect::default();
        let outcome = t.run(collect.clone()).await.unwrap();

        // the first epoch is checkpointed, later NaN epochs never improve
        assert_eq!(outcome.epochs, 3);
        assert_eq!(outcome.best_epoch, Some(0));
        assert_eq!(outcome.best_loss, None);
        assert!(t.best_model_path().is_file());
        let manifest = t.checkpoints().list().unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest[0].valid_loss, None);

        let summaries = collect.0.lock().unwrap();
        assert!(summaries[0].valid_loss.is_nan());
        assert!(summaries[0].best);
        assert!(!summaries[1].best);
        assert!(summaries[0].format_lines().len() == 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_epoch_work_leaves_runtime_responsive() {
        let dir = TempDir::new().unwrap();
        let gate = Arc::new(AtomicBool::new(false));
        let mut t = trainer(dir.path(), vec![1.0], 2, Some(1));
        t.model.gate = Some(gate.clone());

        // the only worker thread runs the trainer; the gate task needs another
        let training = tokio::spawn(async move {
            let outcome = t.run(Collect::default()).await;
            (t, outcome)
        });
        tokio::spawn(async move { gate.store(true, Ordering::SeqCst) });

        let (t, outcome) = training.await.unwrap();
        assert_eq!(outcome.unwrap().epochs, 1);
        assert!(t.model().gate_opened);
    }

    #[tokio::test]
    async fn test_restore_verifies_recorded_checkpoint() {
        let first = TempDir::new().unwrap();
        let mut t = trainer(first.path(), vec![1.0], 2, Some(1));
        t.run(Collect::default()).await.unwrap();
        let weights = t.best_model_path();

        let second = TempDir::new().unwrap();
        let mut restarted = trainer(second.path(), vec![1.0], 2, Some(1));
        assert!(restarted.restore(&weights).unwrap());

        // tampered weights still load, but no longer match the manifest
        std::fs::write(&weights, "999").unwrap();
        assert!(!restarted.restore(&weights).unwrap());

        let loose = second.path().join("loose.tf");
        std::fs::write(&loose, "0").unwrap();
        assert!(!restarted.restore(&loose).unwrap());
    }

    #[test]
    fn test_rejects_genome_count_mismatch() {
        let dir = TempDir::new().unwrap();
        let model = ScriptedModel::new(vec![1.0]);
        let result = Trainer::new(model, Vec::new(), config(dir.path(), 2, None));
        assert!(result.is_err());
    }

    #[test]
    fn test_patience_from_params_when_unset() {
        let params: JobParams = serde_json::from_str(
            r#"{"model": {"seq_length": 8, "target_length": 2, "num_targets": 1},
                "train": {"batch_size": 2, "patience": 7}}"#,
        )
        .unwrap();
        let mut settings = TrainConfig::default();
        assert_eq!(TrainerConfig::from_settings(&settings, &params).patience, 7);
        settings.patience = Some(3);
        assert_eq!(TrainerConfig::from_settings(&settings, &params).patience, 3);
    }
}
