//! Background accuracy worker.
//!
//! The training loop hands each finished epoch to a single worker over a
//! bounded channel. The worker computes R² and Pearson r from the held
//! validation tensors, reports the epoch, then drops the tensors. The
//! producer calls [`AccuracyQueue::join`] before it needs the memory back,
//! which waits until every enqueued record has been processed.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::summary::{EpochSummary, GenomeSummary};
use crate::accuracy::Accuracy;
use crate::error::MlError;

/// One epoch's losses plus the validation tensors still to be summarised.
#[derive(Debug)]
pub struct AccuracyRecord {
    pub epoch: usize,
    pub steps: usize,
    pub train_losses: Vec<f64>,
    /// NaN for genomes without validation data.
    pub valid_losses: Vec<f64>,
    pub valid_accs: Vec<Option<Accuracy>>,
    pub elapsed: Duration,
    pub best: bool,
}

impl AccuracyRecord {
    pub fn summarize(&self) -> EpochSummary {
        let genomes = self
            .train_losses
            .iter()
            .enumerate()
            .map(|(gi, &train_loss)| {
                let valid_loss = self.valid_losses.get(gi).copied().unwrap_or(f64::NAN);
                let acc = self.valid_accs.get(gi).and_then(Option::as_ref);
                let (valid_r2, valid_r) = match acc {
                    Some(acc) if !valid_loss.is_nan() => {
                        let summary = acc.summary();
                        (summary.mean_r2(), summary.mean_pearson_r())
                    }
                    _ => (f64::NAN, f64::NAN),
                };
                GenomeSummary {
                    genome: gi,
                    train_loss,
                    valid_loss,
                    valid_r2,
                    valid_r,
                }
            })
            .collect();
        EpochSummary::from_genomes(self.epoch, self.steps, self.elapsed, self.best, genomes)
    }
}

/// Receives each epoch summary on the worker thread.
pub trait EpochReporter: Send + 'static {
    fn report(&mut self, summary: &EpochSummary) -> Result<(), MlError>;
}

/// Prints progress lines to stdout and optionally appends JSON lines to a log.
#[derive(Debug, Clone, Default)]
pub struct StdoutReporter {
    summary_log: Option<PathBuf>,
}

impl StdoutReporter {
    pub fn new(summary_log: Option<PathBuf>) -> Self {
        Self { summary_log }
    }
}

impl EpochReporter for StdoutReporter {
    fn report(&mut self, summary: &EpochSummary) -> Result<(), MlError> {
        use std::io::Write;
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for line in summary.format_lines() {
            writeln!(out, "{line}")?;
        }
        out.flush()?;

        if let Some(path) = &self.summary_log {
            seqcov_core::persistence::append_json_line(path, summary)?;
        }
        Ok(())
    }
}

/// Producer side of the accuracy channel.
pub struct AccuracyQueue {
    tx: mpsc::Sender<AccuracyRecord>,
    pending: Arc<watch::Sender<usize>>,
}

impl AccuracyQueue {
    /// Enqueue a record, waiting for space if the channel is full.
    pub async fn enqueue(&self, record: AccuracyRecord) -> Result<(), MlError> {
        self.pending.send_modify(|n| *n += 1);
        if self.tx.send(record).await.is_err() {
            self.pending.send_modify(|n| *n = n.saturating_sub(1));
            return Err(MlError::training("accuracy worker has stopped"));
        }
        Ok(())
    }

    /// Wait until every enqueued record has been reported and released.
    pub async fn join(&self) {
        let mut rx = self.pending.subscribe();
        // the sender lives in self, so this cannot observe a closed channel
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Records enqueued but not yet finished.
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }
}

/// The single consumer draining an [`AccuracyQueue`].
pub struct AccuracyWorker;

impl AccuracyWorker {
    /// Start the worker on a blocking thread.
    ///
    /// The worker exits once the returned queue is dropped and drained.
    pub fn spawn<R: EpochReporter>(
        mut reporter: R,
        capacity: usize,
    ) -> (AccuracyQueue, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<AccuracyRecord>(capacity.max(1));
        let (pending, _) = watch::channel(0usize);
        let pending = Arc::new(pending);
        let worker_pending = Arc::clone(&pending);

        let handle = tokio::task::spawn_blocking(move || {
            while let Some(record) = rx.blocking_recv() {
                let epoch = record.epoch;
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    let summary = record.summarize();
                    reporter.report(&summary)
                }));
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::error!(epoch, error = %e, "Epoch accuracy and progress update failed")
                    }
                    Err(_) => {
                        tracing::error!(epoch, "Epoch accuracy and progress update panicked")
                    }
                }
                drop(record);
                worker_pending.send_modify(|n| *n = n.saturating_sub(1));
            }
            tracing::debug!("Accuracy worker finished");
        });

        (AccuracyQueue { tx, pending }, handle)
    }
}
