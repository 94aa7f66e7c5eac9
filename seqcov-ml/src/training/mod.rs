//! Training infrastructure: the epoch loop, early stopping, checkpoints and
//! the background accuracy worker.

pub mod callbacks;
pub mod checkpoint;
pub mod summary;
pub mod trainer;
pub mod worker;

pub use callbacks::{CallbackAction, EarlyStopping};
pub use checkpoint::{Checkpoint, CheckpointManager};
pub use summary::{EpochSummary, GenomeSummary, time_str};
pub use trainer::{
    BEST_MODEL_FILE, GenomeData, StopReason, Trainer, TrainerConfig, TrainerState, TrainingOutcome,
};
pub use worker::{AccuracyQueue, AccuracyRecord, AccuracyWorker, EpochReporter, StdoutReporter};
