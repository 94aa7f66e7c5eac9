//! # seqcov-ml: evaluation and training for sequence-to-coverage models
//!
//! This crate holds everything between the records on disk and the numbers
//! a run reports:
//!
//! - **Statistics**: Benjamini-Hochberg FDR, Poisson tails, ROC/PR curves, R² and Pearson r
//! - **Peaks**: Poisson peak calling on down-sampled coverage and AUROC/AUPRC scoring
//! - **Evaluation**: ensemble prediction passes and the held-out evaluation driver
//! - **Training**: the multi-genome epoch loop, early stopping, checkpoints and
//!   the background accuracy worker

// Foundation
pub mod error;
pub mod tensor;

// Inputs
pub mod data;

// Statistics and accuracy
pub mod accuracy;
pub mod peaks;
pub mod stats;

// Models
pub mod model;

// Drivers
pub mod eval;
pub mod npy;
pub mod training;

// Re-exports
pub use accuracy::{Accuracy, AccuracySummary};
pub use error::MlError;
pub use eval::{EvaluateOptions, EvaluationReport, Evaluator};
pub use model::{CompositionModel, SeqModel};
pub use peaks::{PeakCaller, PeakReport, PeakStats};
pub use tensor::{Matrix, Tensor3};
pub use training::{StdoutReporter, Trainer, TrainerConfig, TrainingOutcome};
