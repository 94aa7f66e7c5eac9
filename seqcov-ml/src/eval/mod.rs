//! Evaluation: ensemble prediction passes, the held-out evaluation driver
//! and per-target plot data.

pub mod evaluator;
pub mod plots;
pub mod predict;

pub use evaluator::{EvaluateOptions, EvaluationReport, Evaluator, run_evaluation};
pub use predict::{Predictor, evaluate_dataset};
