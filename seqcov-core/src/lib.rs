//! # seqcov-core
//!
//! Shared foundation for the seqcov drivers: layered configuration, error
//! types, atomic persistence helpers and logging setup.

pub mod config;
pub mod error;
pub mod logging;
pub mod persistence;

pub use config::{EvaluateConfig, FdrMethod, LoggingConfig, SeqcovConfig, TrainConfig, load_config};
pub use error::{ConfigError, CoreError, Result};
