//! Input data: parameter files, sequence records, target annotations.

pub mod dna;
pub mod params;
pub mod records;
pub mod targets;

pub use params::{JobParams, ModelParams, NumTargets, TrainParams};
pub use records::{Batch, SeqDataset, SeqRecord};
pub use targets::{Target, TargetsTable};
