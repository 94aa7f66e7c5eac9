//! Statistics used by evaluation and peak calling.

pub mod curves;
pub mod fdr;
pub mod poisson;
pub mod regression;

pub use curves::{PrPoint, RocPoint, average_precision, pr_curve, roc_auc, roc_curve};
pub use fdr::benjamini_hochberg;
pub use poisson::upper_tail;
pub use regression::{mean, nan_mean, pearson_r, r_squared};
