//! Per-target accuracy plot data, written as tab-separated tables.
//!
//! Each requested target gets four files: `scatter/t{ti}.txt`,
//! `violin/t{ti}.txt`, `roc/t{ti}.txt` and `pr/t{ti}.txt`. Lines starting
//! with `#` carry the headline statistic for the table.

use rand::Rng;
use std::io::Write;
use std::path::Path;

use crate::error::MlError;
use crate::peaks::{NO_PEAKS_AUROC, PeakCalls};
use crate::stats::{average_precision, pr_curve, roc_auc, roc_curve};

pub const PLOT_DIRS: [&str; 4] = ["scatter", "violin", "roc", "pr"];

fn log2p1(v: f32) -> f64 {
    (f64::from(v) + 1.0).log2()
}

fn tsv_writer(path: &Path, comments: &[String]) -> Result<csv::Writer<std::fs::File>, MlError> {
    let mut file = std::fs::File::create(path)?;
    for line in comments {
        writeln!(file, "# {line}")?;
    }
    Ok(csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(file))
}

/// Create the four plot subdirectories under `out_dir`.
pub fn create_plot_dirs(out_dir: &Path) -> Result<(), MlError> {
    for dir in PLOT_DIRS {
        std::fs::create_dir_all(out_dir.join(dir))?;
    }
    Ok(())
}

/// Write every plot table for target `ti`.
pub fn write_target_plots<R: Rng>(
    out_dir: &Path,
    ti: usize,
    calls: &PeakCalls,
    sample: usize,
    rng: &mut R,
) -> Result<(), MlError> {
    let name = format!("t{ti}.txt");
    write_scatter(&out_dir.join("scatter").join(&name), calls, sample, rng)?;
    write_violin(&out_dir.join("violin").join(&name), calls)?;
    write_roc(&out_dir.join("roc").join(&name), calls)?;
    write_pr(&out_dir.join("pr").join(&name), calls)?;
    Ok(())
}

/// log2(x+1) experiment/prediction pairs, subsampled to at most `sample` points.
pub fn write_scatter<R: Rng>(
    path: &Path,
    calls: &PeakCalls,
    sample: usize,
    rng: &mut R,
) -> Result<(), MlError> {
    let n = calls.targets.len();
    let mut indexes = if n > sample {
        rand::seq::index::sample(rng, n, sample).into_vec()
    } else {
        (0..n).collect()
    };
    indexes.sort_unstable();

    let mut wtr = tsv_writer(path, &[format!("points {} of {n}", indexes.len())])?;
    wtr.write_record(["log2_experiment", "log2_prediction"])?;
    for i in indexes {
        wtr.write_record([
            format!("{:.5}", log2p1(calls.targets[i])),
            format!("{:.5}", log2p1(calls.preds[i])),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Linear-interpolated quantile of sorted values.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Distribution of log2 predictions for peak and background samples.
pub fn write_violin(path: &Path, calls: &PeakCalls) -> Result<(), MlError> {
    let mut wtr = tsv_writer(path, &[])?;
    wtr.write_record(["status", "count", "min", "q1", "median", "q3", "max"])?;
    for (status, want) in [("Peak", true), ("Background", false)] {
        let mut values: Vec<f64> = calls
            .labels
            .iter()
            .zip(&calls.preds)
            .filter(|(label, _)| **label == want)
            .map(|(_, &p)| log2p1(p))
            .collect();
        values.sort_by(f64::total_cmp);
        let mut row = vec![status.to_string(), values.len().to_string()];
        row.extend(
            [0.0, 0.25, 0.5, 0.75, 1.0]
                .iter()
                .map(|&q| format!("{:.5}", quantile(&values, q))),
        );
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_roc(path: &Path, calls: &PeakCalls) -> Result<(), MlError> {
    let auroc = roc_auc(&calls.labels, &calls.preds).unwrap_or(NO_PEAKS_AUROC);
    let mut wtr = tsv_writer(path, &[format!("AUROC {auroc:.3}")])?;
    wtr.write_record(["fpr", "tpr"])?;
    for point in roc_curve(&calls.labels, &calls.preds) {
        wtr.write_record([format!("{:.5}", point.fpr), format!("{:.5}", point.tpr)])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_pr(path: &Path, calls: &PeakCalls) -> Result<(), MlError> {
    let auprc = average_precision(&calls.labels, &calls.preds);
    let mut wtr = tsv_writer(
        path,
        &[
            format!("AUPRC {auprc:.3}"),
            format!("baseline {:.5}", calls.peak_fraction()),
        ],
    )?;
    wtr.write_record(["recall", "precision"])?;
    for point in pr_curve(&calls.labels, &calls.preds) {
        wtr.write_record([
            format!("{:.5}", point.recall),
            format!("{:.5}", point.precision),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tempfile::TempDir;

    fn calls() -> PeakCalls {
        PeakCalls {
            targets: vec![0.0, 1.0, 30.0, 0.0, 31.0, 1.0],
            preds: vec![0.1, 0.2, 7.0, 0.0, 6.0, 0.3],
            labels: vec![false, false, true, false, true, false],
            lambda: 10.5,
        }
    }

    #[test]
    fn test_quantile() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&v, 0.0), 1.0);
        assert_eq!(quantile(&v, 1.0), 4.0);
        assert!((quantile(&v, 0.5) - 2.5).abs() < 1e-12);
        assert!(quantile(&[], 0.5).is_nan());
    }

    #[test]
    fn test_write_target_plots() {
        let dir = TempDir::new().unwrap();
        create_plot_dirs(dir.path()).unwrap();
        let mut rng = StdRng::seed_from_u64(44);
        write_target_plots(dir.path(), 2, &calls(), 4, &mut rng).unwrap();

        let scatter = std::fs::read_to_string(dir.path().join("scatter/t2.txt")).unwrap();
        assert!(scatter.starts_with("# points 4 of 6\n"));
        // comment + header + 4 points
        assert_eq!(scatter.lines().count(), 6);

        let violin = std::fs::read_to_string(dir.path().join("violin/t2.txt")).unwrap();
        assert!(violin.contains("Peak\t2\t"));
        assert!(violin.contains("Background\t4\t"));

        let roc = std::fs::read_to_string(dir.path().join("roc/t2.txt")).unwrap();
        assert!(roc.starts_with("# AUROC 1.000\n"));

        let pr = std::fs::read_to_string(dir.path().join("pr/t2.txt")).unwrap();
        assert!(pr.contains("# baseline 0.33333"));
    }
}
