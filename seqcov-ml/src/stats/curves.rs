//! Binary ranking metrics: ROC and precision-recall curves, AUROC, average precision.
//!
//! Scores are grouped by distinct value, so tied predictions move the curve
//! diagonally instead of in an order-dependent staircase.

use serde::{Deserialize, Serialize};

/// A point on the ROC curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RocPoint {
    pub fpr: f64,
    pub tpr: f64,
    pub threshold: f64,
}

/// A point on the precision-recall curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrPoint {
    pub recall: f64,
    pub precision: f64,
    pub threshold: f64,
}

/// Cumulative (fp, tp) counts at each distinct score, highest score first.
fn binary_clf_counts(labels: &[bool], scores: &[f32]) -> Vec<(f64, f64, f64)> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut out = Vec::new();
    let mut tp = 0.0;
    let mut fp = 0.0;
    for (i, &k) in order.iter().enumerate() {
        if labels[k] {
            tp += 1.0;
        } else {
            fp += 1.0;
        }
        let last_of_group = order
            .get(i + 1)
            .is_none_or(|&next| scores[next] != scores[k]);
        if last_of_group {
            out.push((fp, tp, f64::from(scores[k])));
        }
    }
    out
}

/// ROC curve starting at (0, 0). Empty if either class is absent.
pub fn roc_curve(labels: &[bool], scores: &[f32]) -> Vec<RocPoint> {
    let positives = labels.iter().filter(|&&l| l).count() as f64;
    let negatives = labels.len() as f64 - positives;
    if positives == 0.0 || negatives == 0.0 {
        return Vec::new();
    }

    let mut points = vec![RocPoint {
        fpr: 0.0,
        tpr: 0.0,
        threshold: f64::INFINITY,
    }];
    for (fp, tp, threshold) in binary_clf_counts(labels, scores) {
        points.push(RocPoint {
            fpr: fp / negatives,
            tpr: tp / positives,
            threshold,
        });
    }
    points
}

/// Area under the ROC curve by trapezoidal integration.
///
/// Returns `None` when only one class is present (the metric is undefined).
pub fn roc_auc(labels: &[bool], scores: &[f32]) -> Option<f64> {
    let points = roc_curve(labels, scores);
    if points.is_empty() {
        return None;
    }
    let auc = points
        .windows(2)
        .map(|w| (w[1].fpr - w[0].fpr) * (w[0].tpr + w[1].tpr) / 2.0)
        .sum::<f64>();
    Some(auc.clamp(0.0, 1.0))
}

/// Precision-recall curve, from the highest threshold down, prefixed with (0, 1).
pub fn pr_curve(labels: &[bool], scores: &[f32]) -> Vec<PrPoint> {
    let positives = labels.iter().filter(|&&l| l).count() as f64;
    if positives == 0.0 {
        return Vec::new();
    }

    let mut points = vec![PrPoint {
        recall: 0.0,
        precision: 1.0,
        threshold: f64::INFINITY,
    }];
    for (fp, tp, threshold) in binary_clf_counts(labels, scores) {
        points.push(PrPoint {
            recall: tp / positives,
            precision: tp / (tp + fp),
            threshold,
        });
    }
    points
}

/// Average precision: `sum_n (R_n - R_{n-1}) * P_n` over distinct thresholds.
///
/// Returns `0.0` when there are no positive labels.
pub fn average_precision(labels: &[bool], scores: &[f32]) -> f64 {
    pr_curve(labels, scores)
        .windows(2)
        .map(|w| (w[1].recall - w[0].recall) * w[1].precision)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_ranking() {
        let labels = [true, true, false, false];
        let scores = [0.9, 0.8, 0.2, 0.1];
        assert_eq!(roc_auc(&labels, &scores), Some(1.0));
        assert!((average_precision(&labels, &scores) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_inverted_ranking() {
        let labels = [false, false, true, true];
        let scores = [0.9, 0.8, 0.2, 0.1];
        assert_eq!(roc_auc(&labels, &scores), Some(0.0));
    }

    #[test]
    fn test_known_auc() {
        // classic 4-sample example: AUROC 0.75, AP 0.8333...
        let labels = [false, false, true, true];
        let scores = [0.1, 0.4, 0.35, 0.8];
        let auc = roc_auc(&labels, &scores).unwrap();
        assert!((auc - 0.75).abs() < 1e-12);
        let ap = average_precision(&labels, &scores);
        assert!((ap - 0.833_333_333_333_333_4).abs() < 1e-12);
    }

    #[test]
    fn test_ties_are_grouped() {
        let labels = [true, false];
        let scores = [0.5, 0.5];
        assert_eq!(roc_auc(&labels, &scores), Some(0.5));
        let curve = roc_curve(&labels, &scores);
        assert_eq!(curve.len(), 2);
        assert_eq!((curve[1].fpr, curve[1].tpr), (1.0, 1.0));
    }

    #[test]
    fn test_single_class_is_undefined() {
        assert_eq!(roc_auc(&[true, true], &[0.1, 0.2]), None);
        assert_eq!(roc_auc(&[false, false], &[0.1, 0.2]), None);
        assert_eq!(average_precision(&[false, false], &[0.1, 0.2]), 0.0);
    }

    #[test]
    fn test_pr_curve_endpoints() {
        let labels = [true, false, true];
        let scores = [0.9, 0.5, 0.1];
        let curve = pr_curve(&labels, &scores);
        assert_eq!((curve[0].recall, curve[0].precision), (0.0, 1.0));
        let last = curve.last().unwrap();
        assert_eq!(last.recall, 1.0);
        assert!((last.precision - 2.0 / 3.0).abs() < 1e-12);
    }
}
