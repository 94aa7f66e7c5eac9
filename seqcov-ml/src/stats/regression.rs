//! Regression accuracy: coefficient of determination, Pearson correlation, NaN-aware means.

/// Coefficient of determination of `preds` against `targets`.
///
/// A constant target gives 1.0 for a perfect fit and 0.0 otherwise.
pub fn r_squared(targets: &[f32], preds: &[f32]) -> f64 {
    let n = targets.len().min(preds.len());
    if n == 0 {
        return f64::NAN;
    }
    let mean = targets[..n].iter().map(|&v| f64::from(v)).sum::<f64>() / n as f64;
    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (&y, &p) in targets[..n].iter().zip(&preds[..n]) {
        let (y, p) = (f64::from(y), f64::from(p));
        ss_res += (y - p).powi(2);
        ss_tot += (y - mean).powi(2);
    }
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

/// Pearson correlation; NaN when either side has zero variance.
pub fn pearson_r(xs: &[f32], ys: &[f32]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return f64::NAN;
    }
    let mean_x = xs[..n].iter().map(|&v| f64::from(v)).sum::<f64>() / n as f64;
    let mean_y = ys[..n].iter().map(|&v| f64::from(v)).sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (&x, &y) in xs[..n].iter().zip(&ys[..n]) {
        let dx = f64::from(x) - mean_x;
        let dy = f64::from(y) - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return f64::NAN;
    }
    (cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0)
}

/// Mean over the non-NaN entries; NaN if there are none.
pub fn nan_mean(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), &v| (s + v, c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Plain arithmetic mean; NaN for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        f64::NAN
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
