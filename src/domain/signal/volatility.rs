//! Rolling dispersion statistics over return series.
//!
//! MEAN(n)[i] = sum(x[i-j] for j in 0..n) / n
//! STD(n)[i]  = sqrt(sum((x[i-j] - MEAN(n)[i])^2 for j in 0..n) / (n - 1))
//! Warmup: first (n-1) rows are NaN, and so is any window holding a NaN.

pub const ANNUALIZATION_DAYS: f64 = 252.0;

fn window(values: &[f64], i: usize, n: usize) -> Option<&[f64]> {
    if n == 0 || i + 1 < n {
        return None;
    }
    let slice = &values[i + 1 - n..=i];
    if slice.iter().any(|v| v.is_nan()) {
        None
    } else {
        Some(slice)
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation; NaN below two observations.
pub(crate) fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let variance =
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

pub fn rolling_mean(values: &[f64], period: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| window(values, i, period).map_or(f64::NAN, mean))
        .collect()
}

pub fn rolling_std(values: &[f64], period: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| window(values, i, period).map_or(f64::NAN, sample_std))
        .collect()
}

/// Returns with gains replaced by zero.
pub fn downside(returns: &[f64]) -> Vec<f64> {
    returns
        .iter()
        .map(|&r| if r.is_nan() { r } else { r.min(0.0) })
        .collect()
}

/// Annualised rolling mean over rolling deviation; NaN (warm-up, 0/0) reads as 0.
pub fn rolling_sharpe(returns: &[f64], period: usize) -> Vec<f64> {
    ratio_series(&rolling_mean(returns, period), &rolling_std(returns, period))
}

/// Like [`rolling_sharpe`] but dividing by the deviation of the downside returns.
pub fn rolling_sortino(returns: &[f64], period: usize) -> Vec<f64> {
    ratio_series(
        &rolling_mean(returns, period),
        &rolling_std(&downside(returns), period),
    )
}

fn ratio_series(means: &[f64], deviations: &[f64]) -> Vec<f64> {
    means
        .iter()
        .zip(deviations)
        .map(|(m, sd)| {
            let ratio = m / sd * ANNUALIZATION_DAYS.sqrt();
            if ratio.is_nan() { 0.0 } else { ratio }
        })
        .collect()
}
