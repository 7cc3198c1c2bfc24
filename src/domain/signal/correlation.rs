//! Rolling correlation signals over daily return series.
//!
//! CORR(a, b, n)[i] is the Pearson correlation of a and b over rows i-n+1..=i.
//! Warmup: first (n-1) rows are NaN, as is any window holding a NaN in either
//! series or with zero variance.

use super::row_mean;

/// Pearson correlation of two equal-length slices.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len();
    if n < 2 || n != b.len() || a.iter().chain(b).any(|v| v.is_nan()) {
        return f64::NAN;
    }
    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a <= 0.0 || var_b <= 0.0 {
        return f64::NAN;
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}

fn window_bounds(i: usize, period: usize) -> Option<std::ops::RangeInclusive<usize>> {
    if period == 0 || i + 1 < period {
        None
    } else {
        Some(i + 1 - period..=i)
    }
}

pub fn rolling_correlation(a: &[f64], b: &[f64], period: usize) -> Vec<f64> {
    (0..a.len())
        .map(|i| match window_bounds(i, period) {
            Some(range) => pearson(&a[range.clone()], &b[range]),
            None => f64::NAN,
        })
        .collect()
}

/// For each column, the mean of its rolling correlation with every column,
/// itself included. Pairs without a defined correlation are skipped.
pub fn mean_pairwise_correlation(returns: &[Vec<f64>], period: usize) -> Vec<Vec<f64>> {
    let width = returns.len();
    let n = returns.first().map_or(0, Vec::len);
    let mut means = vec![vec![f64::NAN; n]; width];
    for i in 0..n {
        let Some(range) = window_bounds(i, period) else {
            continue;
        };
        let mut pair = vec![vec![f64::NAN; width]; width];
        for a in 0..width {
            for b in a..width {
                let corr = pearson(&returns[a][range.clone()], &returns[b][range.clone()]);
                pair[a][b] = corr;
                pair[b][a] = corr;
            }
        }
        for a in 0..width {
            // a column with no defined self-correlation has no usable window
            if pair[a][a].is_nan() {
                continue;
            }
            let defined: Vec<f64> = pair[a].iter().copied().filter(|c| !c.is_nan()).collect();
            means[a][i] = defined.iter().sum::<f64>() / defined.len() as f64;
        }
    }
    means
}

/// Rolling correlation of each column with the equal-weighted average of all
/// columns.
pub fn correlation_to_peer_average(returns: &[Vec<f64>], period: usize) -> Vec<Vec<f64>> {
    let average = row_mean(returns);
    returns
        .iter()
        .map(|column| rolling_correlation(column, &average, period))
        .collect()
}

/// Mean correlation of each candidate with the other candidates over the
/// window ending at `row`. Non-candidates get NaN; a lone candidate gets 0.
pub fn peer_correlation_at(
    returns: &[Vec<f64>],
    row: usize,
    period: usize,
    candidates: &[bool],
) -> Vec<f64> {
    let mut result = vec![f64::NAN; returns.len()];
    let Some(range) = window_bounds(row, period) else {
        return result;
    };
    let members: Vec<usize> = (0..returns.len()).filter(|&j| candidates[j]).collect();
    for &a in &members {
        let peers: Vec<f64> = members
            .iter()
            .filter(|&&b| b != a)
            .map(|&b| pearson(&returns[a][range.clone()], &returns[b][range.clone()]))
            .filter(|c| !c.is_nan())
            .collect();
        result[a] = if peers.is_empty() {
            0.0
        } else {
            peers.iter().sum::<f64>() / peers.len() as f64
        };
    }
    result
}
