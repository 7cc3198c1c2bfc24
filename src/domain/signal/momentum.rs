//! Momentum signals.
//!
//! PERIOD_RETURN(P, n, s)[i] = P[i-s] / P[i-s-n] - 1
//! BLENDED(P, {n_k}, {w_k}, s)[i] = sum(w_k * PERIOD_RETURN(P, n_k, s)[i]) / sum(w_k)
//! OVER_AVERAGE(P, {l_k}, s)[i] = P[i-s] / mean(P[i-l_k]) - 1
//! Warmup: rows that reach before the first price are NaN.

use crate::domain::price_table::is_valid_price;

fn price_at(prices: &[f64], i: usize, back: usize) -> f64 {
    if i < back {
        return f64::NAN;
    }
    let p = prices[i - back];
    if is_valid_price(p) { p } else { f64::NAN }
}

pub fn period_return(prices: &[f64], lookback: usize, skip: usize) -> Vec<f64> {
    (0..prices.len())
        .map(|i| price_at(prices, i, skip) / price_at(prices, i, skip + lookback) - 1.0)
        .collect()
}

/// Weighted blend of several period returns. Lookbacks and weights pair up
/// by position.
pub fn blended_return(prices: &[f64], lookbacks: &[usize], weights: &[f64], skip: usize) -> Vec<f64> {
    let total_weight: f64 = weights.iter().sum();
    let components: Vec<Vec<f64>> = lookbacks
        .iter()
        .map(|&lookback| period_return(prices, lookback, skip))
        .collect();
    (0..prices.len())
        .map(|i| {
            let blended: f64 = components
                .iter()
                .zip(weights)
                .map(|(series, w)| series[i] * w)
                .sum();
            blended / total_weight
        })
        .collect()
}

/// Skipped price relative to the mean of several lagged prices.
pub fn price_over_average(prices: &[f64], lags: &[usize], skip: usize) -> Vec<f64> {
    (0..prices.len())
        .map(|i| {
            if lags.is_empty() {
                return f64::NAN;
            }
            let sum: f64 = lags.iter().map(|&lag| price_at(prices, i, lag)).sum();
            price_at(prices, i, skip) / (sum / lags.len() as f64) - 1.0
        })
        .collect()
}
