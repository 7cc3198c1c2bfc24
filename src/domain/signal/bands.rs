//! Percentile band breakout scores.
//!
//! QUANTILE(P, n, q)[i] = q-quantile of P[i-n+1..=i], linear interpolation
//! SCORE[i] = +1 if P[i] > QUANTILE(upper), -1 if P[i] < QUANTILE(lower),
//!            SCORE[i-1] otherwise (0 before the first breakout)

use crate::domain::price_table::is_valid_price;

/// Quantile of a non-empty slice, interpolating linearly between order
/// statistics.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

pub fn rolling_quantile(values: &[f64], period: usize, q: f64) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            if period == 0 || i + 1 < period {
                return f64::NAN;
            }
            let window = &values[i + 1 - period..=i];
            if window.iter().any(|v| v.is_nan()) {
                f64::NAN
            } else {
                quantile(window, q)
            }
        })
        .collect()
}

/// Breakout score series. Rows without defined bands, or without a valid
/// price, carry the previous score forward.
pub fn band_scores(prices: &[f64], period: usize, lower_q: f64, upper_q: f64) -> Vec<f64> {
    let lower = rolling_quantile(prices, period, lower_q);
    let upper = rolling_quantile(prices, period, upper_q);
    let mut scores = vec![0.0; prices.len()];
    for i in 1..prices.len() {
        let price = prices[i];
        scores[i] = if is_valid_price(price) && price > upper[i] {
            1.0
        } else if is_valid_price(price) && price < lower[i] {
            -1.0
        } else {
            scores[i - 1]
        };
    }
    scores
}
