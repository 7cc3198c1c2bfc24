//! Price-derived signal series.
//!
//! Every function maps one column (or a set of columns) to series of the same
//! length. Rows without enough history, or whose window touches a missing
//! price, come out as NaN so the ranking layer leaves them unranked.

pub mod bands;
pub mod correlation;
pub mod momentum;
pub mod volatility;

use crate::domain::price_table::is_valid_price;

/// Shift a series forward by `rows`, padding the front with NaN.
/// LAG(x, k)[i] = x[i-k]
pub fn lag(values: &[f64], rows: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| if i >= rows { values[i - rows] } else { f64::NAN })
        .collect()
}

/// Simple daily returns. RET[i] = P[i]/P[i-1] - 1; the first row and any row
/// touching an invalid price are NaN.
pub fn daily_returns(prices: &[f64]) -> Vec<f64> {
    (0..prices.len())
        .map(|i| {
            if i == 0 || !is_valid_price(prices[i]) || !is_valid_price(prices[i - 1]) {
                f64::NAN
            } else {
                prices[i] / prices[i - 1] - 1.0
            }
        })
        .collect()
}

/// Apply `f` to every column.
pub fn map_columns<F>(columns: &[Vec<f64>], f: F) -> Vec<Vec<f64>>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    columns.iter().map(|column| f(column)).collect()
}

/// Row `i` across all columns.
pub fn row(columns: &[Vec<f64>], i: usize) -> Vec<f64> {
    columns.iter().map(|column| column[i]).collect()
}

/// Row mean over the non-NaN entries of each row; NaN when a row has none.
pub fn row_mean(columns: &[Vec<f64>]) -> Vec<f64> {
    let n = columns.first().map_or(0, Vec::len);
    (0..n)
        .map(|i| {
            let (sum, count) = columns
                .iter()
                .map(|column| column[i])
                .filter(|v| !v.is_nan())
                .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
            if count == 0 { f64::NAN } else { sum / count as f64 }
        })
        .collect()
}
