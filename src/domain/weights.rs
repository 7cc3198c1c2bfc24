//! Target weight tables and single-date weight vectors.
//!
//! A weight table covers a closed list of instruments. Lookups by name for
//! anything outside that list read as zero, so tables over different
//! instrument sets can be combined without key mismatches.

use chrono::NaiveDate;
use std::collections::BTreeMap;

pub const CASH: &str = "cash";

/// Tolerance for "weights sum to one".
pub const WEIGHT_TOLERANCE: f64 = 1e-9;

/// Weights for a single date: instrument weights plus an explicit cash entry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WeightVector {
    weights: BTreeMap<String, f64>,
    cash: f64,
}

impl WeightVector {
    pub fn new(weights: BTreeMap<String, f64>, cash: f64) -> Self {
        Self { weights, cash }
    }

    /// Cash takes whatever the instruments leave over.
    pub fn from_weights(weights: BTreeMap<String, f64>) -> Self {
        let cash = 1.0 - weights.values().sum::<f64>();
        Self { weights, cash }
    }

    /// Weight of `instrument`, zero when it is not part of the vector.
    pub fn weight(&self, instrument: &str) -> f64 {
        self.weights.get(instrument).copied().unwrap_or(0.0)
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(name, &w)| (name.as_str(), w))
    }

    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }

    /// Sum of instrument weights, cash excluded.
    pub fn invested(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn total(&self) -> f64 {
        self.invested() + self.cash
    }

    pub fn is_normalized(&self) -> bool {
        (self.total() - 1.0).abs() <= WEIGHT_TOLERANCE
    }

    /// Every weight, cash included, multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> WeightVector {
        WeightVector {
            weights: self
                .weights
                .iter()
                .map(|(name, w)| (name.clone(), w * factor))
                .collect(),
            cash: self.cash * factor,
        }
    }
}

/// Per-date target weights over a fixed instrument list.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTable {
    dates: Vec<NaiveDate>,
    instruments: Vec<String>,
    rows: Vec<Vec<f64>>,
    cash: Vec<f64>,
}

impl WeightTable {
    /// Build from instrument weights per row. NaN weights become zero and cash
    /// is the residual of each row.
    pub fn from_rows(dates: Vec<NaiveDate>, instruments: Vec<String>, rows: Vec<Vec<f64>>) -> Self {
        let rows: Vec<Vec<f64>> = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|w| if w.is_nan() { 0.0 } else { w })
                    .collect()
            })
            .collect();
        let cash = rows.iter().map(|row| 1.0 - row.iter().sum::<f64>()).collect();
        Self {
            dates,
            instruments,
            rows,
            cash,
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn instruments(&self) -> &[String] {
        &self.instruments
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.rows[i]
    }

    pub fn cash(&self, i: usize) -> f64 {
        self.cash[i]
    }

    pub fn index_of(&self, instrument: &str) -> Option<usize> {
        self.instruments.iter().position(|name| name == instrument)
    }

    /// Weight of `instrument` on row `i`; zero for instruments outside the table.
    pub fn weight(&self, i: usize, instrument: &str) -> f64 {
        self.index_of(instrument).map_or(0.0, |j| self.rows[i][j])
    }

    pub fn vector(&self, i: usize) -> WeightVector {
        let weights = self
            .instruments
            .iter()
            .cloned()
            .zip(self.rows[i].iter().copied())
            .collect();
        WeightVector::new(weights, self.cash[i])
    }

    pub fn latest(&self) -> Option<WeightVector> {
        self.len().checked_sub(1).map(|i| self.vector(i))
    }

    /// Rows from `start` onward.
    pub fn slice_from(&self, start: usize) -> WeightTable {
        let start = start.min(self.len());
        WeightTable {
            dates: self.dates[start..].to_vec(),
            instruments: self.instruments.clone(),
            rows: self.rows[start..].to_vec(),
            cash: self.cash[start..].to_vec(),
        }
    }

    /// Largest distance of any weight, cash included, outside [0, 1].
    ///
    /// Cash is the row residual, so an over-invested row shows up here as
    /// negative cash.
    pub fn bounds_error(&self) -> f64 {
        self.rows
            .iter()
            .zip(&self.cash)
            .flat_map(|(row, cash)| row.iter().chain(std::iter::once(cash)))
            .map(|&w| (-w).max(w - 1.0).max(0.0))
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn sample_table() -> WeightTable {
        WeightTable::from_rows(
            vec![date(1), date(4)],
            vec!["SPY".into(), "TLT".into()],
            vec![vec![0.5, 0.25], vec![f64::NAN, 1.0]],
        )
    }

    #[test]
    fn cash_is_row_residual() {
        let table = sample_table();
        assert!((table.cash(0) - 0.25).abs() < f64::EPSILON);
        assert!(table.cash(1).abs() < f64::EPSILON);
        assert!(table.bounds_error() < WEIGHT_TOLERANCE);
    }

    #[test]
    fn over_invested_row_is_out_of_bounds() {
        let table = WeightTable::from_rows(
            vec![date(1), date(4)],
            vec!["SPY".into(), "TLT".into()],
            vec![vec![0.5, 0.5], vec![0.8, 0.7]],
        );
        assert!((table.cash(1) + 0.5).abs() < 1e-12);
        assert!((table.bounds_error() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn negative_weight_is_out_of_bounds() {
        let table = WeightTable::from_rows(
            vec![date(1)],
            vec!["SPY".into(), "TLT".into()],
            vec![vec![-0.25, 0.5]],
        );
        assert!((table.bounds_error() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn nan_weights_become_zero() {
        let table = sample_table();
        assert_eq!(table.row(1), &[0.0, 1.0]);
    }

    #[test]
    fn unknown_instrument_reads_zero() {
        let table = sample_table();
        assert_eq!(table.weight(0, "GLD"), 0.0);
        assert_eq!(table.weight(0, "SPY"), 0.5);
        let vector = table.vector(0);
        assert_eq!(vector.weight("GLD"), 0.0);
        assert_eq!(vector.weight("TLT"), 0.25);
    }

    #[test]
    fn vector_totals_include_cash() {
        let vector = sample_table().vector(0);
        assert!((vector.invested() - 0.75).abs() < f64::EPSILON);
        assert!(vector.is_normalized());
        let scaled = vector.scaled(0.5);
        assert!((scaled.total() - 0.5).abs() < f64::EPSILON);
        assert!((scaled.cash() - 0.125).abs() < f64::EPSILON);
    }

    #[test]
    fn from_weights_derives_cash() {
        let mut weights = BTreeMap::new();
        weights.insert("IEF".to_string(), 0.6);
        let vector = WeightVector::from_weights(weights);
        assert!((vector.cash() - 0.4).abs() < 1e-12);
        assert_eq!(vector.instruments().collect::<Vec<_>>(), vec!["IEF"]);
    }

    #[test]
    fn latest_and_slice() {
        let table = sample_table();
        let latest = table.latest().unwrap();
        assert_eq!(latest.weight("TLT"), 1.0);
        let sliced = table.slice_from(1);
        assert_eq!(sliced.len(), 1);
        assert_eq!(sliced.dates(), &[date(4)]);
        assert!(table.slice_from(5).is_empty());
    }
}
