//! Daily adjusted-close price table.
//!
//! Columns are instruments, rows are dates in strictly increasing order. An
//! instrument is a ticker at the asset level and a sub-strategy name at the
//! meta level; nothing in this module cares which.
//!
//! Missing quotes are stored as NaN. A missing or non-positive price marks the
//! instrument untradeable on that date.

use crate::domain::error::AllocsimError;
use chrono::NaiveDate;
use std::collections::HashSet;

/// True for a finite, strictly positive price.
pub fn is_valid_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    dates: Vec<NaiveDate>,
    instruments: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl PriceTable {
    /// Build a table from one column per instrument.
    pub fn new(
        dates: Vec<NaiveDate>,
        instruments: Vec<String>,
        columns: Vec<Vec<f64>>,
    ) -> Result<Self, AllocsimError> {
        if instruments.len() != columns.len() {
            return Err(AllocsimError::PriceData {
                reason: format!(
                    "{} instruments but {} price columns",
                    instruments.len(),
                    columns.len()
                ),
            });
        }
        for (name, column) in instruments.iter().zip(&columns) {
            if column.len() != dates.len() {
                return Err(AllocsimError::PriceData {
                    reason: format!(
                        "column {name} has {} rows, date index has {}",
                        column.len(),
                        dates.len()
                    ),
                });
            }
        }
        if let Some(pair) = dates.windows(2).find(|w| w[0] >= w[1]) {
            return Err(AllocsimError::PriceData {
                reason: format!("dates not strictly increasing at {}", pair[1]),
            });
        }
        let mut seen = HashSet::new();
        for name in &instruments {
            if !seen.insert(name.as_str()) {
                return Err(AllocsimError::PriceData {
                    reason: format!("duplicate instrument {name}"),
                });
            }
        }
        Ok(Self {
            dates,
            instruments,
            columns,
        })
    }

    /// Build a table from one row of prices per date.
    pub fn from_rows(
        dates: Vec<NaiveDate>,
        instruments: Vec<String>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self, AllocsimError> {
        if rows.len() != dates.len() {
            return Err(AllocsimError::PriceData {
                reason: format!("{} rows for {} dates", rows.len(), dates.len()),
            });
        }
        let width = instruments.len();
        let mut columns = vec![Vec::with_capacity(rows.len()); width];
        for (row, date) in rows.iter().zip(&dates) {
            if row.len() != width {
                return Err(AllocsimError::PriceData {
                    reason: format!("row {date} has {} prices, expected {width}", row.len()),
                });
            }
            for (column, &price) in columns.iter_mut().zip(row) {
                column.push(price);
            }
        }
        Self::new(dates, instruments, columns)
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn instruments(&self) -> &[String] {
        &self.instruments
    }

    /// Number of dates.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Number of instruments.
    pub fn width(&self) -> usize {
        self.instruments.len()
    }

    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> &[f64] {
        &self.columns[index]
    }

    pub fn index_of(&self, instrument: &str) -> Option<usize> {
        self.instruments.iter().position(|name| name == instrument)
    }

    pub fn column_by_name(&self, instrument: &str) -> Option<&[f64]> {
        self.index_of(instrument).map(|j| self.columns[j].as_slice())
    }

    pub fn price(&self, row: usize, col: usize) -> f64 {
        self.columns[col][row]
    }

    pub fn is_tradable(&self, row: usize, col: usize) -> bool {
        is_valid_price(self.columns[col][row])
    }

    /// Instruments with a valid price on `row`.
    pub fn tradable_count(&self, row: usize) -> usize {
        self.columns
            .iter()
            .filter(|column| is_valid_price(column[row]))
            .count()
    }

    /// Sub-table with the named instruments, in the order given.
    pub fn select(&self, instruments: &[String]) -> Result<PriceTable, AllocsimError> {
        let mut columns = Vec::with_capacity(instruments.len());
        for name in instruments {
            let column = self
                .column_by_name(name)
                .ok_or_else(|| AllocsimError::NoData {
                    ticker: name.clone(),
                })?;
            columns.push(column.to_vec());
        }
        PriceTable::new(self.dates.clone(), instruments.to_vec(), columns)
    }

    /// Drop dates on which no instrument has a valid price.
    pub fn drop_empty_rows(self) -> PriceTable {
        let keep: Vec<bool> = (0..self.len())
            .map(|i| self.tradable_count(i) > 0)
            .collect();
        self.retain_rows(&keep)
    }

    /// Drop dates after `end`.
    pub fn truncate_after(self, end: NaiveDate) -> PriceTable {
        let keep: Vec<bool> = self.dates.iter().map(|&d| d <= end).collect();
        self.retain_rows(&keep)
    }

    /// First row dated on or after `date`.
    pub fn start_index(&self, date: NaiveDate) -> Option<usize> {
        self.dates.iter().position(|&d| d >= date)
    }

    /// Instruments missing a valid price somewhere in the trailing `window` rows.
    pub fn stale_instruments(&self, window: usize) -> Vec<String> {
        let from = self.len().saturating_sub(window);
        self.instruments
            .iter()
            .zip(&self.columns)
            .filter(|(_, column)| column[from..].iter().any(|&p| !is_valid_price(p)))
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn retain_rows(self, keep: &[bool]) -> PriceTable {
        let dates = self
            .dates
            .iter()
            .zip(keep)
            .filter(|(_, k)| **k)
            .map(|(d, _)| *d)
            .collect();
        let columns = self
            .columns
            .iter()
            .map(|column| {
                column
                    .iter()
                    .zip(keep)
                    .filter(|(_, k)| **k)
                    .map(|(p, _)| *p)
                    .collect()
            })
            .collect();
        PriceTable {
            dates,
            instruments: self.instruments,
            columns,
        }
    }
}
