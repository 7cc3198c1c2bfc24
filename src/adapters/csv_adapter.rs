//! Wide CSV price file adapter.
//!
//! Layout: `date,<TICKER>,<TICKER>...`, one row per date, adjusted closes in
//! the cells. Empty cells, `NaN` and `null` read as missing.

use crate::domain::config_validation::DATE_FORMAT;
use crate::domain::error::AllocsimError;
use crate::domain::price_table::{PriceTable, is_valid_price};
use crate::ports::data_port::PriceDataPort;
use chrono::NaiveDate;
use std::path::PathBuf;

pub struct CsvPriceAdapter {
    path: PathBuf,
}

/// Parsed file contents, rows sorted by date.
struct PriceFile {
    dates: Vec<NaiveDate>,
    tickers: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl CsvPriceAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn load(&self) -> Result<PriceFile, AllocsimError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| AllocsimError::PriceData {
                reason: format!("failed to read {}: {}", self.path.display(), e),
            })?;

        let headers = rdr.headers().map_err(|e| AllocsimError::PriceData {
            reason: format!("CSV header error: {}", e),
        })?;
        match headers.get(0) {
            Some(first) if first.eq_ignore_ascii_case("date") => {}
            _ => {
                return Err(AllocsimError::PriceData {
                    reason: "first column must be 'date'".into(),
                });
            }
        }
        let tickers: Vec<String> = headers.iter().skip(1).map(String::from).collect();

        let mut rows: Vec<(NaiveDate, Vec<f64>)> = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| AllocsimError::PriceData {
                reason: format!("CSV parse error: {}", e),
            })?;
            let date_str = record.get(0).ok_or_else(|| AllocsimError::PriceData {
                reason: "missing date column".into(),
            })?;
            let date = NaiveDate::parse_from_str(date_str, DATE_FORMAT).map_err(|e| {
                AllocsimError::PriceData {
                    reason: format!("invalid date '{}': {}", date_str, e),
                }
            })?;
            let prices = tickers
                .iter()
                .enumerate()
                .map(|(j, ticker)| parse_cell(record.get(j + 1).unwrap_or(""), ticker, date))
                .collect::<Result<Vec<_>, _>>()?;
            rows.push((date, prices));
        }

        rows.sort_by_key(|(date, _)| *date);
        if let Some(pair) = rows.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(AllocsimError::PriceData {
                reason: format!("duplicate date {}", pair[0].0),
            });
        }

        let mut columns = vec![Vec::with_capacity(rows.len()); tickers.len()];
        let mut dates = Vec::with_capacity(rows.len());
        for (date, prices) in rows {
            dates.push(date);
            for (column, price) in columns.iter_mut().zip(prices) {
                column.push(price);
            }
        }
        Ok(PriceFile {
            dates,
            tickers,
            columns,
        })
    }
}

fn parse_cell(raw: &str, ticker: &str, date: NaiveDate) -> Result<f64, AllocsimError> {
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") || raw.eq_ignore_ascii_case("null") {
        return Ok(f64::NAN);
    }
    raw.parse().map_err(|e| AllocsimError::PriceData {
        reason: format!("invalid price '{}' for {} on {}: {}", raw, ticker, date, e),
    })
}

impl PriceDataPort for CsvPriceAdapter {
    fn fetch_prices(
        &self,
        tickers: &[String],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<PriceTable, AllocsimError> {
        let file = self.load()?;
        let keep: Vec<usize> = (0..file.dates.len())
            .filter(|&i| file.dates[i] >= start_date && file.dates[i] <= end_date)
            .collect();

        let mut columns = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            let j = file
                .tickers
                .iter()
                .position(|t| t == ticker)
                .ok_or_else(|| AllocsimError::NoData {
                    ticker: ticker.clone(),
                })?;
            columns.push(keep.iter().map(|&i| file.columns[j][i]).collect());
        }
        let dates = keep.iter().map(|&i| file.dates[i]).collect();
        PriceTable::new(dates, tickers.to_vec(), columns)
    }

    fn list_tickers(&self) -> Result<Vec<String>, AllocsimError> {
        let mut tickers = self.load()?.tickers;
        tickers.sort();
        Ok(tickers)
    }

    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, AllocsimError> {
        let file = self.load()?;
        let Some(j) = file.tickers.iter().position(|t| t == ticker) else {
            return Ok(None);
        };
        let valid: Vec<NaiveDate> = file
            .dates
            .iter()
            .zip(&file.columns[j])
            .filter(|(_, p)| is_valid_price(**p))
            .map(|(d, _)| *d)
            .collect();
        Ok(match (valid.first(), valid.last()) {
            (Some(&first), Some(&last)) => Some((first, last, valid.len())),
            _ => None,
        })
    }
}
