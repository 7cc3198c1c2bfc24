#![allow(dead_code)]

use allocsim::domain::calendar::{CalendarConfig, RebalanceUnit};
use allocsim::domain::error::AllocsimError;
use allocsim::domain::price_table::{PriceTable, is_valid_price};
use allocsim::ports::data_port::PriceDataPort;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::HashMap;

pub struct MockPriceDataPort {
    pub dates: Vec<NaiveDate>,
    pub data: HashMap<String, Vec<f64>>,
    pub errors: HashMap<String, String>,
}

impl MockPriceDataPort {
    pub fn new(dates: Vec<NaiveDate>) -> Self {
        Self {
            dates,
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_prices(mut self, ticker: &str, prices: Vec<f64>) -> Self {
        assert_eq!(prices.len(), self.dates.len(), "price path length for {ticker}");
        self.data.insert(ticker.to_string(), prices);
        self
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }
}

impl PriceDataPort for MockPriceDataPort {
    fn fetch_prices(
        &self,
        tickers: &[String],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<PriceTable, AllocsimError> {
        let keep: Vec<usize> = (0..self.dates.len())
            .filter(|&i| self.dates[i] >= start_date && self.dates[i] <= end_date)
            .collect();
        let mut columns = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            if let Some(reason) = self.errors.get(ticker) {
                return Err(AllocsimError::PriceData {
                    reason: reason.clone(),
                });
            }
            let prices = self.data.get(ticker).ok_or_else(|| AllocsimError::NoData {
                ticker: ticker.clone(),
            })?;
            columns.push(keep.iter().map(|&i| prices[i]).collect());
        }
        let dates = keep.iter().map(|&i| self.dates[i]).collect();
        PriceTable::new(dates, tickers.to_vec(), columns)
    }

    fn list_tickers(&self) -> Result<Vec<String>, AllocsimError> {
        let mut tickers: Vec<String> = self.data.keys().cloned().collect();
        tickers.sort();
        Ok(tickers)
    }

    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, AllocsimError> {
        let Some(prices) = self.data.get(ticker) else {
            return Ok(None);
        };
        let valid: Vec<NaiveDate> = self
            .dates
            .iter()
            .zip(prices)
            .filter(|(_, p)| is_valid_price(**p))
            .map(|(d, _)| *d)
            .collect();
        Ok(match (valid.first(), valid.last()) {
            (Some(&first), Some(&last)) => Some((first, last, valid.len())),
            _ => None,
        })
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// `n` weekdays starting on or after `start`.
pub fn business_days(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(n);
    let mut d = start;
    while dates.len() < n {
        if !matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
            dates.push(d);
        }
        d += Duration::days(1);
    }
    dates
}

pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

pub fn flat(n: usize, price: f64) -> Vec<f64> {
    vec![price; n]
}

/// Drifting path with a deterministic wiggle; `seed` varies the wiggle so
/// different assets are not perfectly correlated.
pub fn wiggle(n: usize, drift: f64, seed: usize) -> Vec<f64> {
    let mut price = 100.0;
    (0..n)
        .map(|i| {
            if i > 0 {
                let noise = ((i * (seed + 2)) % 29) as f64 / 29.0 - 0.5;
                price *= 1.0 + drift + noise * 0.012;
            }
            price
        })
        .collect()
}

/// Price table over weekdays from 2020-01-01.
pub fn price_table(tickers: &[&str], columns: Vec<Vec<f64>>) -> PriceTable {
    let n = columns[0].len();
    PriceTable::new(business_days(date(2020, 1, 1), n), names(tickers), columns).unwrap()
}

pub fn daily_calendar() -> CalendarConfig {
    CalendarConfig {
        unit: RebalanceUnit::Day,
        frequency: 1,
        shift: 0,
    }
}

pub fn write_temp_file(content: &str) -> tempfile::NamedTempFile {
    use std::io::Write;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

/// Wide price CSV for `tickers` over `dates`.
pub fn price_csv(dates: &[NaiveDate], tickers: &[&str], columns: &[Vec<f64>]) -> String {
    let mut out = format!("date,{}\n", tickers.join(","));
    for (i, d) in dates.iter().enumerate() {
        let cells: Vec<String> = columns
            .iter()
            .map(|c| if c[i].is_nan() { String::new() } else { format!("{:.6}", c[i]) })
            .collect();
        out.push_str(&format!("{},{}\n", d, cells.join(",")));
    }
    out
}
