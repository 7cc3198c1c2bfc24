//! Percentile channel breakout.
//!
//! Each instrument's band score is averaged over several channel lengths and
//! divided by its recent volatility. Positive scores share the allocation in
//! proportion to their size relative to the sum of absolute scores; whatever
//! the negative scores would have claimed stays in cash.

use super::{AllocationRule, column_indices, tradable_row};
use crate::domain::calendar::CalendarConfig;
use crate::domain::config_validation::{
    parse_calendar, parse_float, parse_instruments, parse_positive, parse_usize_list,
    strategy_name,
};
use crate::domain::error::AllocsimError;
use crate::domain::price_table::PriceTable;
use crate::domain::signal::bands::band_scores;
use crate::domain::signal::daily_returns;
use crate::domain::signal::volatility::rolling_std;
use crate::domain::weights::WeightTable;
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone)]
pub struct Breakout {
    pub name: String,
    pub tickers: Vec<String>,
    pub calendar: CalendarConfig,
    /// Channel lengths, in calendar units.
    pub band_lookbacks: Vec<usize>,
    /// Volatility window, in calendar units.
    pub volatility_lookback: usize,
    pub lower_quantile: f64,
    pub upper_quantile: f64,
}

impl Breakout {
    pub fn from_config(config: &dyn ConfigPort, section: &str) -> Result<Self, AllocsimError> {
        let band_lookbacks = parse_usize_list(config, section, "band_lookbacks", &[3, 6, 12])?;
        if band_lookbacks.is_empty() {
            return Err(AllocsimError::invalid(section, "band_lookbacks", "no channel lengths"));
        }
        let lower_quantile = parse_float(config, section, "lower_quantile", 0.25)?;
        let upper_quantile = parse_float(config, section, "upper_quantile", 0.75)?;
        for (key, q) in [("lower_quantile", lower_quantile), ("upper_quantile", upper_quantile)] {
            if !(0.0..=1.0).contains(&q) {
                return Err(AllocsimError::invalid(section, key, "quantile must lie in [0, 1]"));
            }
        }
        if lower_quantile >= upper_quantile {
            return Err(AllocsimError::invalid(
                section,
                "lower_quantile",
                "lower_quantile must be below upper_quantile",
            ));
        }
        Ok(Self {
            name: strategy_name(config, section),
            tickers: parse_instruments(config, section, "tickers")?,
            calendar: parse_calendar(config, section)?,
            band_lookbacks,
            volatility_lookback: parse_positive(config, section, "volatility_lookback", 1)?,
            lower_quantile,
            upper_quantile,
        })
    }

    /// Averaged band score over volatility, per column.
    fn scores(&self, closes: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let days = self.calendar.unit.trading_days();
        let vol_window = self.volatility_lookback * days;
        closes
            .iter()
            .map(|p| {
                let per_band: Vec<Vec<f64>> = self
                    .band_lookbacks
                    .iter()
                    .map(|&lb| band_scores(p, lb * days, self.lower_quantile, self.upper_quantile))
                    .collect();
                let volatility = rolling_std(&daily_returns(p), vol_window);
                (0..p.len())
                    .map(|i| {
                        let mean = per_band.iter().map(|s| s[i]).sum::<f64>()
                            / per_band.len() as f64;
                        mean / volatility[i]
                    })
                    .collect()
            })
            .collect()
    }
}

fn proportional_weights(scores: &[f64]) -> Vec<f64> {
    let total: f64 = scores.iter().filter(|s| s.is_finite()).map(|s| s.abs()).sum();
    if total <= 0.0 {
        return vec![0.0; scores.len()];
    }
    scores
        .iter()
        .map(|&s| if s.is_finite() && s > 0.0 { s / total } else { 0.0 })
        .collect()
}

impl AllocationRule for Breakout {
    fn name(&self) -> &str {
        &self.name
    }

    fn calendar(&self) -> CalendarConfig {
        self.calendar
    }

    fn required_instruments(&self) -> Vec<String> {
        self.tickers.clone()
    }

    fn traded_instruments(&self) -> Vec<String> {
        self.tickers.clone()
    }

    fn target_weights(&self, prices: &PriceTable) -> WeightTable {
        let indices = column_indices(prices, &self.tickers);
        let closes: Vec<Vec<f64>> = indices.iter().map(|&j| prices.column(j).to_vec()).collect();
        let scores = self.scores(&closes);
        let rows = (0..prices.len())
            .map(|i| proportional_weights(&tradable_row(prices, &scores, &indices, i)))
            .collect();
        WeightTable::from_rows(prices.dates().to_vec(), self.tickers.clone(), rows)
    }
}
