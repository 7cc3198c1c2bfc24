//! Dual momentum: relative momentum ranked together with volatility and
//! correlation, gated by absolute momentum.

use super::{AllocationRule, column_indices, tradable_row};
use crate::domain::calendar::CalendarConfig;
use crate::domain::config_validation::{
    check_weights, parse_calendar, parse_count, parse_float, parse_instruments, parse_positive,
    parse_selected, strategy_name,
};
use crate::domain::error::AllocsimError;
use crate::domain::price_table::PriceTable;
use crate::domain::ranking::{
    SlotPolicy, combine_ranks, rank_ascending, rank_descending, select_top_k,
};
use crate::domain::signal::correlation::{mean_pairwise_correlation, peer_correlation_at};
use crate::domain::signal::momentum::period_return;
use crate::domain::signal::volatility::rolling_std;
use crate::domain::signal::{daily_returns, lag, map_columns};
use crate::domain::weights::WeightTable;
use crate::ports::config_port::ConfigPort;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubRankWeights {
    pub momentum: f64,
    pub volatility: f64,
    pub correlation: f64,
}

impl Default for SubRankWeights {
    fn default() -> Self {
        Self {
            momentum: 1.0,
            volatility: 0.0,
            correlation: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationMode {
    /// Mean correlation against the whole universe, ranked alongside the
    /// other signals.
    FullUniverse,
    /// Mean correlation within a momentum/volatility shortlist of 2K
    /// candidates; it alone orders the shortlist.
    PeerRestricted,
}

impl FromStr for CorrelationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" | "universe" => Ok(CorrelationMode::FullUniverse),
            "peer" | "peers" => Ok(CorrelationMode::PeerRestricted),
            other => Err(format!("unknown correlation mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DualMomentum {
    pub name: String,
    pub tickers: Vec<String>,
    pub calendar: CalendarConfig,
    /// Signal window, in calendar units.
    pub lookback: usize,
    /// Most recent units left out of every signal.
    pub skip: usize,
    pub selected: usize,
    pub abs_threshold: f64,
    pub sub_rank_weights: SubRankWeights,
    pub correlation_mode: CorrelationMode,
}

impl DualMomentum {
    pub fn from_config(config: &dyn ConfigPort, section: &str) -> Result<Self, AllocsimError> {
        let tickers = parse_instruments(config, section, "tickers")?;
        let sub_rank_weights = SubRankWeights {
            momentum: parse_float(config, section, "momentum_weight", 1.0)?,
            volatility: parse_float(config, section, "volatility_weight", 0.0)?,
            correlation: parse_float(config, section, "correlation_weight", 0.0)?,
        };
        check_weights(
            section,
            "momentum_weight",
            &[
                sub_rank_weights.momentum,
                sub_rank_weights.volatility,
                sub_rank_weights.correlation,
            ],
            3,
        )?;
        let correlation_mode = match config.get_string(section, "correlation_mode") {
            None => CorrelationMode::FullUniverse,
            Some(raw) => raw
                .parse()
                .map_err(|reason| AllocsimError::invalid(section, "correlation_mode", reason))?,
        };
        Ok(Self {
            name: strategy_name(config, section),
            calendar: parse_calendar(config, section)?,
            lookback: parse_positive(config, section, "lookback_period", 6)?,
            skip: parse_count(config, section, "skipped_period", 0)?,
            selected: parse_selected(config, section, "selected", 1, tickers.len())?,
            abs_threshold: parse_float(config, section, "abs_threshold", 0.0)?,
            sub_rank_weights,
            correlation_mode,
            tickers,
        })
    }

    fn row_weights(&self, prices: &PriceTable, i: usize, signals: &Signals) -> Vec<f64> {
        let indices = &signals.indices;
        let momentum = tradable_row(prices, &signals.momentum, indices, i);
        let volatility = tradable_row(prices, &signals.volatility, indices, i);
        let momentum_rank = rank_descending(&momentum);
        let volatility_rank = rank_ascending(&volatility);
        let w = self.sub_rank_weights;

        let ranks = match self.correlation_mode {
            CorrelationMode::FullUniverse => {
                let correlation_rank = match &signals.correlation {
                    Some(corr) => rank_ascending(&tradable_row(prices, corr, indices, i)),
                    None => vec![f64::NAN; indices.len()],
                };
                combine_ranks(&[
                    (&momentum_rank, w.momentum),
                    (&volatility_rank, w.volatility),
                    (&correlation_rank, w.correlation),
                ])
            }
            CorrelationMode::PeerRestricted => {
                let shortlist =
                    combine_ranks(&[(&momentum_rank, w.momentum), (&volatility_rank, w.volatility)]);
                let available = shortlist.iter().filter(|r| !r.is_nan()).count();
                let cutoff = (available.min(2 * self.selected) + 1) as f64;
                let candidates: Vec<bool> = shortlist
                    .iter()
                    .map(|&r| !r.is_nan() && r < cutoff)
                    .collect();
                let correlation =
                    peer_correlation_at(&signals.lagged_returns, i, signals.window, &candidates);
                rank_ascending(&correlation)
            }
        };

        let qualifies: Vec<bool> = momentum.iter().map(|&m| m > self.abs_threshold).collect();
        select_top_k(&ranks, &qualifies, self.selected, SlotPolicy::FixedSlots)
    }
}

struct Signals {
    indices: Vec<usize>,
    window: usize,
    momentum: Vec<Vec<f64>>,
    volatility: Vec<Vec<f64>>,
    correlation: Option<Vec<Vec<f64>>>,
    lagged_returns: Vec<Vec<f64>>,
}

impl AllocationRule for DualMomentum {
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
        let days = self.calendar.unit.trading_days();
        let window = self.lookback * days;
        let skip = self.skip * days;
        let indices = column_indices(prices, &self.tickers);
        let closes: Vec<Vec<f64>> = indices.iter().map(|&j| prices.column(j).to_vec()).collect();

        let returns = map_columns(&closes, daily_returns);
        let lagged_returns = map_columns(&returns, |r| lag(r, skip));
        let momentum = map_columns(&closes, |p| period_return(p, window, skip));
        let volatility = map_columns(&lagged_returns, |r| rolling_std(r, window));
        let correlation = (self.correlation_mode == CorrelationMode::FullUniverse
            && self.sub_rank_weights.correlation != 0.0)
            .then(|| mean_pairwise_correlation(&lagged_returns, window));

        let signals = Signals {
            indices,
            window,
            momentum,
            volatility,
            correlation,
            lagged_returns,
        };
        let rows = (0..prices.len())
            .map(|i| self.row_weights(prices, i, &signals))
            .collect();
        WeightTable::from_rows(prices.dates().to_vec(), self.tickers.clone(), rows)
    }
}
