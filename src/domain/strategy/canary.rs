//! Canary-gated rotation between an offensive and a defensive universe.
//!
//! A small canary basket decides the regime: offensive when every canary has
//! positive blended 1/3/6/12-month momentum, defensive otherwise. Relative
//! momentum then picks holdings inside the active universe.

use super::{AllocationRule, column_indices, tradable_row, union};
use crate::domain::calendar::{CalendarConfig, RebalanceUnit};
use crate::domain::config_validation::{
    parse_calendar, parse_count, parse_float, parse_instruments, parse_selected, strategy_name,
};
use crate::domain::error::AllocsimError;
use crate::domain::price_table::PriceTable;
use crate::domain::ranking::{SlotPolicy, rank_descending, select_top_k};
use crate::domain::signal::momentum::{blended_return, price_over_average};
use crate::domain::weights::{WEIGHT_TOLERANCE, WeightTable};
use crate::ports::config_port::ConfigPort;
use std::str::FromStr;

const CANARY_MONTHS: [usize; 4] = [1, 3, 6, 12];

/// Monthly lags averaged by the bold ranking signal: 0..=12.
const AVERAGE_MONTHS: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanaryVariant {
    /// Equal-weighted canary; offensive leftovers fall back to the
    /// defensive universe.
    Hybrid,
    /// Short-horizon-weighted canary; leftovers stay in cash.
    Bold,
}

impl CanaryVariant {
    fn canary_weights(self) -> [f64; 4] {
        match self {
            CanaryVariant::Hybrid => [1.0, 1.0, 1.0, 1.0],
            CanaryVariant::Bold => [12.0, 4.0, 2.0, 1.0],
        }
    }
}

impl FromStr for CanaryVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "haa" | "hybrid" => Ok(CanaryVariant::Hybrid),
            "bold" | "baa" => Ok(CanaryVariant::Bold),
            other => Err(format!("unknown canary variant '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CanaryRotation {
    pub name: String,
    pub calendar: CalendarConfig,
    pub variant: CanaryVariant,
    pub canary: Vec<String>,
    pub offensive: Vec<String>,
    pub defensive: Vec<String>,
    pub offensive_selected: usize,
    pub defensive_selected: usize,
    /// Skipped months for the ranking signal.
    pub skip: usize,
    pub abs_threshold: f64,
}

impl CanaryRotation {
    pub fn from_config(config: &dyn ConfigPort, section: &str) -> Result<Self, AllocsimError> {
        let variant = match config.get_string(section, "variant") {
            None => CanaryVariant::Hybrid,
            Some(raw) => raw
                .parse()
                .map_err(|reason| AllocsimError::invalid(section, "variant", reason))?,
        };
        let offensive = parse_instruments(config, section, "offensive")?;
        let defensive = parse_instruments(config, section, "defensive")?;
        Ok(Self {
            name: strategy_name(config, section),
            calendar: parse_calendar(config, section)?,
            variant,
            canary: parse_instruments(config, section, "canary")?,
            offensive_selected: parse_selected(
                config,
                section,
                "offensive_selected",
                1,
                offensive.len(),
            )?,
            defensive_selected: parse_selected(
                config,
                section,
                "defensive_selected",
                1,
                defensive.len(),
            )?,
            offensive,
            defensive,
            skip: parse_count(config, section, "skipped_period", 0)?,
            abs_threshold: parse_float(config, section, "abs_threshold", 0.0)?,
        })
    }

    fn ranking_momentum(&self, prices: &[f64]) -> Vec<f64> {
        let month = RebalanceUnit::Month.trading_days();
        match self.variant {
            CanaryVariant::Hybrid => {
                let lookbacks: Vec<usize> = CANARY_MONTHS.iter().map(|m| m * month).collect();
                blended_return(prices, &lookbacks, &[1.0; 4], self.skip * month)
            }
            CanaryVariant::Bold => {
                let lags: Vec<usize> = (0..=AVERAGE_MONTHS)
                    .map(|k| (k + self.skip) * month)
                    .collect();
                price_over_average(prices, &lags, self.skip * month)
            }
        }
    }

    /// Weights over `members` (positions into the traded list).
    fn pick(
        &self,
        momentum: &[f64],
        members: &[usize],
        k: usize,
        threshold: Option<f64>,
        policy: SlotPolicy,
    ) -> Vec<f64> {
        let values: Vec<f64> = members.iter().map(|&p| momentum[p]).collect();
        let qualifies: Vec<bool> = values
            .iter()
            .map(|&v| threshold.map_or(!v.is_nan(), |t| v > t))
            .collect();
        select_top_k(&rank_descending(&values), &qualifies, k, policy)
    }
}

impl AllocationRule for CanaryRotation {
    fn name(&self) -> &str {
        &self.name
    }

    fn calendar(&self) -> CalendarConfig {
        self.calendar
    }

    fn required_instruments(&self) -> Vec<String> {
        union(&[&self.canary, &self.offensive, &self.defensive])
    }

    fn traded_instruments(&self) -> Vec<String> {
        union(&[&self.offensive, &self.defensive])
    }

    fn target_weights(&self, prices: &PriceTable) -> WeightTable {
        let month = RebalanceUnit::Month.trading_days();
        let canary_lookbacks: Vec<usize> = CANARY_MONTHS.iter().map(|m| m * month).collect();
        let canary_weights = self.variant.canary_weights();
        let canary_momentum: Vec<Vec<f64>> = column_indices(prices, &self.canary)
            .into_iter()
            .map(|j| blended_return(prices.column(j), &canary_lookbacks, &canary_weights, 0))
            .collect();

        let traded = self.traded_instruments();
        let traded_columns = column_indices(prices, &traded);
        let momentum: Vec<Vec<f64>> = traded_columns
            .iter()
            .map(|&j| self.ranking_momentum(prices.column(j)))
            .collect();
        let position = |name: &String| traded.iter().position(|t| t == name);
        let offensive: Vec<usize> = self.offensive.iter().filter_map(position).collect();
        let defensive: Vec<usize> = self.defensive.iter().filter_map(position).collect();

        let rows = (0..prices.len())
            .map(|i| {
                let row_momentum = tradable_row(prices, &momentum, &traded_columns, i);
                let offensive_regime =
                    !canary_momentum.is_empty() && canary_momentum.iter().all(|m| m[i] > 0.0);
                let mut weights = vec![0.0; traded.len()];
                let mut add = |members: &[usize], picked: &[f64], scale: f64| {
                    for (&p, &w) in members.iter().zip(picked) {
                        weights[p] += w * scale;
                    }
                };

                if offensive_regime {
                    let picked = self.pick(
                        &row_momentum,
                        &offensive,
                        self.offensive_selected,
                        Some(self.abs_threshold),
                        SlotPolicy::QualifiersOnly,
                    );
                    add(&offensive, &picked, 1.0);
                    let residual = 1.0 - picked.iter().sum::<f64>();
                    if self.variant == CanaryVariant::Hybrid && residual > WEIGHT_TOLERANCE {
                        let fill = self.pick(
                            &row_momentum,
                            &defensive,
                            self.defensive_selected,
                            None,
                            SlotPolicy::FixedSlots,
                        );
                        add(&defensive, &fill, residual);
                    }
                } else {
                    let (threshold, policy) = match self.variant {
                        CanaryVariant::Hybrid => (None, SlotPolicy::FixedSlots),
                        CanaryVariant::Bold => {
                            (Some(self.abs_threshold), SlotPolicy::QualifiersOnly)
                        }
                    };
                    let picked = self.pick(
                        &row_momentum,
                        &defensive,
                        self.defensive_selected,
                        threshold,
                        policy,
                    );
                    add(&defensive, &picked, 1.0);
                }
                weights
            })
            .collect();
        WeightTable::from_rows(prices.dates().to_vec(), traded, rows)
    }
}
