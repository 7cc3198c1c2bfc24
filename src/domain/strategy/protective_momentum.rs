//! Correlation-adjusted momentum with breadth-based crash protection.
//!
//! z = blended momentum * (1 - correlation to the peer-average return).
//! The top K positive scores are held; the fewer positive scores the
//! universe shows, the more of the book is moved to a safe asset.

use super::{AllocationRule, column_indices, tradable_row};
use crate::domain::calendar::{CalendarConfig, RebalanceUnit};
use crate::domain::config_validation::{
    check_weights, parse_calendar, parse_extra_instrument, parse_f64_list, parse_instruments,
    parse_positive, parse_selected, parse_usize_list, strategy_name,
};
use crate::domain::error::AllocsimError;
use crate::domain::price_table::PriceTable;
use crate::domain::ranking::{SlotPolicy, rank_descending, select_top_k};
use crate::domain::signal::correlation::correlation_to_peer_average;
use crate::domain::signal::momentum::blended_return;
use crate::domain::signal::{daily_returns, map_columns};
use crate::domain::weights::WeightTable;
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone)]
pub struct ProtectiveMomentum {
    pub name: String,
    pub tickers: Vec<String>,
    pub safe_asset: String,
    pub calendar: CalendarConfig,
    /// Momentum lookbacks, in calendar units.
    pub lookbacks: Vec<usize>,
    pub lookback_weights: Vec<f64>,
    pub correlation_months: usize,
    pub selected: usize,
    pub breadth_protection: bool,
}

impl ProtectiveMomentum {
    pub fn from_config(config: &dyn ConfigPort, section: &str) -> Result<Self, AllocsimError> {
        let tickers = parse_instruments(config, section, "tickers")?;
        let lookbacks = parse_usize_list(config, section, "lookbacks", &[1, 3, 6, 12])?;
        let lookback_weights = parse_f64_list(config, section, "lookback_weights", &[1.0; 4])?;
        check_weights(section, "lookback_weights", &lookback_weights, lookbacks.len())?;
        Ok(Self {
            name: strategy_name(config, section),
            safe_asset: parse_extra_instrument(config, section, "safe_asset", &tickers)?,
            calendar: parse_calendar(config, section)?,
            correlation_months: parse_positive(config, section, "correlation_months", 12)?,
            selected: parse_selected(config, section, "selected", 1, tickers.len())?,
            breadth_protection: config.get_bool(section, "breadth_protection", true),
            lookbacks,
            lookback_weights,
            tickers,
        })
    }

    fn lookback_days(&self) -> Vec<usize> {
        let days = self.calendar.unit.trading_days();
        self.lookbacks.iter().map(|lb| lb * days).collect()
    }
}

/// Share of the book moved out of the risky universe.
pub fn protected_fraction(available: usize, positive: usize) -> f64 {
    if available == 0 {
        return 1.0;
    }
    let half = available as f64 / 2.0;
    if (positive as f64) < half {
        1.0
    } else {
        (available - positive) as f64 / half
    }
}

impl AllocationRule for ProtectiveMomentum {
    fn name(&self) -> &str {
        &self.name
    }

    fn calendar(&self) -> CalendarConfig {
        self.calendar
    }

    fn required_instruments(&self) -> Vec<String> {
        let mut all = self.tickers.clone();
        all.push(self.safe_asset.clone());
        all
    }

    fn traded_instruments(&self) -> Vec<String> {
        self.required_instruments()
    }

    fn benchmark_instruments(&self) -> Vec<String> {
        self.tickers.clone()
    }

    fn target_weights(&self, prices: &PriceTable) -> WeightTable {
        let lookbacks = self.lookback_days();
        let risky = column_indices(prices, &self.tickers);
        let closes: Vec<Vec<f64>> = risky.iter().map(|&j| prices.column(j).to_vec()).collect();
        let returns = map_columns(&closes, daily_returns);
        let correlation = correlation_to_peer_average(
            &returns,
            self.correlation_months * RebalanceUnit::Month.trading_days(),
        );
        let scores: Vec<Vec<f64>> = closes
            .iter()
            .zip(&correlation)
            .map(|(p, corr)| {
                blended_return(p, &lookbacks, &self.lookback_weights, 0)
                    .iter()
                    .zip(corr)
                    .map(|(m, c)| m * (1.0 - c))
                    .collect()
            })
            .collect();
        let safe_column = prices.index_of(&self.safe_asset);
        let safe_momentum = safe_column.map(|j| {
            blended_return(prices.column(j), &lookbacks, &self.lookback_weights, 0)
        });

        let rows = (0..prices.len())
            .map(|i| {
                let z = tradable_row(prices, &scores, &risky, i);
                let available = risky.iter().filter(|&&j| prices.is_tradable(i, j)).count();
                let positive = z.iter().filter(|&&s| s > 0.0).count();
                let protected = if self.breadth_protection {
                    protected_fraction(available, positive)
                } else {
                    0.0
                };
                let qualifies: Vec<bool> = z.iter().map(|&s| s > 0.0).collect();
                let mut weights: Vec<f64> = select_top_k(
                    &rank_descending(&z),
                    &qualifies,
                    self.selected,
                    SlotPolicy::QualifiersOnly,
                )
                .into_iter()
                .map(|w| w * (1.0 - protected))
                .collect();

                let residual = 1.0 - weights.iter().sum::<f64>();
                let safe_ok = match (safe_column, &safe_momentum) {
                    (Some(j), Some(m)) => prices.is_tradable(i, j) && m[i] > 0.0,
                    _ => false,
                };
                weights.push(if safe_ok { residual } else { 0.0 });
                weights
            })
            .collect();
        WeightTable::from_rows(prices.dates().to_vec(), self.traded_instruments(), rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;
    use crate::domain::strategy::test_support::*;
    use approx::assert_relative_eq;

    const ROWS: usize = 80;
    const LAST: usize = ROWS - 1;

    fn rule(selected: usize) -> ProtectiveMomentum {
        ProtectiveMomentum {
            name: "pm".into(),
            tickers: names(&["A", "B", "C", "D"]),
            safe_asset: "SAFE".into(),
            calendar: CalendarConfig {
                unit: RebalanceUnit::Day,
                frequency: 1,
                shift: 0,
            },
            lookbacks: vec![5, 10],
            lookback_weights: vec![1.0, 1.0],
            correlation_months: 2,
            selected,
            breadth_protection: true,
        }
    }

    /// Drifting path with a per-asset wiggle so no two assets are perfectly
    /// correlated.
    fn wiggle(drift: f64, k: usize) -> Vec<f64> {
        let mut price = 100.0;
        (0..ROWS)
            .map(|i| {
                if i > 0 {
                    let noise = ((i * (k + 1)) % 7) as f64 / 7.0 - 0.5;
                    price *= 1.0 + drift + noise * 0.01;
                }
                price
            })
            .collect()
    }

    /// Four risky assets drifting by `signs` percent a day, plus the safe asset.
    fn prices(signs: [f64; 4], safe: f64) -> PriceTable {
        let mut columns: Vec<Vec<f64>> = signs
            .iter()
            .enumerate()
            .map(|(k, s)| wiggle(s * 0.01, k))
            .collect();
        columns.push(trend(ROWS, safe));
        table(&["A", "B", "C", "D", "SAFE"], columns)
    }

    #[test]
    fn protected_fraction_follows_breadth() {
        assert_eq!(protected_fraction(4, 4), 0.0);
        assert_eq!(protected_fraction(4, 3), 0.5);
        assert_eq!(protected_fraction(4, 2), 1.0);
        assert_eq!(protected_fraction(4, 1), 1.0);
        assert_eq!(protected_fraction(0, 0), 1.0);
        assert_relative_eq!(protected_fraction(5, 3), 0.8);
    }

    #[test]
    fn broad_strength_is_fully_invested() {
        let targets = rule(2).target_weights(&prices([1.0; 4], 0.001));
        let row = targets.row(LAST);
        assert_eq!(row[..4].iter().filter(|&&w| w > 0.0).count(), 2);
        assert_relative_eq!(row[..4].iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(row[4], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn narrow_breadth_moves_half_to_safe_asset() {
        let targets = rule(2).target_weights(&prices([1.0, 1.0, 1.0, -1.0], 0.001));
        let row = targets.row(LAST);
        assert_relative_eq!(row[..4].iter().sum::<f64>(), 0.5, epsilon = 1e-12);
        assert_relative_eq!(row[4], 0.5, epsilon = 1e-12);
        assert_relative_eq!(targets.cash(LAST), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn weak_breadth_without_safe_momentum_is_cash() {
        let targets = rule(2).target_weights(&prices([1.0, -1.0, -1.0, -1.0], -0.001));
        let row = targets.row(LAST);
        assert_eq!(row, &[0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(targets.cash(LAST), 1.0);
    }

    #[test]
    fn disabled_protection_holds_positive_scores() {
        let mut r = rule(2);
        r.breadth_protection = false;
        let targets = r.target_weights(&prices([1.0, -1.0, -1.0, -1.0], 0.001));
        let row = targets.row(LAST);
        assert_eq!(row[0], 1.0);
        assert_eq!(row[4], 0.0);
    }

    #[test]
    fn benchmark_excludes_safe_asset() {
        let r = rule(1);
        assert_eq!(r.benchmark_instruments(), names(&["A", "B", "C", "D"]));
        assert_eq!(r.traded_instruments().last().unwrap(), "SAFE");
    }

    #[test]
    fn from_config_rejects_safe_asset_in_universe() {
        let config = FileConfigAdapter::from_string(
            "[strategy.pm]\ntickers = SPY, EFA, IEF\nsafe_asset = IEF\n",
        )
        .unwrap();
        let err = ProtectiveMomentum::from_config(&config, "strategy.pm").unwrap_err();
        assert!(matches!(err, AllocsimError::ConfigInvalid { key, .. } if key == "safe_asset"));

        let mismatched = FileConfigAdapter::from_string(
            "[strategy.pm]\ntickers = SPY, EFA\nsafe_asset = IEF\nlookbacks = 1, 3\nlookback_weights = 1\n",
        )
        .unwrap();
        let err = ProtectiveMomentum::from_config(&mismatched, "strategy.pm").unwrap_err();
        assert!(matches!(err, AllocsimError::ConfigInvalid { key, .. } if key == "lookback_weights"));
    }

    #[test]
    fn from_config_defaults() {
        let config = FileConfigAdapter::from_string(
            "[strategy.pm]\ntickers = SPY, EFA, EEM\nsafe_asset = IEF\nselected = 2\n",
        )
        .unwrap();
        let r = ProtectiveMomentum::from_config(&config, "strategy.pm").unwrap();
        assert_eq!(r.lookbacks, vec![1, 3, 6, 12]);
        assert_eq!(r.correlation_months, 12);
        assert!(r.breadth_protection);
        assert_eq!(r.selected, 2);
    }
}
