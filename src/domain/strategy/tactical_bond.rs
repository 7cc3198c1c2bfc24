//! Tactical bond rotation with a cash-proxy hurdle.

use super::{AllocationRule, column_indices, tradable_row};
use crate::domain::calendar::CalendarConfig;
use crate::domain::config_validation::{
    check_weights, parse_calendar, parse_extra_instrument, parse_f64_list, parse_float,
    parse_instruments, parse_selected, parse_usize_list, strategy_name,
};
use crate::domain::error::AllocsimError;
use crate::domain::price_table::PriceTable;
use crate::domain::ranking::{SlotPolicy, rank_descending, select_top_k};
use crate::domain::signal::momentum::blended_return;
use crate::domain::weights::WeightTable;
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdMode {
    Absolute(f64),
    /// Beat the cash proxy's own momentum.
    RelativeToCashProxy,
}

#[derive(Debug, Clone)]
pub struct TacticalBond {
    pub name: String,
    pub tickers: Vec<String>,
    pub cash_proxy: String,
    pub calendar: CalendarConfig,
    /// Momentum lookbacks, in calendar units.
    pub lookbacks: Vec<usize>,
    pub lookback_weights: Vec<f64>,
    pub selected: usize,
    pub threshold: ThresholdMode,
    /// Park the unallocated share in the cash proxy instead of cash.
    pub substitute_cash: bool,
}

impl TacticalBond {
    pub fn from_config(config: &dyn ConfigPort, section: &str) -> Result<Self, AllocsimError> {
        let tickers = parse_instruments(config, section, "tickers")?;
        let lookbacks = parse_usize_list(config, section, "lookbacks", &[1, 3, 6, 12])?;
        let lookback_weights = parse_f64_list(config, section, "lookback_weights", &[1.0; 4])?;
        check_weights(section, "lookback_weights", &lookback_weights, lookbacks.len())?;
        let threshold = match config
            .get_string(section, "threshold_mode")
            .map(|m| m.trim().to_lowercase())
            .as_deref()
        {
            None | Some("absolute") => {
                ThresholdMode::Absolute(parse_float(config, section, "abs_threshold", 0.0)?)
            }
            Some("relative") => ThresholdMode::RelativeToCashProxy,
            Some(other) => {
                return Err(AllocsimError::invalid(
                    section,
                    "threshold_mode",
                    format!("unknown threshold mode '{other}'"),
                ));
            }
        };
        Ok(Self {
            name: strategy_name(config, section),
            cash_proxy: parse_extra_instrument(config, section, "cash_proxy", &tickers)?,
            calendar: parse_calendar(config, section)?,
            selected: parse_selected(config, section, "selected", 1, tickers.len())?,
            substitute_cash: config.get_bool(section, "substitute_cash", true),
            threshold,
            lookbacks,
            lookback_weights,
            tickers,
        })
    }
}

impl AllocationRule for TacticalBond {
    fn name(&self) -> &str {
        &self.name
    }

    fn calendar(&self) -> CalendarConfig {
        self.calendar
    }

    fn required_instruments(&self) -> Vec<String> {
        let mut all = self.tickers.clone();
        all.push(self.cash_proxy.clone());
        all
    }

    fn traded_instruments(&self) -> Vec<String> {
        self.required_instruments()
    }

    fn benchmark_instruments(&self) -> Vec<String> {
        self.tickers.clone()
    }

    fn target_weights(&self, prices: &PriceTable) -> WeightTable {
        let days = self.calendar.unit.trading_days();
        let lookbacks: Vec<usize> = self.lookbacks.iter().map(|lb| lb * days).collect();
        let momentum_of = |j: usize| blended_return(prices.column(j), &lookbacks, &self.lookback_weights, 0);

        let bonds = column_indices(prices, &self.tickers);
        let momentum: Vec<Vec<f64>> = bonds.iter().map(|&j| momentum_of(j)).collect();
        let proxy_column = prices.index_of(&self.cash_proxy);
        let proxy_momentum: Vec<f64> = match proxy_column {
            Some(j) => momentum_of(j),
            None => vec![f64::NAN; prices.len()],
        };

        let rows = (0..prices.len())
            .map(|i| {
                let hurdle = match self.threshold {
                    ThresholdMode::Absolute(t) => t,
                    ThresholdMode::RelativeToCashProxy => {
                        let m = proxy_momentum[i];
                        if m.is_nan() { 0.0 } else { m }
                    }
                };
                let row = tradable_row(prices, &momentum, &bonds, i);
                let qualifies: Vec<bool> = row.iter().map(|&m| m > hurdle).collect();
                let mut weights = select_top_k(
                    &rank_descending(&row),
                    &qualifies,
                    self.selected,
                    SlotPolicy::QualifiersOnly,
                );
                let proxy_ok = self.substitute_cash
                    && proxy_column.is_some_and(|j| prices.is_tradable(i, j));
                let residual = 1.0 - weights.iter().sum::<f64>();
                weights.push(if proxy_ok { residual } else { 0.0 });
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
    use crate::domain::calendar::RebalanceUnit;
    use crate::domain::strategy::test_support::*;

    const ROWS: usize = 30;
    const LAST: usize = ROWS - 1;

    fn rule(threshold: ThresholdMode, substitute_cash: bool) -> TacticalBond {
        TacticalBond {
            name: "bonds".into(),
            tickers: names(&["TLT", "IEF", "HYG"]),
            cash_proxy: "BIL".into(),
            calendar: CalendarConfig {
                unit: RebalanceUnit::Day,
                frequency: 1,
                shift: 0,
            },
            lookbacks: vec![5, 10],
            lookback_weights: vec![1.0, 1.0],
            selected: 2,
            threshold,
            substitute_cash,
        }
    }

    fn prices(proxy: f64) -> PriceTable {
        table(
            &["TLT", "IEF", "HYG", "BIL"],
            vec![
                trend(ROWS, 0.002),
                trend(ROWS, 0.0005),
                trend(ROWS, -0.001),
                trend(ROWS, proxy),
            ],
        )
    }

    #[test]
    fn qualifiers_share_and_proxy_takes_rest() {
        let targets = rule(ThresholdMode::Absolute(0.0), true).target_weights(&prices(0.0001));
        assert_eq!(targets.row(LAST), &[0.5, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn relative_hurdle_uses_proxy_momentum() {
        // IEF drifts slower than BIL and drops out
        let targets = rule(ThresholdMode::RelativeToCashProxy, true).target_weights(&prices(0.001));
        assert_eq!(targets.row(LAST), &[1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn nothing_qualifies_moves_to_proxy_or_cash() {
        let mut r = rule(ThresholdMode::Absolute(0.5), true);
        let targets = r.target_weights(&prices(0.0001));
        assert_eq!(targets.row(LAST), &[0.0, 0.0, 0.0, 1.0]);

        r.substitute_cash = false;
        let targets = r.target_weights(&prices(0.0001));
        assert_eq!(targets.row(LAST), &[0.0, 0.0, 0.0, 0.0]);
        assert_eq!(targets.cash(LAST), 1.0);
    }

    #[test]
    fn proxy_without_price_leaves_cash() {
        let mut p = trend(ROWS, 0.0001);
        p[LAST] = f64::NAN;
        let prices = table(
            &["TLT", "IEF", "HYG", "BIL"],
            vec![trend(ROWS, -0.002), trend(ROWS, -0.001), trend(ROWS, -0.003), p],
        );
        let targets = rule(ThresholdMode::Absolute(0.0), true).target_weights(&prices);
        assert_eq!(targets.cash(LAST), 1.0);
    }

    #[test]
    fn benchmark_excludes_proxy() {
        let r = rule(ThresholdMode::Absolute(0.0), true);
        assert_eq!(r.benchmark_instruments(), names(&["TLT", "IEF", "HYG"]));
    }

    #[test]
    fn from_config_reads_threshold_mode() {
        let config = FileConfigAdapter::from_string(
            r#"
[strategy.rel]
tickers = TLT, IEF, HYG, LQD
cash_proxy = BIL
threshold_mode = relative
selected = 2
substitute_cash = no

[strategy.abs]
tickers = TLT, IEF
cash_proxy = BIL
abs_threshold = 0.02

[strategy.bad]
tickers = TLT, IEF
cash_proxy = BIL
threshold_mode = vibes
"#,
        )
        .unwrap();
        let rel = TacticalBond::from_config(&config, "strategy.rel").unwrap();
        assert_eq!(rel.threshold, ThresholdMode::RelativeToCashProxy);
        assert!(!rel.substitute_cash);
        let abs = TacticalBond::from_config(&config, "strategy.abs").unwrap();
        assert_eq!(abs.threshold, ThresholdMode::Absolute(0.02));
        assert!(abs.substitute_cash);
        assert!(TacticalBond::from_config(&config, "strategy.bad").is_err());
    }
}
