//! Backtest orchestration: sub-strategies first, then the meta blend.

use crate::domain::error::AllocsimError;
use crate::domain::meta::{MetaConfig, MetaReport, run_meta};
use crate::domain::price_table::PriceTable;
use crate::domain::strategy::{AllocationRule, SubStrategyResult, run_rule};
use chrono::{Months, NaiveDate};
use rayon::prelude::*;
use tracing::{info, warn};

/// Rows inspected for missing recent quotes.
pub const STALE_WINDOW: usize = 63;

pub const DEFAULT_WARMUP_MONTHS: u32 = 24;

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// History loaded ahead of `start_date` so lookbacks are warm on day one.
    pub warmup_months: u32,
}

impl BacktestConfig {
    pub fn data_start(&self) -> NaiveDate {
        self.start_date
            .checked_sub_months(Months::new(self.warmup_months))
            .unwrap_or(NaiveDate::MIN)
    }
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub strategies: Vec<SubStrategyResult>,
    pub meta: MetaReport,
}

/// Run every rule against `prices`. Results keep the order of `rules`.
pub fn run_sub_strategies(
    prices: &PriceTable,
    rules: &[Box<dyn AllocationRule>],
    start: NaiveDate,
) -> Result<Vec<SubStrategyResult>, AllocsimError> {
    rules
        .par_iter()
        .map(|rule| run_rule(rule.as_ref(), prices, start))
        .collect()
}

pub fn run_backtest(
    prices: PriceTable,
    rules: &[Box<dyn AllocationRule>],
    meta: &MetaConfig,
    config: &BacktestConfig,
) -> Result<BacktestResult, AllocsimError> {
    let prices = prices.truncate_after(config.end_date);
    for ticker in prices.stale_instruments(STALE_WINDOW) {
        warn!(ticker = %ticker, window = STALE_WINDOW, "missing recent prices");
    }

    info!(
        strategies = rules.len(),
        rows = prices.len(),
        start = %config.start_date,
        end = %config.end_date,
        "running sub-strategies"
    );
    let strategies = run_sub_strategies(&prices, rules, config.start_date)?;

    info!(variants = meta.allocations.len(), "running meta blend");
    let meta = run_meta(&strategies, meta, config.start_date)?;

    Ok(BacktestResult { strategies, meta })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calendar::{CalendarConfig, RebalanceUnit};
    use crate::domain::meta::MetaAllocation;
    use crate::domain::strategy::Breakout;
    use crate::domain::strategy::test_support::*;

    fn sample_config() -> BacktestConfig {
        BacktestConfig {
            start_date: NaiveDate::from_ymd_opt(2020, 3, 2).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2020, 6, 30).unwrap(),
            warmup_months: 2,
        }
    }

    fn daily() -> CalendarConfig {
        CalendarConfig {
            unit: RebalanceUnit::Day,
            frequency: 1,
            shift: 0,
        }
    }

    fn breakout(name: &str, tickers: &[&str]) -> Box<dyn AllocationRule> {
        Box::new(Breakout {
            name: name.into(),
            tickers: names(tickers),
            calendar: daily(),
            band_lookbacks: vec![5, 10],
            volatility_lookback: 5,
            lower_quantile: 0.25,
            upper_quantile: 0.75,
        })
    }

    fn meta_config() -> MetaConfig {
        MetaConfig {
            calendar: daily(),
            lookback: 5,
            skip: 0,
            allocations: vec![MetaAllocation::EqualWeight],
        }
    }

    #[test]
    fn data_start_subtracts_warmup() {
        let config = sample_config();
        assert_eq!(config.data_start(), NaiveDate::from_ymd_opt(2020, 1, 2).unwrap());
        let config = BacktestConfig {
            warmup_months: 0,
            ..sample_config()
        };
        assert_eq!(config.data_start(), config.start_date);
    }

    #[test]
    fn sub_strategies_keep_rule_order() {
        let prices = table(
            &["A", "B"],
            vec![zigzag(150, 0.02, -0.005), zigzag(150, 0.01, -0.002)],
        );
        let rules = vec![breakout("second", &["B"]), breakout("first", &["A"])];
        let start = prices.dates()[40];
        let results = run_sub_strategies(&prices, &rules, start).unwrap();
        assert_eq!(results[0].name, "second");
        assert_eq!(results[1].name, "first");
    }

    #[test]
    fn backtest_truncates_at_end_date() {
        let prices = table(
            &["A", "B"],
            vec![zigzag(150, 0.02, -0.005), zigzag(150, 0.01, -0.002)],
        );
        let rules = vec![breakout("a", &["A"]), breakout("b", &["B"])];
        let end = prices.dates()[99];
        let config = BacktestConfig {
            start_date: prices.dates()[40],
            end_date: end,
            warmup_months: 2,
        };
        let result = run_backtest(prices, &rules, &meta_config(), &config).unwrap();
        assert_eq!(result.strategies.len(), 2);
        assert_eq!(*result.strategies[0].dates().last().unwrap(), end);
        assert_eq!(result.meta.variants.len(), 1);
        assert_eq!(result.meta.variants[0].simulation.len(), 61);
    }

    #[test]
    fn missing_ticker_fails_the_run() {
        let prices = table(&["A"], vec![zigzag(50, 0.02, -0.005)]);
        let rules = vec![breakout("a", &["A"]), breakout("x", &["XYZ"])];
        let start = prices.dates()[10];
        let err = run_sub_strategies(&prices, &rules, start).unwrap_err();
        assert!(matches!(err, AllocsimError::NoData { ticker } if ticker == "XYZ"));
    }
}
