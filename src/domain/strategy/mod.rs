//! Sub-strategies: allocation rules run against their own trading calendar.
//!
//! A rule only decides target weights. [`run_rule`] supplies everything
//! around it: the rule's instrument subset and date index, rebalance flags,
//! the simulation and an equal-weight benchmark over the same instruments.

pub mod breakout;
pub mod canary;
pub mod dual_momentum;
pub mod protective_momentum;
pub mod tactical_bond;

use crate::domain::calendar::{CalendarConfig, rebalance_flags};
use crate::domain::config_validation::require_string;
use crate::domain::error::AllocsimError;
use crate::domain::price_table::PriceTable;
use crate::domain::simulator::{Simulation, simulate, simulate_equal_weight};
use crate::domain::weights::{WeightTable, WeightVector};
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use tracing::debug;

pub use breakout::Breakout;
pub use canary::{CanaryRotation, CanaryVariant};
pub use dual_momentum::{CorrelationMode, DualMomentum};
pub use protective_momentum::ProtectiveMomentum;
pub use tactical_bond::{TacticalBond, ThresholdMode};

/// Target-weight logic of one sub-strategy.
pub trait AllocationRule: Send + Sync {
    fn name(&self) -> &str;

    fn calendar(&self) -> CalendarConfig;

    /// Every instrument the rule reads, signal-only baskets included.
    fn required_instruments(&self) -> Vec<String>;

    /// Instruments that can receive weight.
    fn traded_instruments(&self) -> Vec<String>;

    fn benchmark_instruments(&self) -> Vec<String> {
        self.traded_instruments()
    }

    /// Target weights for every row of `prices`, over
    /// [`traded_instruments`](Self::traded_instruments). `prices` holds
    /// exactly the required instruments.
    fn target_weights(&self, prices: &PriceTable) -> WeightTable;
}

/// Output of one sub-strategy, every table cut to the simulated dates.
#[derive(Debug, Clone)]
pub struct SubStrategyResult {
    pub name: String,
    pub simulation: Simulation,
    pub targets: WeightTable,
    pub realized: WeightTable,
    /// Target weights decided on the last row.
    pub current: WeightVector,
    pub benchmark: Simulation,
}

impl SubStrategyResult {
    pub fn dates(&self) -> &[NaiveDate] {
        &self.simulation.dates
    }

    pub fn nav(&self) -> &[f64] {
        &self.simulation.nav
    }
}

pub fn run_rule(
    rule: &dyn AllocationRule,
    prices: &PriceTable,
    start: NaiveDate,
) -> Result<SubStrategyResult, AllocsimError> {
    let table = prices.select(&rule.required_instruments())?.drop_empty_rows();
    if table.start_index(start).is_none() {
        return Err(AllocsimError::InsufficientData {
            ticker: rule.name().to_string(),
            rows: 0,
            minimum: 1,
        });
    }

    let flags = rebalance_flags(table.dates(), &rule.calendar())?;
    let targets = rule.target_weights(&table);
    let traded = table.select(&rule.traded_instruments())?;
    let simulation = simulate(&traded, &flags, &targets, start);
    let benchmark_prices = table.select(&rule.benchmark_instruments())?;
    let benchmark = simulate_equal_weight(&benchmark_prices, &flags, start);

    let targets = targets.slice_from(table.len() - simulation.len());
    let realized = simulation.realized_weights();
    let current = targets.latest().unwrap_or_default();
    debug!(
        strategy = rule.name(),
        calendar = %rule.calendar(),
        rows = simulation.len(),
        rebalances = flags.iter().filter(|&&f| f).count(),
        "sub-strategy simulated"
    );

    Ok(SubStrategyResult {
        name: rule.name().to_string(),
        simulation,
        targets,
        realized,
        current,
        benchmark,
    })
}

/// Build the rule configured in `section` according to its `kind`.
pub fn rule_from_config(
    config: &dyn ConfigPort,
    section: &str,
) -> Result<Box<dyn AllocationRule>, AllocsimError> {
    let kind = require_string(config, section, "kind")?;
    let rule: Box<dyn AllocationRule> = match kind.to_lowercase().as_str() {
        "dual_momentum" => Box::new(DualMomentum::from_config(config, section)?),
        "breakout" => Box::new(Breakout::from_config(config, section)?),
        "canary" => Box::new(CanaryRotation::from_config(config, section)?),
        "protective_momentum" => Box::new(ProtectiveMomentum::from_config(config, section)?),
        "tactical_bond" => Box::new(TacticalBond::from_config(config, section)?),
        other => {
            return Err(AllocsimError::invalid(
                section,
                "kind",
                format!("unknown strategy kind '{other}'"),
            ));
        }
    };
    Ok(rule)
}

/// Signal values for the columns `indices` on row `i`. Instruments without a
/// valid price on that row read as NaN.
pub(crate) fn tradable_row(
    prices: &PriceTable,
    signals: &[Vec<f64>],
    indices: &[usize],
    i: usize,
) -> Vec<f64> {
    signals
        .iter()
        .zip(indices)
        .map(|(signal, &j)| {
            if prices.is_tradable(i, j) {
                signal[i]
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// Column positions of `names` in `prices`, skipping any it lacks.
pub(crate) fn column_indices(prices: &PriceTable, names: &[String]) -> Vec<usize> {
    names.iter().filter_map(|n| prices.index_of(n)).collect()
}

/// Concatenation without repeats, first occurrence wins.
pub(crate) fn union(lists: &[&[String]]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in lists.iter().flat_map(|l| l.iter()) {
        if !out.contains(name) {
            out.push(name.clone());
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::domain::price_table::PriceTable;
    use chrono::{Datelike, Duration, NaiveDate, Weekday};

    /// `n` consecutive weekdays starting 2020-01-01.
    pub fn weekdays(n: usize) -> Vec<NaiveDate> {
        let mut dates = Vec::with_capacity(n);
        let mut d = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        while dates.len() < n {
            if !matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
                dates.push(d);
            }
            d += Duration::days(1);
        }
        dates
    }

    /// Geometric price path with a constant daily return.
    pub fn trend(n: usize, daily: f64) -> Vec<f64> {
        (0..n).map(|i| 100.0 * (1.0 + daily).powi(i as i32)).collect()
    }

    /// Daily returns alternating between `a` and `b`.
    pub fn zigzag(n: usize, a: f64, b: f64) -> Vec<f64> {
        let mut price = 100.0;
        (0..n)
            .map(|i| {
                if i > 0 {
                    price *= 1.0 + if i % 2 == 0 { a } else { b };
                }
                price
            })
            .collect()
    }

    pub fn table(names: &[&str], columns: Vec<Vec<f64>>) -> PriceTable {
        let n = columns[0].len();
        PriceTable::new(
            weekdays(n),
            names.iter().map(|s| s.to_string()).collect(),
            columns,
        )
        .unwrap()
    }

    pub fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }
}
