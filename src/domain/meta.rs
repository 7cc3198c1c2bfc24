//! Meta-level blending of sub-strategy NAV series.
//!
//! The sub-strategy NAVs are treated as instruments of their own and run
//! through the same calendar/simulator pipeline. Each allocation variant
//! yields meta weights per strategy; multiplying them into the strategies'
//! own targets gives the flattened instrument-level book.

use crate::domain::calendar::{CalendarConfig, rebalance_flags};
use crate::domain::config_validation::{
    check_weights, parse_calendar, parse_count, parse_f64_list, parse_float, parse_positive,
};
use crate::domain::error::AllocsimError;
use crate::domain::price_table::PriceTable;
use crate::domain::ranking::ordinal_rank_descending;
use crate::domain::signal::momentum::period_return;
use crate::domain::signal::volatility::{rolling_sharpe, rolling_sortino};
use crate::domain::signal::{daily_returns, lag};
use crate::domain::simulator::{Simulation, simulate, simulate_equal_weight};
use crate::domain::strategy::SubStrategyResult;
use crate::domain::weights::{WeightTable, WeightVector};
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceScore {
    RelativeMomentum,
    Sharpe,
    Sortino,
}

impl PerformanceScore {
    pub fn key(self) -> &'static str {
        match self {
            PerformanceScore::RelativeMomentum => "relative_momentum",
            PerformanceScore::Sharpe => "sharpe",
            PerformanceScore::Sortino => "sortino",
        }
    }

    /// Score series for one NAV column. Lookback and skip are in rows.
    pub fn series(self, nav: &[f64], lookback: usize, skip: usize) -> Vec<f64> {
        let zero_nan = |values: Vec<f64>| -> Vec<f64> {
            values
                .into_iter()
                .map(|v| if v.is_nan() { 0.0 } else { v })
                .collect()
        };
        match self {
            PerformanceScore::RelativeMomentum => period_return(nav, lookback, skip),
            PerformanceScore::Sharpe => {
                zero_nan(lag(&rolling_sharpe(&daily_returns(nav), lookback), skip))
            }
            PerformanceScore::Sortino => {
                zero_nan(lag(&rolling_sortino(&daily_returns(nav), lookback), skip))
            }
        }
    }
}

impl FromStr for PerformanceScore {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "relative_momentum" | "momentum" => Ok(PerformanceScore::RelativeMomentum),
            "sharpe" => Ok(PerformanceScore::Sharpe),
            "sortino" => Ok(PerformanceScore::Sortino),
            other => Err(format!("unknown performance score '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetaAllocation {
    /// Constant weights, one per strategy, normalised to sum to one.
    Fixed(Vec<f64>),
    EqualWeight,
    /// The strategy ranked r-th by `score` takes `rank_weights[r - 1]` when
    /// its score beats `threshold`.
    Ranked {
        score: PerformanceScore,
        rank_weights: Vec<f64>,
        threshold: f64,
    },
}

impl MetaAllocation {
    pub fn label(&self) -> &'static str {
        match self {
            MetaAllocation::Fixed(_) => "fixed",
            MetaAllocation::EqualWeight => "equal",
            MetaAllocation::Ranked { score, .. } => score.key(),
        }
    }
}

impl fmt::Display for MetaAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone)]
pub struct MetaConfig {
    pub calendar: CalendarConfig,
    /// Score window, in calendar units.
    pub lookback: usize,
    pub skip: usize,
    pub allocations: Vec<MetaAllocation>,
}

impl MetaConfig {
    /// Read `[meta]`. Fixed weights come from each strategy section's
    /// `meta_weight`, in the order of `strategy_sections`.
    pub fn from_config(
        config: &dyn ConfigPort,
        strategy_sections: &[String],
    ) -> Result<Self, AllocsimError> {
        let n = strategy_sections.len();
        let labels = config
            .get_list("meta", "allocations")
            .unwrap_or_else(|| vec!["equal".to_string()]);
        if labels.is_empty() {
            return Err(AllocsimError::invalid("meta", "allocations", "no allocation listed"));
        }

        let mut allocations: Vec<MetaAllocation> = Vec::with_capacity(labels.len());
        for label in &labels {
            let allocation = match label.to_lowercase().as_str() {
                "fixed" => {
                    let weights = strategy_sections
                        .iter()
                        .map(|section| parse_float(config, section, "meta_weight", 1.0))
                        .collect::<Result<Vec<_>, _>>()?;
                    check_weights("meta", "meta_weight", &weights, n)?;
                    MetaAllocation::Fixed(normalize(&weights))
                }
                "equal" | "equal_weight" => MetaAllocation::EqualWeight,
                other => {
                    let score: PerformanceScore = other
                        .parse()
                        .map_err(|reason| AllocsimError::invalid("meta", "allocations", reason))?;
                    ranked_allocation(config, score, n)?
                }
            };
            if allocations.iter().any(|a| a.label() == allocation.label()) {
                return Err(AllocsimError::invalid(
                    "meta",
                    "allocations",
                    format!("'{}' listed twice", allocation.label()),
                ));
            }
            allocations.push(allocation);
        }

        Ok(Self {
            calendar: parse_calendar(config, "meta")?,
            lookback: parse_positive(config, "meta", "lookback_period", 6)?,
            skip: parse_count(config, "meta", "skipped_period", 0)?,
            allocations,
        })
    }
}

fn ranked_allocation(
    config: &dyn ConfigPort,
    score: PerformanceScore,
    n: usize,
) -> Result<MetaAllocation, AllocsimError> {
    let specific = format!("{}_rank_weights", score.key());
    let key = if config.get_string("meta", &specific).is_some() {
        specific
    } else {
        "rank_weights".to_string()
    };
    let rank_weights = parse_f64_list(config, "meta", &key, &vec![1.0; n])?;
    check_weights("meta", &key, &rank_weights, n)?;

    let specific = format!("{}_threshold", score.key());
    let threshold = match config.get_string("meta", &specific) {
        Some(_) => parse_float(config, "meta", &specific, 0.0)?,
        None => parse_float(config, "meta", "abs_threshold", 0.0)?,
    };
    Ok(MetaAllocation::Ranked {
        score,
        rank_weights: normalize(&rank_weights),
        threshold,
    })
}

fn normalize(weights: &[f64]) -> Vec<f64> {
    let total: f64 = weights.iter().sum();
    weights.iter().map(|w| w / total).collect()
}

/// One strategy's share of the current flattened book.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyContribution {
    pub strategy: String,
    pub meta_weight: f64,
    /// The strategy's own current weights scaled by `meta_weight`.
    pub weights: WeightVector,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentAllocation {
    pub date: Option<NaiveDate>,
    pub weights: WeightVector,
    pub contributions: Vec<StrategyContribution>,
}

#[derive(Debug, Clone)]
pub struct MetaResult {
    pub label: String,
    pub simulation: Simulation,
    /// Weights per strategy.
    pub targets: WeightTable,
    pub realized: WeightTable,
    /// Weights per underlying instrument.
    pub flattened: WeightTable,
    pub current: CurrentAllocation,
}

#[derive(Debug, Clone)]
pub struct MetaReport {
    pub variants: Vec<MetaResult>,
    /// Equal weight across the strategy NAVs.
    pub benchmark: Simulation,
}

/// All NAV series must cover the same dates.
pub fn check_alignment(subs: &[SubStrategyResult]) -> Result<(), AllocsimError> {
    let Some(reference) = subs.first() else {
        return Err(AllocsimError::invalid(
            "meta",
            "strategies",
            "no sub-strategy results to blend",
        ));
    };
    if subs.iter().any(|s| s.dates().len() != reference.dates().len()) {
        return Err(AllocsimError::DataAlignment {
            lengths: subs
                .iter()
                .map(|s| (s.name.clone(), s.dates().len()))
                .collect(),
        });
    }
    for other in &subs[1..] {
        let mismatch = reference
            .dates()
            .iter()
            .zip(other.dates())
            .position(|(a, b)| a != b);
        if let Some(row) = mismatch {
            return Err(AllocsimError::DateMismatch {
                reference: reference.name.clone(),
                other: other.name.clone(),
                row,
                reference_date: reference.dates()[row],
                other_date: other.dates()[row],
            });
        }
    }
    Ok(())
}

/// Aligned NAV series as a price table, one column per strategy.
pub fn nav_table(subs: &[SubStrategyResult]) -> Result<PriceTable, AllocsimError> {
    check_alignment(subs)?;
    let dates = subs[0].dates().to_vec();
    let names = subs.iter().map(|s| s.name.clone()).collect();
    let columns = subs.iter().map(|s| s.nav().to_vec()).collect();
    PriceTable::new(dates, names, columns)
}

/// Meta target weights for every row of the NAV table.
pub fn meta_weights(
    navs: &PriceTable,
    allocation: &MetaAllocation,
    lookback: usize,
    skip: usize,
) -> WeightTable {
    let n = navs.width();
    let rows: Vec<Vec<f64>> = match allocation {
        MetaAllocation::Fixed(weights) => vec![weights.clone(); navs.len()],
        MetaAllocation::EqualWeight => vec![vec![1.0 / n as f64; n]; navs.len()],
        MetaAllocation::Ranked {
            score,
            rank_weights,
            threshold,
        } => {
            let scores: Vec<Vec<f64>> = navs
                .columns()
                .iter()
                .map(|nav| score.series(nav, lookback, skip))
                .collect();
            (0..navs.len())
                .map(|i| {
                    let row: Vec<f64> = scores.iter().map(|s| s[i]).collect();
                    ordinal_rank_descending(&row)
                        .iter()
                        .zip(&row)
                        .map(|(&rank, &value)| {
                            if rank.is_nan() || !(value > *threshold) {
                                return 0.0;
                            }
                            let slot = (rank.round() as usize).saturating_sub(1);
                            rank_weights.get(slot).copied().unwrap_or(0.0)
                        })
                        .collect()
                })
                .collect()
        }
    };
    WeightTable::from_rows(navs.dates().to_vec(), navs.instruments().to_vec(), rows)
}

/// Instrument-level weights: each strategy's targets scaled by its meta
/// weight and summed. Instruments are the sorted union over all strategies.
pub fn flatten(meta_targets: &WeightTable, subs: &[SubStrategyResult]) -> WeightTable {
    let instruments: Vec<String> = subs
        .iter()
        .flat_map(|s| s.targets.instruments().iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let rows = (0..meta_targets.len())
        .map(|i| {
            instruments
                .iter()
                .map(|name| {
                    subs.iter()
                        .map(|s| meta_targets.weight(i, &s.name) * s.targets.weight(i, name))
                        .sum()
                })
                .collect()
        })
        .collect();
    WeightTable::from_rows(meta_targets.dates().to_vec(), instruments, rows)
}

/// Flattened weights on the last row together with each strategy's part in them.
pub fn current_allocation(
    meta_targets: &WeightTable,
    flattened: &WeightTable,
    subs: &[SubStrategyResult],
) -> CurrentAllocation {
    let contributions = match meta_targets.latest() {
        Some(latest) => subs
            .iter()
            .map(|s| {
                let meta_weight = latest.weight(&s.name);
                StrategyContribution {
                    strategy: s.name.clone(),
                    meta_weight,
                    weights: s.current.scaled(meta_weight),
                }
            })
            .collect(),
        None => Vec::new(),
    };
    CurrentAllocation {
        date: flattened.dates().last().copied(),
        weights: flattened.latest().unwrap_or_default(),
        contributions,
    }
}

/// Blend the sub-strategies under every configured allocation, plus an
/// equal-weight benchmark over their NAVs.
pub fn run_meta(
    subs: &[SubStrategyResult],
    config: &MetaConfig,
    start: NaiveDate,
) -> Result<MetaReport, AllocsimError> {
    let navs = nav_table(subs)?;
    let flags = rebalance_flags(navs.dates(), &config.calendar)?;
    let days = config.calendar.unit.trading_days();
    let lookback = config.lookback * days;
    let skip = config.skip * days;
    info!(
        strategies = subs.len(),
        rows = navs.len(),
        variants = config.allocations.len(),
        "blending sub-strategies"
    );

    let mut variants = Vec::with_capacity(config.allocations.len());
    for allocation in &config.allocations {
        let targets = meta_weights(&navs, allocation, lookback, skip);
        let simulation = simulate(&navs, &flags, &targets, start);
        let targets = targets.slice_from(navs.len() - simulation.len());
        let realized = simulation.realized_weights();
        let flattened = flatten(&targets, &subs_from(subs, navs.len() - simulation.len()));
        let current = current_allocation(&targets, &flattened, subs);
        debug!(
            variant = allocation.label(),
            final_nav = simulation.nav.last().copied().unwrap_or(1.0),
            "meta variant simulated"
        );
        variants.push(MetaResult {
            label: allocation.label().to_string(),
            simulation,
            targets,
            realized,
            flattened,
            current,
        });
    }

    let benchmark = simulate_equal_weight(&navs, &flags, start);
    Ok(MetaReport {
        variants,
        benchmark,
    })
}

/// Sub-strategy results with their target tables cut to rows `offset..`.
fn subs_from(subs: &[SubStrategyResult], offset: usize) -> Vec<SubStrategyResult> {
    if offset == 0 {
        return subs.to_vec();
    }
    subs.iter()
        .map(|s| SubStrategyResult {
            targets: s.targets.slice_from(offset),
            ..s.clone()
        })
        .collect()
}
