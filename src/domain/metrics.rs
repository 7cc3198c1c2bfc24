//! Performance metrics over a NAV curve.

use super::simulator::NavPoint;
use crate::domain::signal::volatility::ANNUALIZATION_DAYS;

const DAYS_PER_YEAR: f64 = 365.25;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Metrics {
    pub total_return: f64,
    pub cagr: f64,
    pub annualized_mean: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    /// Longest run of rows spent below a previous peak.
    pub max_drawdown_duration: usize,
    pub mar_ratio: f64,
}

impl Metrics {
    pub fn compute(curve: &[NavPoint]) -> Self {
        let (Some(first), Some(last)) = (curve.first(), curve.last()) else {
            return Self::default();
        };
        if curve.len() < 2 || first.nav <= 0.0 {
            return Self::default();
        }

        let total_return = last.nav / first.nav - 1.0;
        let days = (last.date - first.date).num_days() as f64;
        let cagr = if days > 0.0 && last.nav > 0.0 {
            (last.nav / first.nav).powf(DAYS_PER_YEAR / days) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(curve);
        let (annualized_mean, annualized_volatility, sharpe_ratio, sortino_ratio) =
            compute_risk_adjusted(curve);

        let mar_ratio = if max_drawdown > 0.0 {
            cagr / max_drawdown
        } else {
            0.0
        };

        Metrics {
            total_return,
            cagr,
            annualized_mean,
            annualized_volatility,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            mar_ratio,
        }
    }
}

fn compute_drawdown(curve: &[NavPoint]) -> (f64, usize) {
    if curve.is_empty() {
        return (0.0, 0);
    }

    let mut peak = curve[0].nav;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0usize;
    let mut current_dd_duration = 0usize;

    for point in curve {
        if point.nav >= peak {
            peak = point.nav;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            let dd = 1.0 - point.nav / peak;
            if dd > max_dd {
                max_dd = dd;
            }
            current_dd_duration += 1;
            if current_dd_duration > max_dd_duration {
                max_dd_duration = current_dd_duration;
            }
        }
    }

    (max_dd, max_dd_duration)
}

/// (annualised mean, annualised volatility, Sharpe, Sortino) of daily returns.
fn compute_risk_adjusted(curve: &[NavPoint]) -> (f64, f64, f64, f64) {
    let returns: Vec<f64> = curve
        .windows(2)
        .map(|w| {
            if w[0].nav > 0.0 {
                w[1].nav / w[0].nav - 1.0
            } else {
                0.0
            }
        })
        .collect();

    if returns.len() < 2 {
        return (0.0, 0.0, 0.0, 0.0);
    }

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;
    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);

    let annualized_mean = mean * ANNUALIZATION_DAYS;
    let annualized_volatility = variance.sqrt() * ANNUALIZATION_DAYS.sqrt();

    let sharpe = if annualized_volatility > 0.0 {
        annualized_mean / annualized_volatility
    } else {
        0.0
    };

    let downside_variance: f64 = returns.iter().map(|r| r.min(0.0).powi(2)).sum::<f64>() / n;
    let downside_volatility = downside_variance.sqrt() * ANNUALIZATION_DAYS.sqrt();
    let sortino = if downside_volatility > 0.0 {
        annualized_mean / downside_volatility
    } else {
        0.0
    };

    (annualized_mean, annualized_volatility, sharpe, sortino)
}
