//! Position / cash / NAV recurrence.
//!
//! For each row i after the seed row:
//! - if row i-1 is flagged, shares[i] = NAV[i-1] * w[i-1] / P[i-1] and
//!   cash[i] = NAV[i-1] * cash_w[i-1]
//! - otherwise shares and cash carry forward unchanged
//! - NAV[i] = sum(shares[i] * P[i]) + cash[i]
//!
//! The seed row is the row before the start date. It holds NAV 1, cash 1, no
//! positions. The recurrence works on any instrument universe: tickers, or
//! sub-strategy NAV series at the meta level.

use crate::domain::price_table::{PriceTable, is_valid_price};
use crate::domain::weights::WeightTable;
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct NavPoint {
    pub date: NaiveDate,
    pub nav: f64,
}

/// Simulated trajectory, one row per date from the seed row onward.
#[derive(Debug, Clone, PartialEq)]
pub struct Simulation {
    pub dates: Vec<NaiveDate>,
    pub instruments: Vec<String>,
    /// Share counts per row, one entry per instrument.
    pub positions: Vec<Vec<f64>>,
    /// Market value of each position per row.
    pub values: Vec<Vec<f64>>,
    pub cash: Vec<f64>,
    pub nav: Vec<f64>,
}

impl Simulation {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn nav_points(&self) -> Vec<NavPoint> {
        self.dates
            .iter()
            .zip(&self.nav)
            .map(|(&date, &nav)| NavPoint { date, nav })
            .collect()
    }

    /// NAV[i]/NAV[i-1] - 1, starting from the second row.
    pub fn daily_returns(&self) -> Vec<f64> {
        self.nav.windows(2).map(|w| w[1] / w[0] - 1.0).collect()
    }

    /// Realized (drifted) weights: position value over NAV on each row.
    pub fn realized_weights(&self) -> WeightTable {
        let rows = self
            .values
            .iter()
            .zip(&self.nav)
            .map(|(values, &nav)| {
                values
                    .iter()
                    .map(|v| if nav > 0.0 { v / nav } else { 0.0 })
                    .collect()
            })
            .collect();
        WeightTable::from_rows(self.dates.clone(), self.instruments.clone(), rows)
    }
}

/// Run the recurrence against per-row target weights.
///
/// Targets are matched to price columns by instrument name; an instrument the
/// table lacks has weight zero. Weight aimed at an instrument without a valid
/// price on the execution row stays in cash.
pub fn simulate(
    prices: &PriceTable,
    flags: &[bool],
    targets: &WeightTable,
    start: NaiveDate,
) -> Simulation {
    let mapping: Vec<Option<usize>> = prices
        .instruments()
        .iter()
        .map(|name| targets.index_of(name))
        .collect();
    run(prices, flags, start, |i| {
        let row = targets.row(i);
        let weights = mapping
            .iter()
            .map(|j| j.map_or(0.0, |j| row[j]))
            .collect();
        (weights, targets.cash(i))
    })
}

/// Equal-weight benchmark: 1/(tradable count) in every tradable instrument,
/// no cash.
pub fn simulate_equal_weight(prices: &PriceTable, flags: &[bool], start: NaiveDate) -> Simulation {
    run(prices, flags, start, |i| {
        let count = prices.tradable_count(i);
        if count == 0 {
            return (vec![0.0; prices.width()], 1.0);
        }
        let weight = 1.0 / count as f64;
        let weights = (0..prices.width())
            .map(|j| if prices.is_tradable(i, j) { weight } else { 0.0 })
            .collect();
        (weights, 0.0)
    })
}

fn run<F>(prices: &PriceTable, flags: &[bool], start: NaiveDate, target: F) -> Simulation
where
    F: Fn(usize) -> (Vec<f64>, f64),
{
    let n = prices.len();
    let width = prices.width();
    let Some(start_index) = prices.start_index(start) else {
        return Simulation {
            dates: Vec::new(),
            instruments: prices.instruments().to_vec(),
            positions: Vec::new(),
            values: Vec::new(),
            cash: Vec::new(),
            nav: Vec::new(),
        };
    };
    let seed = start_index.saturating_sub(1);

    // last valid price per instrument, as of the row being valued
    let mut marks = vec![f64::NAN; width];
    for i in 0..=seed {
        update_marks(prices, i, &mut marks);
    }

    let mut positions = vec![vec![0.0; width]];
    let mut values = vec![vec![0.0; width]];
    let mut cash = vec![1.0];
    let mut nav = vec![1.0];

    for i in seed + 1..n {
        let prev_nav = nav[nav.len() - 1];
        let (shares, held_cash) = if flags[i - 1] {
            let (weights, cash_weight) = target(i - 1);
            let mut uninvested = cash_weight;
            let shares: Vec<f64> = (0..width)
                .map(|j| {
                    let price = prices.price(i - 1, j);
                    if is_valid_price(price) {
                        prev_nav * weights[j] / price
                    } else {
                        uninvested += weights[j];
                        0.0
                    }
                })
                .collect();
            (shares, prev_nav * uninvested)
        } else {
            (positions[positions.len() - 1].clone(), cash[cash.len() - 1])
        };

        update_marks(prices, i, &mut marks);
        let row_values: Vec<f64> = shares
            .iter()
            .zip(&marks)
            .map(|(&s, &mark)| if s == 0.0 { 0.0 } else { s * mark })
            .collect();
        nav.push(row_values.iter().sum::<f64>() + held_cash);
        positions.push(shares);
        values.push(row_values);
        cash.push(held_cash);
    }

    Simulation {
        dates: prices.dates()[seed..].to_vec(),
        instruments: prices.instruments().to_vec(),
        positions,
        values,
        cash,
        nav,
    }
}

fn update_marks(prices: &PriceTable, row: usize, marks: &mut [f64]) {
    for (j, mark) in marks.iter_mut().enumerate() {
        let price = prices.price(row, j);
        if is_valid_price(price) {
            *mark = price;
        }
    }
}
