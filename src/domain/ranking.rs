//! Cross-sectional ranking and top-K selection.
//!
//! All functions work on one row of a signal matrix: one value per
//! instrument. NaN means "no signal" and is never ranked or selected.

use std::cmp::Ordering;

/// Rank values largest-first (largest = 1). Ties share the average rank.
pub fn rank_descending(values: &[f64]) -> Vec<f64> {
    average_rank(values, true)
}

/// Rank values smallest-first (smallest = 1). Ties share the average rank.
pub fn rank_ascending(values: &[f64]) -> Vec<f64> {
    average_rank(values, false)
}

fn average_rank(values: &[f64], descending: bool) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).filter(|&i| !values[i].is_nan()).collect();
    order.sort_by(|&a, &b| {
        let ord = values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal);
        let ord = if descending { ord.reverse() } else { ord };
        ord.then(a.cmp(&b))
    });

    let mut ranks = vec![f64::NAN; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // positions start..end share ranks start+1..=end
        let rank = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        start = end;
    }
    ranks
}

/// Weighted rank of ranks.
///
/// Each component is a rank vector produced by [`rank_descending`] or
/// [`rank_ascending`]. Rank numbers are weighted, summed, and the sum is
/// ranked ascending, so the best composite gets rank 1. Components with zero
/// weight are ignored; an instrument unranked in any weighted component stays
/// unranked.
pub fn combine_ranks(components: &[(&[f64], f64)]) -> Vec<f64> {
    let width = components.first().map_or(0, |(ranks, _)| ranks.len());
    let composite: Vec<f64> = (0..width)
        .map(|j| {
            components
                .iter()
                .filter(|(_, weight)| *weight != 0.0)
                .map(|(ranks, weight)| ranks[j] * weight)
                .sum()
        })
        .collect();
    rank_ascending(&composite)
}

/// Distinct ranks, largest value first. Equal values are ordered by column
/// position, earlier columns ranking better.
pub fn ordinal_rank_descending(values: &[f64]) -> Vec<f64> {
    let base = rank_descending(values);
    // nudges stay below the 0.5 gap between distinct average ranks
    let step = 0.5 / (values.len() as f64 + 1.0);
    let nudged: Vec<f64> = base
        .iter()
        .enumerate()
        .map(|(j, &rank)| rank + step * (j as f64 + 1.0))
        .collect();
    rank_ascending(&nudged)
}

/// How weight is spread when fewer than K instruments qualify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPolicy {
    /// Each selection takes 1/max(K, selected); empty slots stay in cash.
    FixedSlots,
    /// The selections share the whole allocation equally.
    QualifiersOnly,
}

/// Equal-weight the instruments ranked within the top `k` that qualify.
pub fn select_top_k(ranks: &[f64], qualifies: &[bool], k: usize, policy: SlotPolicy) -> Vec<f64> {
    let cutoff = (k + 1) as f64;
    let selected: Vec<bool> = ranks
        .iter()
        .zip(qualifies)
        .map(|(&rank, &ok)| ok && !rank.is_nan() && rank < cutoff)
        .collect();
    let count = selected.iter().filter(|&&s| s).count();
    if count == 0 {
        return vec![0.0; ranks.len()];
    }
    let slots = match policy {
        SlotPolicy::FixedSlots => count.max(k),
        SlotPolicy::QualifiersOnly => count,
    };
    let weight = 1.0 / slots as f64;
    selected
        .iter()
        .map(|&s| if s { weight } else { 0.0 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_ranks(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            if e.is_nan() {
                assert!(a.is_nan(), "expected NaN, got {a}");
            } else {
                assert!((a - e).abs() < 1e-12, "expected {e}, got {a}");
            }
        }
    }

    #[test]
    fn descending_rank_puts_largest_first() {
        assert_ranks(&rank_descending(&[0.1, 0.3, -0.2]), &[2.0, 1.0, 3.0]);
    }

    #[test]
    fn ascending_rank_puts_smallest_first() {
        assert_ranks(&rank_ascending(&[0.1, 0.3, -0.2]), &[2.0, 3.0, 1.0]);
    }

    #[test]
    fn ties_share_average_rank() {
        assert_ranks(&rank_descending(&[5.0, 7.0, 5.0, 1.0]), &[2.5, 1.0, 2.5, 4.0]);
        assert_ranks(&rank_ascending(&[2.0, 2.0, 2.0]), &[2.0, 2.0, 2.0]);
    }

    #[test]
    fn nan_values_stay_unranked() {
        assert_ranks(
            &rank_descending(&[f64::NAN, 0.2, 0.4, f64::NAN]),
            &[f64::NAN, 2.0, 1.0, f64::NAN],
        );
        assert_ranks(&rank_ascending(&[f64::NAN; 3]), &[f64::NAN; 3]);
    }

    #[test]
    fn rank_of_ranks_uses_rank_numbers_not_magnitudes() {
        // momentum favours A, volatility favours C
        let momentum = rank_descending(&[0.50, 0.10, 0.05]);
        let volatility = rank_ascending(&[0.30, 0.20, 0.01]);
        let combined = combine_ranks(&[(&momentum, 1.0), (&volatility, 1.0)]);
        // composites: A 1+3=4, B 2+2=4, C 3+1=4
        assert_ranks(&combined, &[2.0, 2.0, 2.0]);

        let combined = combine_ranks(&[(&momentum, 2.0), (&volatility, 1.0)]);
        // composites: A 5, B 6, C 7
        assert_ranks(&combined, &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn zero_weight_component_is_ignored() {
        let momentum = rank_descending(&[0.5, 0.1]);
        let correlation = vec![f64::NAN, f64::NAN];
        let combined = combine_ranks(&[(&momentum, 1.0), (&correlation, 0.0)]);
        assert_ranks(&combined, &[1.0, 2.0]);
    }

    #[test]
    fn unranked_component_leaves_instrument_unranked() {
        let momentum = rank_descending(&[0.5, 0.1, 0.3]);
        let volatility = rank_ascending(&[0.2, f64::NAN, 0.1]);
        let combined = combine_ranks(&[(&momentum, 1.0), (&volatility, 1.0)]);
        assert!(combined[1].is_nan());
        assert!(!combined[0].is_nan() && !combined[2].is_nan());
    }

    #[test]
    fn ordinal_rank_breaks_ties_by_position() {
        assert_ranks(
            &ordinal_rank_descending(&[0.0, 0.2, 0.0, 0.2]),
            &[3.0, 1.0, 4.0, 2.0],
        );
        assert_ranks(
            &ordinal_rank_descending(&[0.3, f64::NAN, 0.1]),
            &[1.0, f64::NAN, 2.0],
        );
    }

    #[test]
    fn single_qualifier_below_k_with_fixed_slots_leaves_residual() {
        // 4 candidates, K = 2, only the top ranked clears the threshold
        let momentum = [0.08, -0.01, -0.03, -0.05];
        let ranks = rank_descending(&momentum);
        let qualifies: Vec<bool> = momentum.iter().map(|&m| m > 0.0).collect();

        let weights = select_top_k(&ranks, &qualifies, 2, SlotPolicy::FixedSlots);
        assert_eq!(weights.iter().filter(|&&w| w > 0.0).count(), 1);
        assert_eq!(weights, vec![0.5, 0.0, 0.0, 0.0]);
        let cash = 1.0 - weights.iter().sum::<f64>();
        assert!((cash - 0.5).abs() < 1e-12);
    }

    #[test]
    fn single_qualifier_with_qualifiers_only_takes_everything() {
        let momentum = [0.08, -0.01, -0.03, -0.05];
        let ranks = rank_descending(&momentum);
        let qualifies: Vec<bool> = momentum.iter().map(|&m| m > 0.0).collect();
        let weights = select_top_k(&ranks, &qualifies, 2, SlotPolicy::QualifiersOnly);
        assert_eq!(weights, vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn ties_at_cutoff_never_overallocate() {
        let ranks = rank_descending(&[0.3, 0.2, 0.2, 0.1]);
        let qualifies = [true; 4];
        // B and C tie at 2.5 < 3, so three instruments pass a K = 2 cut
        let weights = select_top_k(&ranks, &qualifies, 2, SlotPolicy::FixedSlots);
        let total: f64 = weights.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!(weights[..3].iter().all(|&w| (w - 1.0 / 3.0).abs() < 1e-12));
    }

    #[test]
    fn nothing_selected_gives_zero_weights() {
        let weights = select_top_k(&[f64::NAN, f64::NAN], &[true, true], 1, SlotPolicy::FixedSlots);
        assert_eq!(weights, vec![0.0, 0.0]);
    }
}
