//! Small descriptive-statistics helpers over `f64` slices.
//!
//! Degenerate inputs resolve to fixed values instead of NaN: empty slices
//! have a mean/median/max of 0.0 and single-element groups have a standard
//! deviation of 0.0.

#[allow(clippy::cast_precision_loss)]
pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Sample standard deviation (n - 1 denominator).
#[allow(clippy::cast_precision_loss)]
pub(crate) fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let center = mean(values);
    let sum_sq = values
        .iter()
        .map(|value| (value - center).powi(2))
        .sum::<f64>();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

pub(crate) fn max(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::max).unwrap_or(0.0)
}

/// Percentage change against the previous value; `None` for the first
/// element and whenever the previous value is zero.
pub(crate) fn pct_change(values: &[f64]) -> Vec<Option<f64>> {
    let mut changes = Vec::with_capacity(values.len());
    for (index, current) in values.iter().enumerate() {
        let change = match index.checked_sub(1).map(|prev| values[prev]) {
            Some(previous) if previous != 0.0 => Some((current - previous) / previous * 100.0),
            _ => None,
        };
        changes.push(change);
    }
    changes
}

/// Trailing rolling mean with a minimum window of one element.
pub(crate) fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|index| {
            let start = (index + 1).saturating_sub(window);
            mean(&values[start..=index])
        })
        .collect()
}
