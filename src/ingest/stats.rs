//! Summary statistics for sample arrays

use super::types::SampleStats;

/// Compute mean, range and approximate quartiles
///
/// Quartiles are picked from the sorted values at `n/4`, `n/2` and `3n/4`.
/// With more than five values the single lowest and highest are trimmed
/// first so one outlier cannot move the quartiles. Mean, min and max always
/// use the full set. Returns `None` for an empty slice.
pub fn compute_stats(values: &[f64]) -> Option<SampleStats> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();

    let mean = sorted.iter().sum::<f64>() / n as f64;
    let trimmed = if n > 5 { &sorted[1..n - 1] } else { &sorted[..] };
    let m = trimmed.len();

    Some(SampleStats {
        count: n,
        mean,
        min: sorted[0],
        max: sorted[n - 1],
        q1: trimmed[m / 4],
        median: trimmed[m / 2],
        q3: trimmed[(3 * m) / 4],
    })
}

/// Arithmetic mean, `None` when empty
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
