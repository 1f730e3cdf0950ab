//! Small descriptive statistics over `f32` samples
//!
//! Standard deviations are population deviations (divide by `n`), which is
//! what the layer and depth heuristics are tuned against.

/// Arithmetic mean, `None` for an empty slice
#[must_use]
pub fn mean(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let sum: f64 = values.iter().map(|&v| f64::from(v)).sum();
    Some((sum / values.len() as f64) as f32)
}

/// Population standard deviation, `None` for an empty slice
#[must_use]
pub fn std_dev(values: &[f32]) -> Option<f32> {
    let m = f64::from(mean(values)?);
    let var: f64 = values
        .iter()
        .map(|&v| {
            let d = f64::from(v) - m;
            d * d
        })
        .sum::<f64>()
        / values.len() as f64;
    Some(var.sqrt() as f32)
}

/// Median; even-length input averages the two middle values
#[must_use]
pub fn median(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    let n = sorted.len();
    if n % 2 == 1 {
        Some(sorted[n / 2])
    } else {
        Some(0.5 * (sorted[n / 2 - 1] + sorted[n / 2]))
    }
}

/// Coefficient of variation (std / mean)
///
/// Returns 0.0 for empty input or a zero mean.
#[must_use]
pub fn coefficient_of_variation(values: &[f32]) -> f32 {
    match (mean(values), std_dev(values)) {
        (Some(m), Some(s)) if m != 0.0 => s / m,
        _ => 0.0,
    }
}
