//! Population standard deviation.
//!
//! STDDEV(n) = sqrt(sum((x - mean)^2) / n) over the last n samples.
//! Returns `None` with fewer than n samples.

use crate::domain::indicator::trailing;

/// Mean and population standard deviation of the trailing window.
pub fn mean_and_stddev(values: &[f64], period: usize) -> Option<(f64, f64)> {
    let window = trailing(values, period)?;
    let n = period as f64;
    let mean = window.iter().sum::<f64>() / n;
    let variance = window
        .iter()
        .map(|x| {
            let diff = x - mean;
            diff * diff
        })
        .sum::<f64>()
        / n;
    Some((mean, variance.sqrt()))
}
