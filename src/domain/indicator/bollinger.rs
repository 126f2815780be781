//! Bollinger Bands.
//!
//! middle = SMA(n), upper/lower = middle ± multiplier × population stddev.
//! All bands are 0 with fewer than n samples.

use crate::domain::indicator::BollingerBands;
use crate::domain::indicator::stddev::mean_and_stddev;

pub const DEFAULT_PERIOD: usize = 20;
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

pub fn calculate_bollinger(values: &[f64], period: usize, multiplier: f64) -> BollingerBands {
    match mean_and_stddev(values, period) {
        Some((middle, sd)) => BollingerBands {
            upper: middle + multiplier * sd,
            middle,
            lower: middle - multiplier * sd,
        },
        None => BollingerBands::default(),
    }
}
