//! Simple Moving Average.
//!
//! SMA(n) = mean of the last n samples; 0.0 with fewer than n samples.

use crate::domain::indicator::trailing;

pub fn calculate_sma(values: &[f64], period: usize) -> f64 {
    match trailing(values, period) {
        Some(window) => window.iter().sum::<f64>() / period as f64,
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_whole_series() {
        assert!((calculate_sma(&[10.0, 20.0, 30.0], 3) - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sma_uses_most_recent_window() {
        // last two of [10, 20, 30, 40] → 35
        assert!((calculate_sma(&[10.0, 20.0, 30.0, 40.0], 2) - 35.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sma_insufficient_data() {
        assert_eq!(calculate_sma(&[1.0, 2.0], 3), 0.0);
        assert_eq!(calculate_sma(&[], 1), 0.0);
    }

    #[test]
    fn sma_zero_period() {
        assert_eq!(calculate_sma(&[1.0, 2.0], 0), 0.0);
    }
}
