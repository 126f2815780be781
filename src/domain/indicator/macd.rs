//! MACD (Moving Average Convergence Divergence).
//!
//! line = EMA(fast) - EMA(slow), both taken at the most recent sample.
//! The signal line is approximated by the MACD line itself, so the
//! histogram is always 0. `signal_period` is accepted and ignored.
//! All components are 0 with fewer than `slow` samples.

use crate::domain::indicator::{MacdValue, calculate_ema};

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

pub fn calculate_macd(values: &[f64], fast: usize, slow: usize, _signal_period: usize) -> MacdValue {
    if values.len() < slow {
        return MacdValue::default();
    }

    let line = calculate_ema(values, fast) - calculate_ema(values, slow);
    MacdValue {
        line,
        signal: line,
        histogram: 0.0,
    }
}
