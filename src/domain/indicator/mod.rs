//! Technical indicators used by the built-in library.
//!
//! Every function takes a series ordered oldest-first and returns the value
//! as of the most recent sample. Insufficient history never fails; each
//! indicator documents the neutral value it falls back to.
//!
//! - `sma`, `ema`, `rsi`: single values
//! - `macd`: `MacdValue` (signal line approximated by the MACD line)
//! - `bollinger`: `BollingerBands`
//! - `stddev`: population standard deviation, shared by Bollinger

pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod stddev;

pub use bollinger::calculate_bollinger;
pub use ema::calculate_ema;
pub use macd::calculate_macd;
pub use rsi::calculate_rsi;
pub use sma::calculate_sma;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MacdValue {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// The trailing `period` samples, or `None` when there are fewer.
pub(crate) fn trailing(values: &[f64], period: usize) -> Option<&[f64]> {
    if period == 0 || values.len() < period {
        return None;
    }
    Some(&values[values.len() - period..])
}
