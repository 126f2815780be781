//! Market data access port trait.

use crate::domain::error::VedaError;
use crate::domain::ohlcv::OhlcvBar;

pub trait DataPort {
    /// All bars for `symbol`, sorted oldest-first.
    fn fetch_bars(&self, symbol: &str) -> Result<Vec<OhlcvBar>, VedaError>;

    fn list_symbols(&self) -> Result<Vec<String>, VedaError>;
}
