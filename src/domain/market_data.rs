//! Read-only market data snapshot handed to a run.
//!
//! Series are stored oldest-first. Offsets count back from the most recent
//! bar, so offset 0 is the last element.

use crate::domain::error::VedaError;
use crate::domain::ohlcv::OhlcvBar;
use std::collections::HashMap;

pub const PRICE_FIELDS: [&str; 5] = ["open", "high", "low", "close", "volume"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketData {
    series: HashMap<String, Vec<f64>>,
}

impl MarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the five price series from bars sorted oldest-first.
    pub fn from_bars(bars: &[OhlcvBar]) -> Self {
        let mut data = MarketData::new();
        for field in PRICE_FIELDS {
            let values = bars.iter().filter_map(|bar| bar.field(field)).collect();
            data.insert(field, values);
        }
        data
    }

    pub fn with_series(mut self, field: &str, values: Vec<f64>) -> Self {
        self.insert(field, values);
        self
    }

    /// Field names are stored lowercase.
    pub fn insert(&mut self, field: &str, values: Vec<f64>) {
        self.series.insert(field.to_lowercase(), values);
    }

    /// The whole series, oldest-first. Missing fields are empty.
    pub fn series(&self, field: &str) -> &[f64] {
        self.series.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn value_at(&self, field: &str, offset: usize) -> Option<f64> {
        let values = self.series(field);
        let idx = values.len().checked_sub(offset + 1)?;
        values.get(idx).copied()
    }

    pub fn latest(&self, field: &str) -> Option<f64> {
        self.value_at(field, 0)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// Number of bars, taken from the longest series.
    pub fn len(&self) -> usize {
        self.series.values().map(Vec::len).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reject snapshots with no bars or series of different lengths.
    pub fn validate(&self) -> Result<(), VedaError> {
        if self.is_empty() {
            return Err(VedaError::Data {
                reason: "market data has no bars".into(),
            });
        }
        let expected = self.len();
        let mut fields: Vec<&String> = self.series.keys().collect();
        fields.sort();
        for field in fields {
            let len = self.series[field].len();
            if len != expected {
                return Err(VedaError::Data {
                    reason: format!(
                        "series '{}' has {} values, expected {}",
                        field, len, expected
                    ),
                });
            }
        }
        Ok(())
    }
}
