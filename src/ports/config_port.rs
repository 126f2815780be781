//! Configuration access port trait.
//!
//! Reads are strict: a key that is present but malformed is a
//! `ConfigInvalid` error, never a silent fallback to the default. Absent keys
//! read as `None` and the caller picks the default.

use crate::domain::error::VedaError;
use std::path::PathBuf;

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str) -> Result<Option<i64>, VedaError>;
    fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>, VedaError>;

    /// Every `(section, key)` pair present, sorted.
    fn keys(&self) -> Vec<(String, String)>;

    fn get_path(&self, section: &str, key: &str) -> Option<PathBuf> {
        self.get_string(section, key).map(PathBuf::from)
    }

    /// A non-negative integer such as a step budget or a depth.
    fn get_count(&self, section: &str, key: &str) -> Result<Option<u64>, VedaError> {
        match self.get_int(section, key)? {
            Some(value) if value < 0 => Err(VedaError::ConfigInvalid {
                section: section.to_string(),
                key: key.to_string(),
                reason: format!("{} must be non-negative, got {}", key, value),
            }),
            value => Ok(value.map(|v| v as u64)),
        }
    }
}
