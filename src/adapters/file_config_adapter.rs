//! INI configuration adapter over `configparser`.
//!
//! Section and key names are case-insensitive. Values are trimmed.

use crate::domain::error::VedaError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    ini: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, VedaError> {
        let path = path.as_ref();
        let mut ini = Ini::new();
        ini.load(path).map_err(|reason| VedaError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { ini })
    }

    pub fn from_string(content: &str) -> Result<Self, VedaError> {
        let mut ini = Ini::new();
        ini.read(content.to_string())
            .map_err(|reason| VedaError::ConfigParse {
                file: "<inline>".to_string(),
                reason,
            })?;
        Ok(Self { ini })
    }
}

fn invalid(section: &str, key: &str, expected: &str, reason: String) -> VedaError {
    VedaError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: format!("expected {}: {}", expected, reason),
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.ini.get(section, key).map(|value| value.trim().to_string())
    }

    fn get_int(&self, section: &str, key: &str) -> Result<Option<i64>, VedaError> {
        self.ini
            .getint(section, key)
            .map_err(|e| invalid(section, key, "an integer", e))
    }

    fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>, VedaError> {
        self.ini
            .getboolcoerce(section, key)
            .map_err(|e| invalid(section, key, "a boolean", e))
    }

    fn keys(&self) -> Vec<(String, String)> {
        let mut keys: Vec<(String, String)> = self
            .ini
            .get_map_ref()
            .iter()
            .flat_map(|(section, entries)| {
                entries
                    .keys()
                    .map(move |key| (section.clone(), key.clone()))
            })
            .collect();
        keys.sort();
        keys
    }
}
