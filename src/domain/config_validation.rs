//! Configuration validation.
//!
//! Validates every config field the CLI reads before a script runs. Missing
//! keys are fine (defaults apply); present keys must be well-formed.

use crate::domain::error::VedaError;
use crate::ports::config_port::ConfigPort;

pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Every `(section, key)` the CLI reads.
pub const KNOWN_KEYS: [(&str, &str); 8] = [
    ("data", "dir"),
    ("data", "symbol"),
    ("interpreter", "max_call_depth"),
    ("interpreter", "max_steps"),
    ("logging", "level"),
    ("output", "print_globals"),
    ("output", "trades"),
    ("script", "path"),
];

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), VedaError> {
    config.get_count("interpreter", "max_steps")?;
    validate_max_call_depth(config)?;
    config.get_bool("output", "print_globals")?;
    validate_symbol(config)?;
    validate_log_level(config)?;
    Ok(())
}

/// Keys present in the file that nothing reads, as `[section] key`. Usually
/// a typo, so the CLI warns rather than fails.
pub fn unknown_keys(config: &dyn ConfigPort) -> Vec<String> {
    config
        .keys()
        .into_iter()
        .filter(|(section, key)| {
            !KNOWN_KEYS.contains(&(section.as_str(), key.as_str()))
        })
        .map(|(section, key)| format!("[{}] {}", section, key))
        .collect()
}

fn invalid(section: &str, key: &str, reason: &str) -> VedaError {
    VedaError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_max_call_depth(config: &dyn ConfigPort) -> Result<(), VedaError> {
    if config.get_count("interpreter", "max_call_depth")? == Some(0) {
        return Err(invalid(
            "interpreter",
            "max_call_depth",
            "max_call_depth must be positive",
        ));
    }
    Ok(())
}

fn validate_symbol(config: &dyn ConfigPort) -> Result<(), VedaError> {
    let Some(symbol) = config.get_string("data", "symbol") else {
        return Ok(());
    };
    if symbol.is_empty() {
        return Err(invalid("data", "symbol", "symbol must not be empty"));
    }
    if symbol.contains(['/', '\\']) || symbol.starts_with('.') {
        return Err(invalid("data", "symbol", "symbol must be a plain file stem"));
    }
    Ok(())
}

fn validate_log_level(config: &dyn ConfigPort) -> Result<(), VedaError> {
    let Some(level) = config.get_string("logging", "level") else {
        return Ok(());
    };
    if !LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
        return Err(invalid(
            "logging",
            "level",
            "level must be one of trace, debug, info, warn, error",
        ));
    }
    Ok(())
}
