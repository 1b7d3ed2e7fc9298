//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];
const LOG_FORMATS: &[&str] = &["pretty", "compact", "json", "full"];

/// Validate a merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_framework(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_framework(config: &Config) -> ConfigResult<()> {
    let f = &config.framework;
    if f.beginning_start_level == 0 {
        return Err(invalid("framework.beginning_start_level", "start levels begin at 1"));
    }
    if f.initial_unit_start_level == 0 {
        return Err(invalid("framework.initial_unit_start_level", "start levels begin at 1"));
    }
    for pattern in &f.boot_delegation {
        check_package_pattern(pattern)
            .map_err(|m| invalid("framework.boot_delegation", format!("'{pattern}': {m}")))?;
    }
    if f.system_packages.iter().any(|p| p.trim().is_empty()) {
        return Err(invalid("framework.system_packages", "empty package clause"));
    }
    Ok(())
}

/// `*`, `prefix.*` or a plain package name.
fn check_package_pattern(pattern: &str) -> Result<(), &'static str> {
    if pattern == "*" {
        return Ok(());
    }
    let stem = pattern.strip_suffix(".*").unwrap_or(pattern);
    if stem.is_empty() {
        return Err("empty pattern");
    }
    if stem.contains('*') {
        return Err("wildcard is only allowed as a trailing '.*'");
    }
    if stem.ends_with('.') {
        return Err("pattern must not end with a dot");
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;
    if !LOG_LEVELS.contains(&l.level.to_ascii_lowercase().as_str()) {
        return Err(invalid(
            "logging.level",
            format!("unknown level '{}'; expected one of: {}", l.level, LOG_LEVELS.join(", ")),
        ));
    }
    if !LOG_FORMATS.contains(&l.format.as_str()) {
        return Err(invalid(
            "logging.format",
            format!("unknown format '{}'; expected one of: {}", l.format, LOG_FORMATS.join(", ")),
        ));
    }
    Ok(())
}
