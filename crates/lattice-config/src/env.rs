//! Environment variable fallbacks.
//!
//! Variables are a fallback, not an override: they only apply to fields
//! that no configuration file set.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources};

/// Supported `LATTICE_*` variables and the field each one feeds.
const ENV_MAPPINGS: &[(&str, &str)] = &[
    ("LATTICE_START_LEVEL", "framework.beginning_start_level"),
    ("LATTICE_UNIT_START_LEVEL", "framework.initial_unit_start_level"),
    ("LATTICE_VERSION_FUZZY", "version.fuzzy"),
    ("LATTICE_ENFORCE_PERMISSIONS", "security.enforce_permissions"),
    ("LATTICE_LOG_LEVEL", "logging.level"),
    ("LATTICE_LOG_FORMAT", "logging.format"),
];

/// Snapshot of the `LATTICE_*` variables of this process.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(k, _)| k.starts_with("LATTICE_"))
        .collect()
}

/// Apply fallbacks to fields that only the defaults set.
///
/// Returns the number of variables applied.
///
/// # Errors
///
/// Returns [`ConfigError::EnvError`] if a value does not fit its field's type.
pub fn apply_env_fallbacks<S: std::hash::BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<usize> {
    let mut count: usize = 0;
    for (var_name, field_path) in ENV_MAPPINGS {
        if sources
            .get(*field_path)
            .is_some_and(|layer| *layer != ConfigLayer::Defaults)
        {
            continue;
        }
        let Some(raw) = env_vars.get(*var_name) else {
            continue;
        };
        debug!(var = var_name, field = field_path, "applying env var fallback");
        set_field(merged, field_path, raw).map_err(|message| ConfigError::EnvError {
            var_name: (*var_name).to_owned(),
            message,
        })?;
        sources.insert((*field_path).to_owned(), ConfigLayer::Environment);
        count = count.saturating_add(1);
    }
    Ok(count)
}

/// Set a dotted field, coercing `raw` to the type already in the tree.
fn set_field(root: &mut toml::Value, path: &str, raw: &str) -> Result<(), String> {
    let mut current = root;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let table = current
            .as_table_mut()
            .ok_or_else(|| format!("'{segment}' is not inside a table"))?;
        if segments.peek().is_none() {
            let value = coerce(table.get(segment), raw)?;
            table.insert(segment.to_owned(), value);
            return Ok(());
        }
        current = table
            .entry(segment.to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }
    Err("empty field path".to_owned())
}

fn coerce(existing: Option<&toml::Value>, raw: &str) -> Result<toml::Value, String> {
    let raw = raw.trim();
    match existing {
        Some(toml::Value::Boolean(_)) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(toml::Value::Boolean(true)),
            "0" | "false" | "no" | "off" => Ok(toml::Value::Boolean(false)),
            _ => Err(format!("expected a boolean, got '{raw}'")),
        },
        Some(toml::Value::Integer(_)) => raw
            .parse::<i64>()
            .map(toml::Value::Integer)
            .map_err(|e| format!("expected an integer, got '{raw}': {e}")),
        _ => Ok(toml::Value::String(raw.to_owned())),
    }
}
