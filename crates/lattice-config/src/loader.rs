//! Config file discovery and layered loading.
//!
//! 1. Parse `defaults.toml` as the base
//! 2. Merge the user file (`<config dir>/lattice/config.toml`)
//! 3. Merge the workspace file, if one was given
//! 4. Apply `LATTICE_*` fallbacks for fields no file set
//! 5. Deserialize and validate

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_fallbacks, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, deep_merge, deep_merge_tracking, record_layer};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum accepted config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: usize = 1_048_576;

/// A loaded configuration plus where its values came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The validated configuration.
    pub config: Config,
    /// Layer that set each dotted field.
    pub field_sources: FieldSources,
    /// Files that contributed, lowest precedence first.
    pub loaded_files: Vec<String>,
}

impl ResolvedConfig {
    /// Layer that set `field`, if known.
    #[must_use]
    pub fn source_of(&self, field: &str) -> Option<ConfigLayer> {
        self.field_sources.get(field).copied()
    }
}

/// Load with layered precedence.
///
/// `config_dir_override` replaces the platform configuration directory; the
/// user file is then `<override>/config.toml`.
///
/// # Errors
///
/// Returns a [`ConfigError`] if a file is malformed, an environment value
/// does not fit its field, or the merged configuration fails validation.
pub fn load(
    workspace_file: Option<&Path>,
    config_dir_override: Option<&Path>,
) -> ConfigResult<ResolvedConfig> {
    let mut merged = parse_defaults()?;
    let mut sources = FieldSources::new();
    let mut loaded_files = Vec::new();
    record_layer(&merged, "", ConfigLayer::Defaults, &mut sources);

    let user_path = match config_dir_override {
        Some(dir) => dir.join("config.toml"),
        None => user_config_dir()?.join("config.toml"),
    };
    if let Some(overlay) = try_load_file(&user_path)? {
        deep_merge_tracking(&mut merged, &overlay, ConfigLayer::User, &mut sources);
        loaded_files.push(user_path.display().to_string());
        info!(path = %user_path.display(), "loaded user config");
    }

    if let Some(path) = workspace_file {
        if let Some(overlay) = try_load_file(path)? {
            deep_merge_tracking(&mut merged, &overlay, ConfigLayer::Workspace, &mut sources);
            loaded_files.push(path.display().to_string());
            info!(path = %path.display(), "loaded workspace config");
        }
    }

    let applied = apply_env_fallbacks(&mut merged, &mut sources, &collect_env_vars())?;
    if applied > 0 {
        debug!(count = applied, "applied environment variable fallbacks");
    }

    let config = into_config(merged, "<merged config>")?;
    validate::validate(&config)?;
    Ok(ResolvedConfig {
        config,
        field_sources: sources,
        loaded_files,
    })
}

/// Load one file over the embedded defaults.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file is missing, malformed or invalid.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let overlay = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
        path: path.display().to_string(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    })?;
    let mut merged = parse_defaults()?;
    deep_merge(&mut merged, &overlay);
    let config = into_config(merged, &path.display().to_string())?;
    validate::validate(&config)?;
    Ok(config)
}

fn parse_defaults() -> ConfigResult<toml::Value> {
    toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
        path: "<embedded defaults>".to_owned(),
        source: e,
    })
}

fn into_config(merged: toml::Value, label: &str) -> ConfigResult<Config> {
    merged
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: label.to_owned(),
            source: e,
        })
}

/// `None` if the file does not exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };
    if content.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len()
            ),
        });
    }
    toml::from_str(&content)
        .map(Some)
        .map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })
}

fn user_config_dir() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.config_dir().join("lattice"))
        .ok_or(ConfigError::NoHomeDir)
}
