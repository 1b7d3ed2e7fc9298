#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Layered configuration for the Lattice module runtime.
//!
//! # Usage
//!
//! ```rust,no_run
//! use lattice_config::Config;
//!
//! // defaults -> user -> workspace file -> env fallbacks
//! let resolved = Config::load(Some(std::path::Path::new("lattice.toml"))).unwrap();
//! println!("start level: {}", resolved.config.framework.beginning_start_level);
//! ```
//!
//! # Configuration Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **Workspace** file passed by the caller
//! 2. **User** (`<config dir>/lattice/config.toml`)
//! 3. **Environment variables** (`LATTICE_*`), applied only to fields no file set
//! 4. **Embedded defaults** (`defaults.toml` compiled into the binary)
//!
//! This crate has no dependencies on other Lattice crates. The runtime and
//! telemetry crates convert its sections into their own types.

/// Environment variable fallbacks.
pub mod env;
/// Configuration error types.
pub mod error;
/// File discovery and layered loading.
pub mod loader;
/// TOML tree merging.
pub mod merge;
/// Configuration struct definitions.
pub mod types;
/// Post-merge validation.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::ResolvedConfig;
pub use merge::ConfigLayer;
pub use types::*;

impl Config {
    /// Load with the full precedence chain.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a file is malformed or the merged
    /// configuration fails validation.
    pub fn load(workspace_file: Option<&std::path::Path>) -> ConfigResult<ResolvedConfig> {
        loader::load(workspace_file, None)
    }

    /// Load with an explicit user configuration directory.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a file is malformed or the merged
    /// configuration fails validation.
    pub fn load_with_config_dir(
        workspace_file: Option<&std::path::Path>,
        config_dir: &std::path::Path,
    ) -> ConfigResult<ResolvedConfig> {
        loader::load(workspace_file, Some(config_dir))
    }

    /// Load a single file over the embedded defaults, without other layers.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or
    /// fails validation.
    pub fn load_file(path: &std::path::Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }
}
