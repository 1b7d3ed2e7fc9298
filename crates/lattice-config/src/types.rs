use serde::{Deserialize, Serialize};

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Unit table and start-level settings.
    pub framework: FrameworkSection,
    /// Version comparison.
    pub version: VersionSection,
    /// Permission enforcement.
    pub security: SecuritySection,
    /// Log output.
    pub logging: LoggingSection,
}

/// `[framework]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkSection {
    /// Framework start level reached at startup.
    pub beginning_start_level: u32,
    /// Start level assigned to newly installed units.
    pub initial_unit_start_level: u32,
    /// `name;version=V` clauses exported by the system unit.
    pub system_packages: Vec<String>,
    /// Package patterns always served by the system unit first.
    pub boot_delegation: Vec<String>,
    /// Retry retired declaration sets whenever a unit unwires.
    pub purge_zombies_on_unwire: bool,
}

impl Default for FrameworkSection {
    fn default() -> Self {
        Self {
            beginning_start_level: 1,
            initial_unit_start_level: 1,
            system_packages: Vec::new(),
            boot_delegation: vec!["java.*".to_owned()],
            purge_zombies_on_unwire: true,
        }
    }
}

/// `[version]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionSection {
    /// Treat unspecified version fields as 0 (`false` compares them as -1).
    pub fuzzy: bool,
}

impl Default for VersionSection {
    fn default() -> Self {
        Self { fuzzy: true }
    }
}

/// `[security]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySection {
    /// Consult the configured permission check. When off, everything is allowed.
    pub enforce_permissions: bool,
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Base level.
    pub level: String,
    /// `pretty`, `compact`, `json` or `full`.
    pub format: String,
    /// Per-target overrides.
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}
