use std::collections::BTreeMap;

/// Which configuration layer a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayer {
    /// Compiled-in defaults (`defaults.toml`).
    Defaults,
    /// User configuration directory.
    User,
    /// Workspace file passed by the caller.
    Workspace,
    /// Environment variable fallback.
    Environment,
}

impl std::fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Defaults => write!(f, "defaults"),
            Self::User => write!(f, "user (lattice/config.toml)"),
            Self::Workspace => write!(f, "workspace"),
            Self::Environment => write!(f, "environment variable"),
        }
    }
}

/// Layer that set each dotted field path.
pub type FieldSources = BTreeMap<String, ConfigLayer>;
