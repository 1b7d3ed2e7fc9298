//! Wiring error types.

use lattice_core::VersionParseError;
use thiserror::Error;

/// Errors raised while declaring or wiring packages.
#[derive(Debug, Clone, Error)]
pub enum WiringError {
    /// A manifest clause could not be parsed; the clause is dropped.
    #[error("invalid {header} clause '{clause}': {message}")]
    InvalidClause {
        /// Manifest header the clause came from.
        header: String,
        /// The offending clause text.
        clause: String,
        /// What is wrong with it.
        message: String,
    },

    /// A version attribute could not be parsed; the clause is dropped.
    #[error("invalid version for '{package}' in {header}: {source}")]
    InvalidVersion {
        /// Manifest header the clause came from.
        header: String,
        /// Package or unit name the version belongs to.
        package: String,
        /// Underlying parse error.
        #[source]
        source: VersionParseError,
    },

    /// The caller tried to remove capabilities it never added.
    #[error("capability registry inconsistency in namespace '{namespace}': {message}")]
    CapabilityInconsistency {
        /// Namespace of the failed removal.
        namespace: String,
        /// What was missing.
        message: String,
    },

    /// The resolution lock was poisoned by a panicking holder.
    #[error("resolver lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Result type for wiring operations.
pub type WiringResult<T> = Result<T, WiringError>;

/// Why a unit failed to resolve.
///
/// Carries every offending name, not just the first one found.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct ResolveFailure {
    /// Human-readable reason.
    pub reason: String,
    /// Offending package (or required unit) names in encounter order.
    pub missing: Vec<String>,
}

impl ResolveFailure {
    /// Creates a failure from a reason and the offending names.
    #[must_use]
    pub fn new(reason: impl Into<String>, missing: Vec<String>) -> Self {
        Self {
            reason: reason.into(),
            missing,
        }
    }

    /// Whether `name` is among the offending names.
    #[must_use]
    pub fn mentions(&self, name: &str) -> bool {
        self.missing.iter().any(|m| m == name)
    }
}
