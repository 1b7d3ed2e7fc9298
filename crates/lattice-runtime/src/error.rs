//! Error types for the runtime.

use lattice_core::{ArchiveError, PermissionAction, UnitId, UnitState};
use lattice_wiring::{ResolveFailure, WiringError};
use thiserror::Error;

/// Boxed error raised by unit code (activators, factories, load strategies).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in the runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A manifest clause was malformed and dropped.
    #[error("unit {unit}: {source}")]
    Declaration {
        /// Declaring unit.
        unit: UnitId,
        /// Parse error.
        #[source]
        source: WiringError,
    },

    /// Imports could not be bound.
    #[error("unit {unit} cannot resolve: {failure}")]
    Resolution {
        /// Unit that failed.
        unit: UnitId,
        /// Every offending name.
        #[source]
        failure: ResolveFailure,
    },

    /// The operation is not valid in the unit's current state.
    #[error("cannot {operation} unit {unit} in state {state}")]
    StateViolation {
        /// Target unit.
        unit: UnitId,
        /// State observed.
        state: UnitState,
        /// Rejected operation.
        operation: &'static str,
    },

    /// Unit code failed while starting or stopping.
    #[error("activator of unit {unit} failed: {source}")]
    Activation {
        /// Unit whose activator failed.
        unit: UnitId,
        /// Original cause.
        #[source]
        source: BoxError,
    },

    /// Class search exhausted every step.
    #[error("class {name} not found from unit {unit}")]
    ClassNotFound {
        /// Searching unit.
        unit: UnitId,
        /// Class name.
        name: String,
    },

    /// Resource search exhausted every step.
    #[error("resource {path} not found from unit {unit}")]
    ResourceNotFound {
        /// Searching unit.
        unit: UnitId,
        /// Resource path.
        path: String,
    },

    /// The permission check refused an action.
    #[error("unit {unit} may not {action} {target}")]
    PermissionDenied {
        /// Acting unit.
        unit: UnitId,
        /// Refused action.
        action: PermissionAction,
        /// Action target.
        target: String,
    },

    /// No unit has this id.
    #[error("unknown unit {0}")]
    UnknownUnit(UnitId),

    /// A caller-supplied value was unusable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The unit context was used after its unit stopped.
    #[error("context of unit {0} is no longer valid")]
    ContextInvalid(UnitId),

    /// Archive collaborator failure.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Wiring layer failure.
    #[error(transparent)]
    Wiring(#[from] WiringError),

    /// Internal-consistency violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RuntimeError {
    /// Whether this is an expected search miss.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ClassNotFound { .. } | Self::ResourceNotFound { .. }
        )
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
