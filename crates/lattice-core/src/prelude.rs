//! Prelude module - commonly used types for convenient import.
//!
//! Use `use lattice_core::prelude::*;` to import all essential types.

// Versions
pub use crate::{Version, VersionMode, VersionParseError, VersionRange};

// Identity and state
pub use crate::{UnitEventKind, UnitGeneration, UnitId, UnitState};

// Collaborators
pub use crate::{Archive, ArchiveError, ArchiveResult};
pub use crate::{AllowAll, PermissionAction, PermissionCheck};
pub use crate::{ErrorSink, EventSink, TracingErrorSink, TracingEventSink};
