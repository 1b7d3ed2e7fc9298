//! Prelude module - commonly used types for convenient import.
//!
//! Use `use lattice_wiring::prelude::*;` to import all essential types.

// Errors
pub use crate::{ResolveFailure, WiringError, WiringResult};

// Declarations
pub use crate::{Clause, DynamicPattern, ManifestHeaders, PackageEntry, RequireEntry, UnitPackages};

// Registries
pub use crate::{Capabilities, Capability, CapabilityBatch, PackageResolver, SharedResolver, Unsatisfied};
