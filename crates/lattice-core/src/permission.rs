//! Pluggable permission predicate.
//!
//! The runtime consults a [`PermissionCheck`] before registering exports and
//! imports, binding dynamic imports and running administrative operations.
//! It never decides policy itself.

use std::fmt;

use crate::types::UnitId;

/// What a unit is asking to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionAction {
    /// Offer a package to other units.
    ExportPackage,
    /// Bind to a package offered by another unit.
    ImportPackage,
    /// Depend on another unit as a whole.
    RequireUnit,
    /// Start, stop, update or uninstall the target unit.
    Lifecycle,
    /// Run the unit's activator.
    Execute,
    /// Read resources of the target unit.
    Resource,
}

impl fmt::Display for PermissionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ExportPackage => "export",
            Self::ImportPackage => "import",
            Self::RequireUnit => "require",
            Self::Lifecycle => "lifecycle",
            Self::Execute => "execute",
            Self::Resource => "resource",
        };
        f.write_str(s)
    }
}

/// Decides whether `unit` may perform `action` on `target`.
pub trait PermissionCheck: Send + Sync {
    /// `true` if the action is allowed.
    fn allows(&self, unit: UnitId, action: PermissionAction, target: &str) -> bool;
}

/// Always-allow permission check (no security enforcement).
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionCheck for AllowAll {
    fn allows(&self, _unit: UnitId, _action: PermissionAction, _target: &str) -> bool {
        true
    }
}
