//! Unit identity and lifecycle state types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Framework-assigned unit identifier. Never reused within one framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub u64);

impl UnitId {
    /// The framework's own unit.
    pub const SYSTEM: Self = Self(0);

    /// Whether this is the system unit.
    #[must_use]
    pub fn is_system(self) -> bool {
        self == Self::SYSTEM
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One declaration set of a unit.
///
/// The generation is bumped every time the unit is updated, so a retired
/// ("zombie") declaration set and its replacement are distinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitGeneration {
    /// Owning unit.
    pub unit: UnitId,
    /// Declaration-set counter, starting at 0 on install.
    pub generation: u32,
}

impl UnitGeneration {
    /// Creates a generation handle.
    #[must_use]
    pub const fn new(unit: UnitId, generation: u32) -> Self {
        Self { unit, generation }
    }
}

impl fmt::Display for UnitGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.unit, self.generation)
    }
}

/// Lifecycle state of a unit. `Uninstalled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitState {
    /// Installed, imports not yet bound.
    Installed,
    /// Imports bound; not running.
    Resolved,
    /// Activator start in progress.
    Starting,
    /// Running.
    Active,
    /// Activator stop in progress.
    Stopping,
    /// Removed from the framework.
    Uninstalled,
}

impl UnitState {
    /// Compact encoding for lock-free fast-path reads.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Installed => 0,
            Self::Resolved => 1,
            Self::Starting => 2,
            Self::Active => 3,
            Self::Stopping => 4,
            Self::Uninstalled => 5,
        }
    }

    /// Inverse of [`UnitState::as_u8`]; unknown values decode as `Uninstalled`.
    #[must_use]
    pub const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Installed,
            1 => Self::Resolved,
            2 => Self::Starting,
            3 => Self::Active,
            4 => Self::Stopping,
            _ => Self::Uninstalled,
        }
    }

    /// Whether the unit's imports are bound in this state.
    #[must_use]
    pub fn is_resolved(self) -> bool {
        matches!(
            self,
            Self::Resolved | Self::Starting | Self::Active | Self::Stopping
        )
    }

    /// Whether an activator call is in flight.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Starting | Self::Stopping)
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Installed => "INSTALLED",
            Self::Resolved => "RESOLVED",
            Self::Starting => "STARTING",
            Self::Active => "ACTIVE",
            Self::Stopping => "STOPPING",
            Self::Uninstalled => "UNINSTALLED",
        };
        f.write_str(s)
    }
}

/// Kind of lifecycle change reported to an [`EventSink`](crate::EventSink).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitEventKind {
    /// Unit was installed.
    Installed,
    /// Imports were bound.
    Resolved,
    /// Activation started.
    Starting,
    /// Activation finished.
    Started,
    /// Lazy activation armed; waiting for a trigger class load.
    LazyActivation,
    /// Deactivation started.
    Stopping,
    /// Deactivation finished.
    Stopped,
    /// Declarations were replaced.
    Updated,
    /// Bindings were dropped.
    Unresolved,
    /// Unit was removed.
    Uninstalled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_encoding_roundtrips() {
        for s in [
            UnitState::Installed,
            UnitState::Resolved,
            UnitState::Starting,
            UnitState::Active,
            UnitState::Stopping,
            UnitState::Uninstalled,
        ] {
            assert_eq!(UnitState::from_u8(s.as_u8()), s);
        }
    }

    #[test]
    fn resolved_states() {
        assert!(!UnitState::Installed.is_resolved());
        assert!(UnitState::Active.is_resolved());
        assert!(!UnitState::Uninstalled.is_resolved());
        assert!(UnitState::Stopping.is_transient());
    }

    #[test]
    fn display_forms() {
        assert_eq!(UnitState::Starting.to_string(), "STARTING");
        assert_eq!(UnitGeneration::new(UnitId(4), 2).to_string(), "#4.2");
        assert!(UnitId::SYSTEM.is_system());
    }
}
