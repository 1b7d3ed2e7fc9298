//! Declared exports, imports and unit requirements.

use std::cmp::Ordering;
use std::fmt;

use lattice_core::{UnitGeneration, Version, VersionRange};

/// Whether an entry offers or consumes a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// The owning unit offers the package at `version`.
    Export {
        /// Offered version.
        version: Version,
    },
    /// The owning unit needs the package within `range`.
    Import {
        /// Acceptable provider versions.
        range: VersionRange,
        /// An unsatisfied optional import does not fail resolution.
        optional: bool,
    },
}

/// One declared export or import.
///
/// The owner is a [`UnitGeneration`] handle, never an owning pointer; the
/// provider an import is bound to is looked up through the resolver's
/// `Pkg` node for the entry's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageEntry {
    name: String,
    owner: UnitGeneration,
    kind: EntryKind,
}

impl PackageEntry {
    /// An export of `name` at `version`.
    #[must_use]
    pub fn export(name: impl Into<String>, version: Version, owner: UnitGeneration) -> Self {
        Self {
            name: name.into(),
            owner,
            kind: EntryKind::Export { version },
        }
    }

    /// A mandatory import of `name` within `range`.
    #[must_use]
    pub fn import(name: impl Into<String>, range: VersionRange, owner: UnitGeneration) -> Self {
        Self {
            name: name.into(),
            owner,
            kind: EntryKind::Import {
                range,
                optional: false,
            },
        }
    }

    /// Mark an import optional. No effect on exports.
    #[must_use]
    pub fn optional(mut self) -> Self {
        if let EntryKind::Import { optional, .. } = &mut self.kind {
            *optional = true;
        }
        self
    }

    /// Package name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declaring unit generation.
    #[must_use]
    pub fn owner(&self) -> UnitGeneration {
        self.owner
    }

    /// Export or import details.
    #[must_use]
    pub fn kind(&self) -> &EntryKind {
        &self.kind
    }

    /// Whether this is an export.
    #[must_use]
    pub fn is_export(&self) -> bool {
        matches!(self.kind, EntryKind::Export { .. })
    }

    /// Whether this is an optional import.
    #[must_use]
    pub fn is_optional(&self) -> bool {
        matches!(self.kind, EntryKind::Import { optional: true, .. })
    }

    /// The export version, or the lower bound of an import's range.
    #[must_use]
    pub fn version(&self) -> &Version {
        match &self.kind {
            EntryKind::Export { version } => version,
            EntryKind::Import { range, .. } => range.low(),
        }
    }

    /// The import range; `None` for exports.
    #[must_use]
    pub fn range(&self) -> Option<&VersionRange> {
        match &self.kind {
            EntryKind::Export { .. } => None,
            EntryKind::Import { range, .. } => Some(range),
        }
    }

    /// Same package name.
    #[must_use]
    pub fn package_equal(&self, other: &Self) -> bool {
        self.name == other.name
    }

    /// Whether this import accepts `export` as its provider.
    #[must_use]
    pub fn is_satisfied_by(&self, export: &Self) -> bool {
        match (&self.kind, &export.kind) {
            (EntryKind::Import { range, .. }, EntryKind::Export { version }) => {
                self.name == export.name && range.contains(version)
            },
            _ => false,
        }
    }

    /// Duplicate-declaration rule: a later declaration wins unless an
    /// earlier one has a strictly higher version.
    #[must_use]
    pub fn supersedes(&self, earlier: &Self) -> bool {
        self.version().compare(earlier.version()) != Ordering::Less
    }
}

impl fmt::Display for PackageEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            EntryKind::Export { version } if version.is_empty() => f.write_str(&self.name),
            EntryKind::Export { version } => write!(f, "{};version={version}", self.name),
            EntryKind::Import { range, .. } if range.is_any() => f.write_str(&self.name),
            EntryKind::Import { range, .. } => write!(f, "{};version={range}", self.name),
        }
    }
}

/// A whole-unit dependency (`Require-Bundle` clause).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequireEntry {
    /// Symbolic name of the required unit.
    pub name: String,
    /// Acceptable versions of the required unit.
    pub range: VersionRange,
    /// Whether the required unit's packages are visible to units that
    /// require the declaring unit.
    pub reexport: bool,
    /// An unsatisfied optional requirement does not fail resolution.
    pub optional: bool,
}

impl RequireEntry {
    /// A mandatory, private requirement.
    #[must_use]
    pub fn new(name: impl Into<String>, range: VersionRange) -> Self {
        Self {
            name: name.into(),
            range,
            reexport: false,
            optional: false,
        }
    }
}

impl fmt::Display for RequireEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.range.is_any() {
            f.write_str(&self.name)
        } else {
            write!(f, "{};bundle-version={}", self.name, self.range)
        }
    }
}
