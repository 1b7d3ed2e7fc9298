//! The system unit and boot delegation.

use std::path::PathBuf;
use std::sync::Arc;

use lattice_core::{Archive, ArchiveResult, UnitGeneration};
use lattice_wiring::ManifestHeaders;

use crate::unit::Declarations;

/// Symbolic name of the system unit unless its archive names one.
pub const SYSTEM_SYMBOLIC_NAME: &str = "lattice.system";

/// One `boot_delegation` pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum BootPattern {
    /// `*`
    All,
    /// `java.*` matches `java.` followed by anything.
    Prefix(String),
    Exact(String),
}

impl BootPattern {
    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        Some(if raw == "*" {
            Self::All
        } else if let Some(prefix) = raw.strip_suffix('*') {
            Self::Prefix(prefix.to_owned())
        } else {
            Self::Exact(raw.to_owned())
        })
    }

    fn matches(&self, pkg: &str) -> bool {
        match self {
            Self::All => true,
            Self::Prefix(prefix) => pkg.starts_with(prefix.as_str()),
            Self::Exact(name) => pkg == name,
        }
    }
}

/// Packages every loader sends to the system unit before anything else.
#[derive(Debug, Clone, Default)]
pub(crate) struct BootDelegation {
    patterns: Vec<BootPattern>,
}

impl BootDelegation {
    pub(crate) fn new(patterns: &[String]) -> Self {
        Self {
            patterns: patterns.iter().filter_map(|p| BootPattern::parse(p)).collect(),
        }
    }

    pub(crate) fn matches(&self, pkg: &str) -> bool {
        !pkg.is_empty() && self.patterns.iter().any(|p| p.matches(pkg))
    }
}

/// Declarations of the system unit: the archive's own exports plus the
/// configured `system_packages`.
pub(crate) fn system_declarations(
    owner: UnitGeneration,
    archive: &dyn Archive,
    system_packages: &[String],
) -> Declarations {
    let mut manifest = ManifestHeaders::from_lookup(|h| archive.attribute(h));
    let exports: Vec<String> = manifest
        .exports
        .take()
        .into_iter()
        .chain(system_packages.iter().cloned())
        .filter(|e| !e.trim().is_empty())
        .collect();
    if !exports.is_empty() {
        manifest.exports = Some(exports.join(","));
    }
    if manifest.symbolic_name.is_none() {
        manifest.symbolic_name = Some(SYSTEM_SYMBOLIC_NAME.to_owned());
    }
    let mut decl = Declarations::from_manifest(owner, &manifest, archive);
    decl.activator_class = None;
    decl.fragment_host = None;
    decl
}

/// Backing archive of a system unit built without one.
#[derive(Debug)]
struct SystemArchive;

impl Archive for SystemArchive {
    fn location(&self) -> &str {
        "system"
    }

    fn attribute(&self, _name: &str) -> Option<String> {
        None
    }

    fn read_entry(&self, _path: &str) -> Option<Vec<u8>> {
        None
    }

    fn entry_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn native_library(&self, _name: &str) -> Option<PathBuf> {
        None
    }

    fn persist(&self, _persistent_start: bool) -> ArchiveResult<()> {
        Ok(())
    }

    fn persistent_start(&self) -> bool {
        true
    }

    fn start_level(&self) -> Option<u32> {
        Some(0)
    }

    fn set_start_level(&self, _level: u32) -> ArchiveResult<()> {
        Ok(())
    }

    fn purge(&self) -> ArchiveResult<()> {
        Ok(())
    }
}

pub(crate) fn empty_archive() -> Arc<dyn Archive> {
    Arc::new(SystemArchive)
}

#[cfg(test)]
mod tests {
    use lattice_core::UnitId;
    use lattice_test::MemoryArchive;

    use super::*;

    #[test]
    fn boot_patterns() {
        let boot = BootDelegation::new(&[
            "java.*".to_owned(),
            "sun.misc".to_owned(),
            " ".to_owned(),
        ]);
        assert!(boot.matches("java.lang"));
        assert!(boot.matches("java.util.concurrent"));
        assert!(boot.matches("sun.misc"));
        assert!(!boot.matches("sun.misc.impl"));
        assert!(!boot.matches("javax.net"));
        assert!(!boot.matches(""));
        assert!(BootDelegation::new(&["*".to_owned()]).matches("anything"));
    }

    #[test]
    fn system_exports_merge_archive_and_config() {
        let archive = MemoryArchive::new("system")
            .with_header("Export-Package", "lattice.api;version=1.0")
            .with_header("Bundle-Activator", "ignored.Activator");
        let decl = system_declarations(
            UnitGeneration::new(UnitId::SYSTEM, 0),
            &archive,
            &["host.services;version=2.1".to_owned()],
        );
        assert!(decl.packages.is_exported("lattice.api"));
        assert!(decl.packages.is_exported("host.services"));
        assert_eq!(decl.packages.symbolic_name(), Some(SYSTEM_SYMBOLIC_NAME));
        assert!(decl.activator_class.is_none());
    }
}
