//! Test fixtures for common types.

use lattice_core::{UnitGeneration, UnitId};

use crate::mocks::MemoryArchive;

/// Generation 0 of unit `id`.
#[must_use]
pub fn test_generation(id: u64) -> UnitGeneration {
    UnitGeneration::new(UnitId(id), 0)
}

/// An archive exporting `pkg` at `version`, with one class `<pkg>.Impl`.
#[must_use]
pub fn exporter(location: &str, pkg: &str, version: &str) -> MemoryArchive {
    MemoryArchive::new(location)
        .with_header("Export-Package", format!("{pkg};version={version}"))
        .with_class(&format!("{pkg}.Impl"))
}

/// An archive importing `pkg` with the given version constraint.
#[must_use]
pub fn importer(location: &str, pkg: &str, version: &str) -> MemoryArchive {
    MemoryArchive::new(location).with_header("Import-Package", format!("{pkg};version=\"{version}\""))
}
