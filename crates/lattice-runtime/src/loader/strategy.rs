//! Pluggable class definition.
//!
//! The loader decides *where* code comes from; a [`LoadStrategy`] decides what
//! a class entry's bytes turn into. Strategies that need referenced classes
//! at definition time (a superclass, an interface) ask the [`Linker`], which
//! resolves through the defining unit's loader within the same call chain.

use std::sync::Arc;

use lattice_core::UnitGeneration;

use crate::error::RuntimeResult;

/// A class defined by some unit's loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedClass {
    name: String,
    owner: UnitGeneration,
    bytes: Arc<[u8]>,
}

impl LoadedClass {
    /// Create a class record.
    #[must_use]
    pub fn new(name: impl Into<String>, owner: UnitGeneration, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            owner,
            bytes: bytes.into(),
        }
    }

    /// Fully qualified class name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declaration set whose loader defined the class.
    #[must_use]
    pub fn owner(&self) -> UnitGeneration {
        self.owner
    }

    /// Raw entry bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Resolves classes referenced while another class is being defined.
pub trait Linker {
    /// Load `name` through the defining unit's loader.
    ///
    /// # Errors
    ///
    /// Propagates the loader's search error.
    fn resolve(&mut self, name: &str) -> RuntimeResult<Arc<LoadedClass>>;
}

/// Turns class entry bytes into a [`LoadedClass`].
pub trait LoadStrategy: Send + Sync {
    /// Define `name` for `owner` from `bytes`.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are unusable or a referenced class
    /// cannot be linked.
    fn define(
        &self,
        owner: UnitGeneration,
        name: &str,
        bytes: Vec<u8>,
        linker: &mut dyn Linker,
    ) -> RuntimeResult<LoadedClass>;

    /// Archive entry name of native library `name`.
    fn library_file_name(&self, name: &str) -> String {
        format!("lib{name}.so")
    }
}

/// Defines classes from their raw bytes without linking anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawBytesStrategy;

impl LoadStrategy for RawBytesStrategy {
    fn define(
        &self,
        owner: UnitGeneration,
        name: &str,
        bytes: Vec<u8>,
        _linker: &mut dyn Linker,
    ) -> RuntimeResult<LoadedClass> {
        Ok(LoadedClass::new(name, owner, bytes))
    }
}

/// Archive path of class `name`.
pub(crate) fn class_entry(name: &str) -> String {
    format!("{}.class", name.replace('.', "/"))
}
