//! Prelude module - commonly used test utilities.
//!
//! Use `use lattice_test::prelude::*;` to import the mocks and fixtures.

pub use crate::{
    DenyList, DirArchive, MemoryArchive, RecordingErrorSink, RecordingEventSink, exporter,
    importer, init_tracing, test_generation,
};
