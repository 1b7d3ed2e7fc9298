//! Lattice Test - Shared test utilities for the Lattice module runtime.
//!
//! This crate provides in-memory collaborator implementations and test
//! helpers used across the Lattice crates as a dev-dependency.
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! lattice-test.workspace = true
//! ```
//!
//! Then use in your tests:
//!
//! ```rust,ignore
//! #[cfg(test)]
//! mod tests {
//!     use lattice_test::{MemoryArchive, RecordingEventSink};
//!
//!     #[test]
//!     fn installs_from_memory() {
//!         let archive = MemoryArchive::new("mem:provider")
//!             .with_header("Export-Package", "pkg.a;version=1.0")
//!             .with_class("pkg.a.Widget");
//!         // hand `archive` to the framework under test
//!     }
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;
