//! Lattice Core - Foundation types and traits for the Lattice module runtime.
//!
//! This crate provides:
//! - Three-component versions with partially specified fields and version ranges
//! - Unit identifiers, generations and lifecycle states
//! - The narrow collaborator contracts the runtime consumes: [`Archive`],
//!   [`ErrorSink`], [`EventSink`] and [`PermissionCheck`]
//!
//! It has no dependencies on other internal lattice crates.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod archive;
pub mod permission;
pub mod sink;
pub mod types;
pub mod version;

pub use archive::{Archive, ArchiveError, ArchiveResult};
pub use permission::{AllowAll, PermissionAction, PermissionCheck};
pub use sink::{ErrorSink, EventSink, TracingErrorSink, TracingEventSink};
pub use types::{UnitEventKind, UnitGeneration, UnitId, UnitState};
pub use version::{
    Version, VersionMode, VersionParseError, VersionRange, set_version_mode, version_mode,
};
