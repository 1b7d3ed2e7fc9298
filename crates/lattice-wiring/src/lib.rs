//! Lattice Wiring - package declarations and the global wiring registry.
//!
//! This crate provides:
//! - Manifest clause parsing (`name;attr=value;directive:=value`)
//! - [`PackageEntry`]: one declared export or import
//! - [`UnitPackages`]: the export/import/dynamic-import declaration set of one
//!   unit generation together with its resolution result
//! - [`PackageResolver`]: the global `Pkg` table that binds imports to
//!   providers, guarded by [`SharedResolver`]
//! - [`Capabilities`]: a generic namespace to capability-list registry
//!
//! # Locking
//!
//! [`SharedResolver`] is the process-wide resolution lock. Code that needs
//! both the resolver and a unit's own state must take the resolver first.
//!
//! # Example
//!
//! ```
//! use lattice_core::{AllowAll, UnitGeneration, UnitId};
//! use lattice_wiring::{ManifestHeaders, SharedResolver, UnitPackages};
//!
//! let resolver = SharedResolver::new();
//! let provider = UnitGeneration::new(UnitId(1), 0);
//! let consumer = UnitGeneration::new(UnitId(2), 0);
//!
//! let exports = UnitPackages::parse(
//!     provider,
//!     &ManifestHeaders::default().with_exports("pkg.a;version=1.0"),
//! );
//! let mut imports = UnitPackages::parse(
//!     consumer,
//!     &ManifestHeaders::default().with_imports("pkg.a;version=1.0"),
//! );
//!
//! let mut table = resolver.write().unwrap();
//! exports.register(&mut table, &AllowAll);
//! imports.register(&mut table, &AllowAll);
//! imports.resolve(&mut table, &AllowAll).unwrap();
//! assert_eq!(imports.provider_for("pkg.a", &mut table, &AllowAll), Some(provider));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod capabilities;
pub mod entry;
pub mod error;
pub mod manifest;
pub mod resolver;
pub mod unit_packages;

pub use capabilities::{Capabilities, Capability, CapabilityBatch, capabilities_from_header};
pub use entry::{EntryKind, PackageEntry, RequireEntry};
pub use error::{ResolveFailure, WiringError, WiringResult};
pub use manifest::{Clause, ManifestHeaders, headers, parse_header};
pub use resolver::{PackageResolver, Pkg, SharedResolver, Unsatisfied};
pub use unit_packages::{DynamicPattern, UnitPackages};
