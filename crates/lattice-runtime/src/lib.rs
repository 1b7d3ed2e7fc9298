//! Lattice Runtime - unit lifecycle, module loaders and lazy activation.
//!
//! This crate provides:
//! - [`Framework`]: the unit table with install, resolve, start, stop,
//!   update and uninstall, start levels and introspection
//! - [`ModuleLoader`]: the per-generation delegating class and resource
//!   search (boot delegation, bound imports, required units, local code and
//!   fragments, dynamic imports)
//! - [`SearchContext`]: the per-call-chain accumulator that finishes lazy
//!   activations once the outermost load returns
//! - [`Activator`] / [`ActivatorFactory`]: the seam through which hosts run
//!   unit code
//! - [`BroadcastEventSink`]: lifecycle events on a tokio broadcast channel
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use lattice_core::UnitState;
//! use lattice_runtime::Framework;
//! use lattice_test::MemoryArchive;
//!
//! let fw = Framework::builder().build().unwrap();
//! let provider = fw
//!     .install(Arc::new(
//!         MemoryArchive::new("mem:provider")
//!             .with_header("Export-Package", "pkg.a;version=1.0")
//!             .with_class("pkg.a.Api"),
//!     ))
//!     .unwrap();
//! let consumer = fw
//!     .install(Arc::new(
//!         MemoryArchive::new("mem:consumer").with_header("Import-Package", "pkg.a;version=1.0"),
//!     ))
//!     .unwrap();
//!
//! fw.start(consumer).unwrap();
//! assert_eq!(fw.get_state(consumer).unwrap(), UnitState::Active);
//! assert_eq!(fw.provider_for(consumer, "pkg.a").unwrap().map(|g| g.unit), Some(provider));
//!
//! let class = fw.load_class(consumer, "pkg.a.Api").unwrap();
//! assert_eq!(class.owner().unit, provider);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod activation;
pub mod activator;
pub mod context;
pub mod error;
pub mod events;
pub mod framework;
pub mod lifecycle;
pub mod loader;

mod system;
mod unit;

pub use activation::ActivationPolicy;
pub use activator::{Activator, ActivatorFactory, ActivatorRegistry, FnActivator};
pub use context::UnitContext;
pub use error::{BoxError, RuntimeError, RuntimeResult};
pub use events::{BroadcastEventSink, DEFAULT_CHANNEL_CAPACITY, UnitEvent};
pub use framework::{Framework, FrameworkBuilder};
pub use lifecycle::{StartOptions, StopOptions};
pub use loader::{
    Linker, ListOptions, LoadStrategy, LoadedClass, ModuleLoader, RawBytesStrategy, Resource,
    SearchContext,
};
pub use system::SYSTEM_SYMBOLIC_NAME;
