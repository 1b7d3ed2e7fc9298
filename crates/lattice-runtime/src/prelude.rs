//! Prelude module - commonly used types for convenient import.
//!
//! Use `use lattice_runtime::prelude::*;` to import all essential types.

// Errors
pub use crate::{BoxError, RuntimeError, RuntimeResult};

// Framework
pub use crate::{Framework, FrameworkBuilder, StartOptions, StopOptions, UnitContext};

// Unit code
pub use crate::{Activator, ActivatorFactory, ActivatorRegistry, FnActivator};

// Loading
pub use crate::{ListOptions, LoadStrategy, LoadedClass, ModuleLoader, Resource};

// Events
pub use crate::{BroadcastEventSink, UnitEvent};
