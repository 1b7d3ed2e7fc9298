//! Activator contracts.
//!
//! A unit names its activator class in `Bundle-Activator`. The runtime loads
//! that class through the unit's own loader and hands it to the host's
//! [`ActivatorFactory`]; the runtime never executes unit bytes itself.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use lattice_core::UnitId;

use crate::context::UnitContext;
use crate::error::BoxError;
use crate::loader::LoadedClass;

/// Unit code run on start and stop.
pub trait Activator: Send + Sync {
    /// Called while the unit is STARTING. An error rolls the unit back to
    /// RESOLVED.
    ///
    /// # Errors
    ///
    /// Any error the unit code raises.
    fn start(&self, ctx: &UnitContext) -> Result<(), BoxError>;

    /// Called while the unit is STOPPING. Teardown completes even if this
    /// fails.
    ///
    /// # Errors
    ///
    /// Any error the unit code raises.
    fn stop(&self, ctx: &UnitContext) -> Result<(), BoxError>;
}

/// Turns a loaded activator class into an [`Activator`].
pub trait ActivatorFactory: Send + Sync {
    /// Instantiate the activator for `unit`.
    ///
    /// # Errors
    ///
    /// Returns an error if the class cannot be instantiated.
    fn create(&self, unit: UnitId, class: &LoadedClass) -> Result<Box<dyn Activator>, BoxError>;
}

type Hook = Box<dyn Fn(&UnitContext) -> Result<(), BoxError> + Send + Sync>;

/// [`Activator`] built from closures.
pub struct FnActivator {
    start: Hook,
    stop: Hook,
}

impl FnActivator {
    /// An activator whose hooks do nothing.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Box::new(|_| Ok(())),
            stop: Box::new(|_| Ok(())),
        }
    }

    /// Replace the start hook.
    #[must_use]
    pub fn on_start(
        mut self,
        f: impl Fn(&UnitContext) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.start = Box::new(f);
        self
    }

    /// Replace the stop hook.
    #[must_use]
    pub fn on_stop(
        mut self,
        f: impl Fn(&UnitContext) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.stop = Box::new(f);
        self
    }
}

impl Default for FnActivator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FnActivator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnActivator").finish_non_exhaustive()
    }
}

impl Activator for FnActivator {
    fn start(&self, ctx: &UnitContext) -> Result<(), BoxError> {
        (self.start)(ctx)
    }

    fn stop(&self, ctx: &UnitContext) -> Result<(), BoxError> {
        (self.stop)(ctx)
    }
}

type Constructor = Arc<dyn Fn(&LoadedClass) -> Box<dyn Activator> + Send + Sync>;

/// [`ActivatorFactory`] that maps activator class names to constructors.
#[derive(Default)]
pub struct ActivatorRegistry {
    constructors: RwLock<HashMap<String, Constructor>>,
}

impl ActivatorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the constructor used for `class_name`, replacing any
    /// earlier one.
    pub fn register(
        &self,
        class_name: impl Into<String>,
        constructor: impl Fn(&LoadedClass) -> Box<dyn Activator> + Send + Sync + 'static,
    ) {
        self.constructors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(class_name.into(), Arc::new(constructor));
    }

    /// Whether a constructor exists for `class_name`.
    #[must_use]
    pub fn contains(&self, class_name: &str) -> bool {
        self.constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(class_name)
    }
}

impl std::fmt::Debug for ActivatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .constructors
            .read()
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("ActivatorRegistry")
            .field("classes", &names)
            .finish()
    }
}

impl ActivatorFactory for ActivatorRegistry {
    fn create(&self, unit: UnitId, class: &LoadedClass) -> Result<Box<dyn Activator>, BoxError> {
        let constructor = self
            .constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(class.name())
            .cloned()
            .ok_or_else(|| format!("no activator registered for class {} of unit {unit}", class.name()))?;
        Ok(constructor(class))
    }
}
