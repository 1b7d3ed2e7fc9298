//! The handle an activator uses to reach the framework.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use lattice_core::UnitId;
use tracing::debug;

use crate::error::{RuntimeError, RuntimeResult};
use crate::framework::{Framework, FrameworkInner};
use crate::loader::{LoadedClass, Resource};

type Release = Box<dyn FnOnce() + Send>;

/// Per-activation context of a unit.
///
/// Valid from the moment the unit starts STARTING until it leaves ACTIVE.
/// Anything the unit registers through [`on_release`](Self::on_release)
/// is released when the context is invalidated.
pub struct UnitContext {
    unit: UnitId,
    framework: Weak<FrameworkInner>,
    valid: AtomicBool,
    releases: Mutex<Vec<Release>>,
}

impl UnitContext {
    pub(crate) fn new(unit: UnitId, framework: Weak<FrameworkInner>) -> Self {
        Self {
            unit,
            framework,
            valid: AtomicBool::new(true),
            releases: Mutex::new(Vec::new()),
        }
    }

    /// The unit this context belongs to.
    #[must_use]
    pub fn unit(&self) -> UnitId {
        self.unit
    }

    /// Whether the unit is still starting or active.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// The owning framework, acting on behalf of this unit.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ContextInvalid`] after invalidation or once
    /// the framework is gone.
    pub fn framework(&self) -> RuntimeResult<Framework> {
        if !self.is_valid() {
            return Err(RuntimeError::ContextInvalid(self.unit));
        }
        self.framework
            .upgrade()
            .map(|inner| Framework::from_inner(inner).acting_as(self.unit))
            .ok_or(RuntimeError::ContextInvalid(self.unit))
    }

    /// Load a class through the unit's own loader.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ContextInvalid`] after invalidation, otherwise
    /// whatever the search returns.
    pub fn load_class(&self, name: &str) -> RuntimeResult<Arc<LoadedClass>> {
        self.framework()?.load_class(self.unit, name)
    }

    /// Find a resource through the unit's own loader.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ContextInvalid`] after invalidation, otherwise
    /// whatever the search returns.
    pub fn find_resource(&self, path: &str) -> RuntimeResult<Resource> {
        self.framework()?.find_resource(self.unit, path)
    }

    /// Run `release` when the unit stops (or fails to start).
    ///
    /// Called immediately if the context is already invalid.
    pub fn on_release(&self, release: impl FnOnce() + Send + 'static) {
        // Validity is only flipped under this lock.
        let mut releases = self.releases.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_valid() {
            releases.push(Box::new(release));
            return;
        }
        drop(releases);
        release();
    }

    /// Mark the context invalid and run every release hook, newest first.
    pub(crate) fn invalidate(&self) {
        let releases = {
            let mut pending = self.releases.lock().unwrap_or_else(PoisonError::into_inner);
            if !self.valid.swap(false, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *pending)
        };
        debug!(unit_id = %self.unit, count = releases.len(), "Releasing unit resources");
        for release in releases.into_iter().rev() {
            release();
        }
    }
}

impl std::fmt::Debug for UnitContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitContext")
            .field("unit", &self.unit)
            .field("valid", &self.is_valid())
            .finish_non_exhaustive()
    }
}
