//! Per-unit state.
//!
//! Lock order, outermost first:
//! 1. the unit's transition gate (held for a whole lifecycle operation,
//!    including activator calls)
//! 2. the framework's resolution lock
//! 3. the unit's `inner` lock (short critical sections only, never held
//!    while unit code runs or another loader is consulted)

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, ThreadId};

use lattice_core::{Archive, UnitGeneration, UnitId, UnitState};
use lattice_wiring::{
    CapabilityBatch, ManifestHeaders, UnitPackages, capabilities_from_header, headers,
    parse_header,
};

use crate::activation::ActivationPolicy;
use crate::activator::Activator;
use crate::context::UnitContext;
use crate::error::{RuntimeError, RuntimeResult};
use crate::loader::ModuleLoader;

/// Everything read from one archive's manifest.
pub(crate) struct Declarations {
    pub(crate) packages: UnitPackages,
    pub(crate) activation: ActivationPolicy,
    pub(crate) activator_class: Option<String>,
    pub(crate) fragment_host: Option<String>,
    pub(crate) capabilities: CapabilityBatch,
}

impl Declarations {
    pub(crate) fn read(owner: UnitGeneration, archive: &dyn Archive) -> Self {
        let manifest = ManifestHeaders::from_lookup(|h| archive.attribute(h));
        Self::from_manifest(owner, &manifest, archive)
    }

    pub(crate) fn from_manifest(
        owner: UnitGeneration,
        manifest: &ManifestHeaders,
        archive: &dyn Archive,
    ) -> Self {
        Self {
            packages: UnitPackages::parse(owner, manifest),
            activation: ActivationPolicy::parse(
                archive
                    .attribute(headers::BUNDLE_ACTIVATION_POLICY)
                    .as_deref(),
            ),
            activator_class: archive
                .attribute(headers::BUNDLE_ACTIVATOR)
                .map(|c| c.trim().to_owned())
                .filter(|c| !c.is_empty()),
            fragment_host: archive
                .attribute(headers::FRAGMENT_HOST)
                .and_then(|v| parse_header(&v).into_iter().next())
                .and_then(|c| c.names.into_iter().next()),
            capabilities: archive
                .attribute(headers::PROVIDE_CAPABILITY)
                .map(|v| capabilities_from_header(owner.unit, &v))
                .unwrap_or_default(),
        }
    }

    /// Declarations of an uninstalled unit.
    pub(crate) fn empty(owner: UnitGeneration) -> Self {
        Self {
            packages: UnitPackages::parse(owner, &ManifestHeaders::default()),
            activation: ActivationPolicy::default(),
            activator_class: None,
            fragment_host: None,
            capabilities: CapabilityBatch::new(),
        }
    }
}

/// A retired declaration set still referenced by other units.
pub(crate) struct Zombie {
    pub(crate) packages: UnitPackages,
    pub(crate) loader: Option<Arc<ModuleLoader>>,
}

/// Unit fields guarded by the short `inner` lock.
pub(crate) struct UnitInner {
    pub(crate) archive: Arc<dyn Archive>,
    pub(crate) packages: UnitPackages,
    pub(crate) activation: ActivationPolicy,
    pub(crate) activator_class: Option<String>,
    pub(crate) fragment_host: Option<String>,
    pub(crate) capabilities: CapabilityBatch,
    pub(crate) loader: Option<Arc<ModuleLoader>>,
    /// Keyed by generation.
    pub(crate) zombies: BTreeMap<u32, Zombie>,
    /// Attached fragments (hosts only).
    pub(crate) fragments: BTreeSet<UnitId>,
    /// Host this fragment is attached to.
    pub(crate) attached_to: Option<UnitId>,
    pub(crate) start_level: u32,
    pub(crate) persistent_start: bool,
    pub(crate) delayed_start: bool,
    pub(crate) lazy_armed: bool,
    pub(crate) context: Option<Arc<UnitContext>>,
    pub(crate) activator: Option<Arc<dyn Activator>>,
}

impl UnitInner {
    pub(crate) fn generation(&self) -> UnitGeneration {
        self.packages.owner()
    }

    pub(crate) fn is_fragment(&self) -> bool {
        self.fragment_host.is_some()
    }

    /// Declarations of `generation`, live or zombie.
    pub(crate) fn packages_of(&self, generation: u32) -> Option<&UnitPackages> {
        if self.packages.owner().generation == generation {
            Some(&self.packages)
        } else {
            self.zombies.get(&generation).map(|z| &z.packages)
        }
    }

    pub(crate) fn packages_of_mut(&mut self, generation: u32) -> Option<&mut UnitPackages> {
        if self.packages.owner().generation == generation {
            Some(&mut self.packages)
        } else {
            self.zombies.get_mut(&generation).map(|z| &mut z.packages)
        }
    }

    /// Install `decl` as the live declaration set, returning the previous
    /// packages and capabilities.
    pub(crate) fn replace(&mut self, decl: Declarations) -> (UnitPackages, CapabilityBatch) {
        self.activation = decl.activation;
        self.activator_class = decl.activator_class;
        self.fragment_host = decl.fragment_host;
        self.lazy_armed = false;
        let caps = std::mem::replace(&mut self.capabilities, decl.capabilities);
        let packages = std::mem::replace(&mut self.packages, decl.packages);
        (packages, caps)
    }
}

/// Serializes one unit's lifecycle transitions and detects same-thread
/// reentrancy instead of deadlocking on it.
#[derive(Debug, Default)]
pub(crate) struct TransitionGate {
    lock: Mutex<()>,
    holder: Mutex<Option<ThreadId>>,
}

pub(crate) struct GateGuard<'a> {
    gate: &'a TransitionGate,
    _lock: MutexGuard<'a, ()>,
}

impl TransitionGate {
    /// `None` if the calling thread already holds the gate.
    fn enter(&self) -> Option<GateGuard<'_>> {
        let me = thread::current().id();
        if *self.holder() == Some(me) {
            return None;
        }
        let lock = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        *self.holder() = Some(me);
        Some(GateGuard { gate: self, _lock: lock })
    }

    fn holder(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.holder.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        *self.gate.holder() = None;
    }
}

/// One installed unit.
pub(crate) struct Unit {
    pub(crate) id: UnitId,
    pub(crate) location: String,
    state: AtomicU8,
    gate: TransitionGate,
    inner: RwLock<UnitInner>,
}

impl Unit {
    pub(crate) fn new(
        id: UnitId,
        archive: Arc<dyn Archive>,
        decl: Declarations,
        start_level: u32,
    ) -> Self {
        let persistent_start = archive.persistent_start();
        Self {
            id,
            location: archive.location().to_owned(),
            state: AtomicU8::new(UnitState::Installed.as_u8()),
            gate: TransitionGate::default(),
            inner: RwLock::new(UnitInner {
                archive,
                packages: decl.packages,
                activation: decl.activation,
                activator_class: decl.activator_class,
                fragment_host: decl.fragment_host,
                capabilities: decl.capabilities,
                loader: None,
                zombies: BTreeMap::new(),
                fragments: BTreeSet::new(),
                attached_to: None,
                start_level,
                persistent_start,
                delayed_start: false,
                lazy_armed: false,
                context: None,
                activator: None,
            }),
        }
    }

    /// Lock-free state read; mutating paths re-check under the gate.
    pub(crate) fn state(&self) -> UnitState {
        UnitState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: UnitState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, UnitInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, UnitInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the transition gate for `operation`.
    ///
    /// Fails with a state violation when the calling thread is already
    /// inside a transition of this unit (an activator starting or stopping
    /// its own unit).
    pub(crate) fn enter(&self, operation: &'static str) -> RuntimeResult<GateGuard<'_>> {
        self.gate.enter().ok_or_else(|| self.violation(operation))
    }

    pub(crate) fn violation(&self, operation: &'static str) -> RuntimeError {
        RuntimeError::StateViolation {
            unit: self.id,
            state: self.state(),
            operation,
        }
    }
}
