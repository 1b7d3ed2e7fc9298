//! The framework: unit table, installation, resolution and introspection.
//!
//! Lifecycle transitions live in [`crate::lifecycle`]; this module owns the
//! shared state every unit and loader consults.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use lattice_config::Config;
use lattice_core::{
    AllowAll, Archive, ErrorSink, EventSink, PermissionAction, PermissionCheck, TracingErrorSink,
    TracingEventSink, UnitEventKind, UnitGeneration, UnitId, UnitState, VersionMode,
    set_version_mode,
};
use lattice_telemetry::{OperationContext, OperationGuard};
use lattice_wiring::{Capabilities, Capability, PackageEntry, ResolveFailure, SharedResolver};
use tracing::{debug, info, warn};

use crate::activator::{ActivatorFactory, ActivatorRegistry};
use crate::error::{RuntimeError, RuntimeResult};
use crate::loader::{
    ListOptions, LoadStrategy, LoadedClass, ModuleLoader, RawBytesStrategy, Resource,
    SearchContext,
};
use crate::system::{BootDelegation, system_declarations};
use crate::unit::{Declarations, Unit};

/// Settings taken from `[framework]`.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) initial_unit_start_level: u32,
    pub(crate) purge_zombies_on_unwire: bool,
    pub(crate) boot_delegation: BootDelegation,
}

/// State shared by the framework handle, loaders and unit contexts.
pub(crate) struct FrameworkInner {
    pub(crate) settings: Settings,
    pub(crate) resolver: SharedResolver,
    pub(crate) capabilities: Capabilities,
    pub(crate) units: RwLock<BTreeMap<UnitId, Arc<Unit>>>,
    pub(crate) start_level: AtomicU32,
    /// Serializes framework start-level changes.
    pub(crate) level_lock: Mutex<()>,
    install_lock: Mutex<()>,
    next_id: AtomicU64,
    pub(crate) permissions: Arc<dyn PermissionCheck>,
    pub(crate) error_sink: Arc<dyn ErrorSink>,
    pub(crate) event_sink: Arc<dyn EventSink>,
    pub(crate) activators: Arc<dyn ActivatorFactory>,
    pub(crate) strategy: Arc<dyn LoadStrategy>,
}

/// Handle to a running framework.
///
/// Cheap to clone. Handles obtained from a
/// [`UnitContext`](crate::UnitContext) act on behalf of that unit for
/// permission checks; all others act as the system unit.
#[derive(Clone)]
pub struct Framework {
    pub(crate) inner: Arc<FrameworkInner>,
    pub(crate) actor: UnitId,
}

impl std::fmt::Debug for Framework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framework")
            .field("actor", &self.actor)
            .field("start_level", &self.framework_start_level())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Framework`].
pub struct FrameworkBuilder {
    config: Config,
    permissions: Option<Arc<dyn PermissionCheck>>,
    error_sink: Arc<dyn ErrorSink>,
    event_sink: Arc<dyn EventSink>,
    activators: Arc<dyn ActivatorFactory>,
    strategy: Arc<dyn LoadStrategy>,
    system_archive: Option<Arc<dyn Archive>>,
}

impl FrameworkBuilder {
    fn new() -> Self {
        Self {
            config: Config::default(),
            permissions: None,
            error_sink: Arc::new(TracingErrorSink),
            event_sink: Arc::new(TracingEventSink),
            activators: Arc::new(ActivatorRegistry::new()),
            strategy: Arc::new(RawBytesStrategy),
            system_archive: None,
        }
    }

    /// Use `config` instead of the defaults.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Permission check, consulted only when `security.enforce_permissions`
    /// is set.
    #[must_use]
    pub fn permissions(mut self, permissions: Arc<dyn PermissionCheck>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// Where non-fatal errors are reported.
    #[must_use]
    pub fn error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = sink;
        self
    }

    /// Where lifecycle events are published.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Factory that instantiates `Bundle-Activator` classes.
    #[must_use]
    pub fn activator_factory(mut self, factory: Arc<dyn ActivatorFactory>) -> Self {
        self.activators = factory;
        self
    }

    /// How class entries become [`LoadedClass`]es.
    #[must_use]
    pub fn load_strategy(mut self, strategy: Arc<dyn LoadStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Archive backing the system unit.
    #[must_use]
    pub fn system_archive(mut self, archive: Arc<dyn Archive>) -> Self {
        self.system_archive = Some(archive);
        self
    }

    /// Create the framework with its system unit ACTIVE.
    ///
    /// Also sets the process-wide version comparison mode from
    /// `version.fuzzy`.
    ///
    /// # Errors
    ///
    /// Returns an error if the system unit's exports cannot be wired.
    pub fn build(self) -> RuntimeResult<Framework> {
        let cfg = &self.config;
        set_version_mode(if cfg.version.fuzzy {
            VersionMode::Fuzzy
        } else {
            VersionMode::Strict
        });
        let permissions: Arc<dyn PermissionCheck> = match self.permissions {
            Some(p) if cfg.security.enforce_permissions => p,
            _ => Arc::new(AllowAll),
        };

        let inner = Arc::new(FrameworkInner {
            settings: Settings {
                initial_unit_start_level: cfg.framework.initial_unit_start_level,
                purge_zombies_on_unwire: cfg.framework.purge_zombies_on_unwire,
                boot_delegation: BootDelegation::new(&cfg.framework.boot_delegation),
            },
            resolver: SharedResolver::new(),
            capabilities: Capabilities::new(),
            units: RwLock::new(BTreeMap::new()),
            start_level: AtomicU32::new(cfg.framework.beginning_start_level),
            level_lock: Mutex::new(()),
            install_lock: Mutex::new(()),
            next_id: AtomicU64::new(1),
            permissions,
            error_sink: self.error_sink,
            event_sink: self.event_sink,
            activators: self.activators,
            strategy: self.strategy,
        });
        let framework = Framework::from_inner(inner);
        framework.install_system_unit(self.system_archive, &cfg.framework.system_packages)?;
        info!(
            start_level = cfg.framework.beginning_start_level,
            fuzzy_versions = cfg.version.fuzzy,
            "Framework started"
        );
        Ok(framework)
    }
}

impl Framework {
    /// Start building a framework.
    #[must_use]
    pub fn builder() -> FrameworkBuilder {
        FrameworkBuilder::new()
    }

    /// A framework from `config` with default collaborators.
    ///
    /// # Errors
    ///
    /// See [`FrameworkBuilder::build`].
    pub fn new(config: Config) -> RuntimeResult<Self> {
        Self::builder().config(config).build()
    }

    pub(crate) fn from_inner(inner: Arc<FrameworkInner>) -> Self {
        Self {
            inner,
            actor: UnitId::SYSTEM,
        }
    }

    pub(crate) fn acting_as(&self, actor: UnitId) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            actor,
        }
    }

    fn install_system_unit(
        &self,
        archive: Option<Arc<dyn Archive>>,
        system_packages: &[String],
    ) -> RuntimeResult<()> {
        let archive = archive.unwrap_or_else(crate::system::empty_archive);
        let owner = UnitGeneration::new(UnitId::SYSTEM, 0);
        let decl = system_declarations(owner, &*archive, system_packages);
        let unit = Arc::new(Unit::new(UnitId::SYSTEM, archive, decl, 0));
        {
            let mut table = self.inner.resolver.write()?;
            let mut inner = unit.write();
            inner.packages.register(&mut table, &AllowAll);
            inner
                .packages
                .resolve(&mut table, &AllowAll)
                .map_err(|failure| RuntimeError::Resolution {
                    unit: UnitId::SYSTEM,
                    failure,
                })?;
        }
        unit.set_state(UnitState::Active);
        self.units_mut().insert(UnitId::SYSTEM, unit);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Unit table
    // ------------------------------------------------------------------

    fn units_mut(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<UnitId, Arc<Unit>>> {
        self.inner
            .units
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lookup(&self, id: UnitId) -> Option<Arc<Unit>> {
        self.inner
            .units
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub(crate) fn unit(&self, id: UnitId) -> RuntimeResult<Arc<Unit>> {
        self.lookup(id).ok_or(RuntimeError::UnknownUnit(id))
    }

    /// Snapshot of every unit ever installed, uninstalled ones included.
    pub(crate) fn all_units(&self) -> Vec<Arc<Unit>> {
        self.inner
            .units
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Installed units (not yet uninstalled) in id order.
    #[must_use]
    pub fn units(&self) -> Vec<UnitId> {
        self.all_units()
            .into_iter()
            .filter(|u| u.state() != UnitState::Uninstalled)
            .map(|u| u.id)
            .collect()
    }

    pub(crate) fn fire(&self, unit: UnitId, kind: UnitEventKind) {
        self.inner.event_sink.unit_changed(unit, kind);
    }

    pub(crate) fn report(&self, unit: UnitId, error: &RuntimeError) {
        self.inner.error_sink.report(unit, error);
    }

    pub(crate) fn check(
        &self,
        unit: UnitId,
        action: PermissionAction,
        target: &str,
    ) -> RuntimeResult<()> {
        if self.inner.permissions.allows(unit, action, target) {
            Ok(())
        } else {
            Err(RuntimeError::PermissionDenied {
                unit,
                action,
                target: target.to_owned(),
            })
        }
    }

    pub(crate) fn check_lifecycle(&self, target: UnitId) -> RuntimeResult<()> {
        self.check(self.actor, PermissionAction::Lifecycle, &target.to_string())
    }

    // ------------------------------------------------------------------
    // Install and resolve
    // ------------------------------------------------------------------

    /// Install a unit from `archive`.
    ///
    /// Installing a location that is already installed returns the
    /// existing unit. Malformed manifest clauses are reported to the error
    /// sink and dropped; they never fail the installation.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::PermissionDenied`] if the actor may not
    /// install, or a wiring error if the resolution lock is poisoned.
    pub fn install(&self, archive: Arc<dyn Archive>) -> RuntimeResult<UnitId> {
        let location = archive.location().to_owned();
        let _op = OperationGuard::new(
            OperationContext::new("install").with_metadata("location", location.clone()),
        );
        self.check(self.actor, PermissionAction::Lifecycle, &location)?;

        let _install = self
            .inner
            .install_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = self
            .all_units()
            .into_iter()
            .find(|u| u.location == location && u.state() != UnitState::Uninstalled)
        {
            debug!(unit_id = %existing.id, location = %location, "Location already installed");
            return Ok(existing.id);
        }

        let id = UnitId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let decl = Declarations::read(UnitGeneration::new(id, 0), &*archive);
        for err in decl.packages.declaration_errors() {
            self.report(id, &RuntimeError::Declaration {
                unit: id,
                source: err.clone(),
            });
        }
        let start_level = archive
            .start_level()
            .unwrap_or(self.inner.settings.initial_unit_start_level);
        let unit = Arc::new(Unit::new(id, archive, decl, start_level));

        let caps = {
            let mut table = self.inner.resolver.write()?;
            let inner = unit.read();
            if !inner.is_fragment() {
                inner.packages.register(&mut table, &*self.inner.permissions);
            }
            inner.capabilities.clone()
        };
        self.inner.capabilities.add(&caps)?;
        self.units_mut().insert(id, Arc::clone(&unit));

        info!(unit_id = %id, location = %location, "Unit installed");
        self.fire(id, UnitEventKind::Installed);
        Ok(id)
    }

    /// Bind a unit's imports. Already resolved units succeed immediately.
    ///
    /// Successfully resolved units also resolve the INSTALLED units they
    /// were wired to and attach waiting fragments.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Resolution`] listing every unsatisfied or
    /// denied name.
    pub fn resolve(&self, id: UnitId) -> RuntimeResult<()> {
        let unit = self.unit(id)?;
        self.resolve_unit(&unit)
    }

    pub(crate) fn resolve_unit(&self, unit: &Arc<Unit>) -> RuntimeResult<()> {
        match unit.state() {
            UnitState::Installed => {},
            UnitState::Uninstalled => return Err(unit.violation("resolve")),
            _ => return Ok(()),
        }
        let host = unit.read().fragment_host.clone();
        if let Some(host) = host {
            return self.attach_fragment(unit, &host);
        }

        let wired = {
            let mut table = self.inner.resolver.write()?;
            let mut inner = unit.write();
            if unit.state() != UnitState::Installed {
                return Ok(());
            }
            let owner = inner.generation();
            match inner
                .packages
                .resolve(&mut table, &*self.inner.permissions)
            {
                Ok(()) => {
                    unit.set_state(UnitState::Resolved);
                    let mut wired: Vec<UnitGeneration> = inner
                        .packages
                        .bound_imports()
                        .filter_map(|i| table.get_provider(i.name()))
                        .collect();
                    wired.extend(table.required_generations(owner));
                    wired
                },
                Err(failure) => {
                    debug!(unit_id = %unit.id, reason = %failure.reason, "Unit failed to resolve");
                    return Err(RuntimeError::Resolution {
                        unit: unit.id,
                        failure,
                    });
                },
            }
        };

        info!(unit_id = %unit.id, "Unit resolved");
        self.fire(unit.id, UnitEventKind::Resolved);
        self.attach_waiting_fragments(unit);

        for generation in wired {
            if generation.unit == unit.id {
                continue;
            }
            if let Some(provider) = self.lookup(generation.unit) {
                if provider.state() == UnitState::Installed {
                    if let Err(e) = self.resolve_unit(&provider) {
                        debug!(unit_id = %generation.unit, error = %e, "Provider left unresolved");
                    }
                }
            }
        }
        Ok(())
    }

    fn find_host(&self, name: &str) -> Option<Arc<Unit>> {
        self.all_units().into_iter().find(|u| {
            !u.id.is_system()
                && u.state() != UnitState::Uninstalled
                && {
                    let inner = u.read();
                    !inner.is_fragment() && inner.packages.symbolic_name() == Some(name)
                }
        })
    }

    /// Attach `fragment` to its host, resolving the host first if needed.
    fn attach_fragment(&self, fragment: &Arc<Unit>, host_name: &str) -> RuntimeResult<()> {
        let host = self
            .find_host(host_name)
            .filter(|host| host.state().is_resolved() || self.resolve_unit(host).is_ok());
        let Some(host) = host else {
            let failure = ResolveFailure::new(
                format!("fragment host not resolved: {host_name}"),
                vec![host_name.to_owned()],
            );
            return Err(RuntimeError::Resolution {
                unit: fragment.id,
                failure,
            });
        };
        self.attach(&host, fragment);
        Ok(())
    }

    fn attach_waiting_fragments(&self, host: &Arc<Unit>) {
        let Some(name) = host.read().packages.symbolic_name().map(str::to_owned) else {
            return;
        };
        for fragment in self.all_units() {
            let waiting = fragment.state() == UnitState::Installed && {
                let inner = fragment.read();
                inner.fragment_host.as_deref() == Some(name.as_str())
            };
            if waiting {
                self.attach(host, &fragment);
            }
        }
    }

    fn attach(&self, host: &Arc<Unit>, fragment: &Arc<Unit>) {
        {
            let mut inner = fragment.write();
            if inner.attached_to.is_some() {
                return;
            }
            inner.attached_to = Some(host.id);
        }
        host.write().fragments.insert(fragment.id);
        fragment.set_state(UnitState::Resolved);
        info!(unit_id = %fragment.id, host_id = %host.id, "Fragment attached");
        self.fire(fragment.id, UnitEventKind::Resolved);
    }

    /// Detach every fragment of `host` and return them to INSTALLED.
    pub(crate) fn detach_fragments(&self, host: &Unit) {
        let fragments = std::mem::take(&mut host.write().fragments);
        for id in fragments {
            if let Some(fragment) = self.lookup(id) {
                fragment.write().attached_to = None;
                if fragment.state() == UnitState::Resolved {
                    fragment.set_state(UnitState::Installed);
                    self.fire(id, UnitEventKind::Unresolved);
                }
            }
        }
    }

    /// Detach `fragment` from its host, if attached.
    pub(crate) fn detach_from_host(&self, fragment: &Unit) {
        let host = fragment.write().attached_to.take();
        if let Some(host) = host.and_then(|h| self.lookup(h)) {
            host.write().fragments.remove(&fragment.id);
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Current lifecycle state.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UnknownUnit`] for an id never issued.
    pub fn get_state(&self, id: UnitId) -> RuntimeResult<UnitState> {
        Ok(self.unit(id)?.state())
    }

    /// Location the unit was installed from.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UnknownUnit`] for an id never issued.
    pub fn location(&self, id: UnitId) -> RuntimeResult<String> {
        Ok(self.unit(id)?.location.clone())
    }

    /// `Bundle-SymbolicName` of the live declaration set.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UnknownUnit`] for an id never issued.
    pub fn symbolic_name(&self, id: UnitId) -> RuntimeResult<Option<String>> {
        Ok(self
            .unit(id)?
            .read()
            .packages
            .symbolic_name()
            .map(str::to_owned))
    }

    /// Generation of the live declaration set.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UnknownUnit`] for an id never issued.
    pub fn generation(&self, id: UnitId) -> RuntimeResult<UnitGeneration> {
        Ok(self.unit(id)?.read().generation())
    }

    /// Retired generations still kept alive by importers.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UnknownUnit`] for an id never issued.
    pub fn zombie_generations(&self, id: UnitId) -> RuntimeResult<Vec<UnitGeneration>> {
        Ok(self
            .unit(id)?
            .read()
            .zombies
            .keys()
            .map(|g| UnitGeneration::new(id, *g))
            .collect())
    }

    /// Exports of the live declaration set followed by those of zombie
    /// generations.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UnknownUnit`] for an id never issued.
    pub fn exported_packages(&self, id: UnitId) -> RuntimeResult<Vec<PackageEntry>> {
        let unit = self.unit(id)?;
        let inner = unit.read();
        Ok(inner
            .packages
            .exports()
            .iter()
            .chain(inner.zombies.values().flat_map(|z| z.packages.exports()))
            .cloned()
            .collect())
    }

    /// Bound imports of the live declaration set followed by those of
    /// zombie generations.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UnknownUnit`] for an id never issued.
    pub fn imported_packages(&self, id: UnitId) -> RuntimeResult<Vec<PackageEntry>> {
        let unit = self.unit(id)?;
        let inner = unit.read();
        Ok(inner
            .packages
            .bound_imports()
            .chain(inner.zombies.values().flat_map(|z| z.packages.bound_imports()))
            .cloned()
            .collect())
    }

    /// Why the last resolution attempt failed.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UnknownUnit`] for an id never issued.
    pub fn resolve_fail_reason(&self, id: UnitId) -> RuntimeResult<Option<String>> {
        Ok(self
            .unit(id)?
            .read()
            .packages
            .resolve_fail_reason()
            .map(str::to_owned))
    }

    /// The generation supplying `pkg` to the unit, wiring a dynamic import
    /// on demand. `None` covers every reason no provider is available.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UnknownUnit`] for an id never issued.
    pub fn provider_for(&self, id: UnitId, pkg: &str) -> RuntimeResult<Option<UnitGeneration>> {
        let unit = self.unit(id)?;
        let mut table = self.inner.resolver.write()?;
        let mut inner = unit.write();
        Ok(inner
            .packages
            .provider_for(pkg, &mut table, &*self.inner.permissions))
    }

    /// Capabilities registered in `namespace`.
    #[must_use]
    pub fn capabilities(&self, namespace: &str) -> Vec<Capability> {
        self.inner.capabilities.get(namespace)
    }

    // ------------------------------------------------------------------
    // Loader API
    // ------------------------------------------------------------------

    /// The unit's live loader, resolving the unit first if needed.
    ///
    /// # Errors
    ///
    /// Returns a state violation for uninstalled units.
    pub fn loader(&self, id: UnitId) -> RuntimeResult<Arc<ModuleLoader>> {
        let unit = self.unit(id)?;
        if unit.state() == UnitState::Installed {
            if let Err(e) = self.resolve_unit(&unit) {
                debug!(unit_id = %id, error = %e, "Loading from an unresolved unit");
            }
        }
        self.loader_for(&unit)
    }

    /// Load a class from unit `id`.
    ///
    /// # Errors
    ///
    /// See [`ModuleLoader::load_class`].
    pub fn load_class(&self, id: UnitId, name: &str) -> RuntimeResult<Arc<LoadedClass>> {
        self.loader(id)?.load_class(name)
    }

    /// Find a resource from unit `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::PermissionDenied`] if the actor may not read
    /// the unit's resources; otherwise see [`ModuleLoader::find_resource`].
    pub fn find_resource(&self, id: UnitId, path: &str) -> RuntimeResult<Resource> {
        self.check_resources(id)?;
        self.loader(id)?.find_resource(path)
    }

    /// List resources visible to unit `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::PermissionDenied`] if the actor may not read
    /// the unit's resources; otherwise see [`ModuleLoader::list_resources`].
    pub fn list_resources(
        &self,
        id: UnitId,
        path: &str,
        pattern: &str,
        options: ListOptions,
    ) -> RuntimeResult<Vec<String>> {
        self.check_resources(id)?;
        self.loader(id)?.list_resources(path, pattern, options)
    }

    /// Native library path for unit `id`.
    ///
    /// # Errors
    ///
    /// Returns a state violation for uninstalled units.
    pub fn find_native_library(&self, id: UnitId, name: &str) -> RuntimeResult<Option<PathBuf>> {
        Ok(self.loader(id)?.find_native_library(name))
    }

    fn check_resources(&self, id: UnitId) -> RuntimeResult<()> {
        if self.actor == id {
            return Ok(());
        }
        self.check(self.actor, PermissionAction::Resource, &id.to_string())
    }

    /// Live loader of `unit`, created on first use.
    pub(crate) fn loader_for(&self, unit: &Unit) -> RuntimeResult<Arc<ModuleLoader>> {
        if let Some(loader) = unit.read().loader.clone() {
            return Ok(loader);
        }
        let mut inner = unit.write();
        if unit.state() == UnitState::Uninstalled {
            return Err(unit.violation("load from"));
        }
        if let Some(loader) = inner.loader.clone() {
            return Ok(loader);
        }
        let loader = Arc::new(ModuleLoader::new(
            inner.generation(),
            Arc::clone(&inner.archive),
            Arc::downgrade(&self.inner),
            Arc::clone(&self.inner.strategy),
        ));
        inner.loader = Some(Arc::clone(&loader));
        debug!(unit_id = %unit.id, generation = inner.generation().generation, "Created module loader");
        Ok(loader)
    }

    // ------------------------------------------------------------------
    // Loader support
    // ------------------------------------------------------------------

    /// Loader of `generation`, live or zombie.
    pub(crate) fn loader_for_generation(
        &self,
        generation: UnitGeneration,
    ) -> Option<Arc<ModuleLoader>> {
        let unit = self.lookup(generation.unit)?;
        {
            let inner = unit.read();
            if inner.generation() != generation || unit.state() == UnitState::Uninstalled {
                return inner
                    .zombies
                    .get(&generation.generation)
                    .and_then(|z| z.loader.clone());
            }
        }
        self.loader_for(&unit).ok()
    }

    pub(crate) fn system_loader(&self) -> RuntimeResult<Arc<ModuleLoader>> {
        let system = self.unit(UnitId::SYSTEM)?;
        self.loader_for(&system)
    }

    pub(crate) fn is_boot_delegated(&self, pkg: &str) -> bool {
        self.inner.settings.boot_delegation.matches(pkg)
    }

    /// `Some(provider)` if `owner` has a bound import of `pkg`; the inner
    /// `None` means the provider was forcibly removed.
    pub(crate) fn bound_provider(
        &self,
        owner: UnitGeneration,
        pkg: &str,
    ) -> RuntimeResult<Option<Option<UnitGeneration>>> {
        let Some(unit) = self.lookup(owner.unit) else {
            return Ok(None);
        };
        let table = self.inner.resolver.read()?;
        let inner = unit.read();
        Ok(inner
            .packages_of(owner.generation)
            .and_then(|p| p.bound_import(pkg))
            .map(|_| table.get_provider(pkg)))
    }

    /// Whether `owner` exports or statically imports `pkg`.
    pub(crate) fn declares(&self, owner: UnitGeneration, pkg: &str) -> bool {
        self.lookup(owner.unit).is_some_and(|unit| {
            unit.read()
                .packages_of(owner.generation)
                .is_some_and(|p| p.is_exported(pkg) || p.is_imported(pkg))
        })
    }

    pub(crate) fn required_generations(
        &self,
        owner: UnitGeneration,
        pkg: &str,
    ) -> RuntimeResult<Option<Vec<UnitGeneration>>> {
        Ok(self
            .inner
            .resolver
            .read()?
            .get_required_unit_generations(owner, pkg))
    }

    pub(crate) fn exports_package(
        &self,
        generation: UnitGeneration,
        pkg: &str,
    ) -> RuntimeResult<bool> {
        Ok(self.inner.resolver.read()?.exports_package(generation, pkg))
    }

    pub(crate) fn reexported_generations(
        &self,
        generation: UnitGeneration,
    ) -> RuntimeResult<Vec<UnitGeneration>> {
        Ok(self.inner.resolver.read()?.reexported_generations(generation))
    }

    /// Wire `pkg` for `owner` through its dynamic-import patterns.
    pub(crate) fn dynamic_provider(
        &self,
        owner: UnitGeneration,
        pkg: &str,
    ) -> RuntimeResult<Option<UnitGeneration>> {
        let Some(unit) = self.lookup(owner.unit) else {
            return Ok(None);
        };
        let mut table = self.inner.resolver.write()?;
        let mut inner = unit.write();
        let Some(packages) = inner.packages_of_mut(owner.generation) else {
            return Ok(None);
        };
        if !packages.dynamic_matches(pkg) {
            return Ok(None);
        }
        Ok(packages.provider_for(pkg, &mut table, &*self.inner.permissions))
    }

    /// Archives of fragments attached to the live generation `owner`, by
    /// ascending unit id.
    pub(crate) fn fragment_archives(&self, owner: UnitGeneration) -> Vec<Arc<dyn Archive>> {
        let Some(host) = self.lookup(owner.unit) else {
            return Vec::new();
        };
        let ids: Vec<UnitId> = {
            let inner = host.read();
            if inner.generation() != owner {
                return Vec::new();
            }
            inner.fragments.iter().copied().collect()
        };
        ids.into_iter()
            .filter_map(|id| self.lookup(id))
            .filter(|f| f.state() != UnitState::Uninstalled)
            .map(|f| Arc::clone(&f.read().archive))
            .collect()
    }

    /// Queue `owner`'s unit for activation if `class_name` is one of its
    /// lazy triggers and the unit is waiting for one.
    pub(crate) fn note_class_loaded(
        &self,
        owner: UnitGeneration,
        class_name: &str,
        ctx: &mut SearchContext,
    ) {
        let Some(unit) = self.lookup(owner.unit) else {
            return;
        };
        if unit.state() != UnitState::Resolved {
            return;
        }
        let triggered = {
            let inner = unit.read();
            inner.generation() == owner
                && inner.lazy_armed
                && inner.activation.is_trigger(class_name)
        };
        if triggered && ctx.request_activation(unit.id) {
            debug!(unit_id = %unit.id, class = %class_name, "Lazy activation triggered");
        }
    }

    /// Finish a lazy activation queued by a search.
    pub(crate) fn activate_lazily(&self, id: UnitId) {
        let Some(unit) = self.lookup(id) else {
            return;
        };
        let Ok(_gate) = unit.enter("activate") else {
            debug!(unit_id = %id, "Unit already in transition on this thread");
            return;
        };
        let armed = unit.state() == UnitState::Resolved && unit.read().lazy_armed;
        if !armed {
            return;
        }
        let _op = OperationGuard::new(OperationContext::new("lazy-activate").with_unit(id));
        if let Err(e) = self.activate(&unit) {
            warn!(unit_id = %id, error = %e, "Lazy activation failed");
        }
    }
}
