//! Lifecycle transitions and start levels.
//!
//! Every public operation takes the target unit's transition gate for its
//! whole duration. Helpers with an `_entered` suffix, and `activate` /
//! `deactivate`, expect the caller to hold it already.

use std::sync::atomic::Ordering;
use std::sync::{Arc, PoisonError};

use lattice_core::{Archive, PermissionAction, UnitEventKind, UnitGeneration, UnitId, UnitState};
use lattice_telemetry::{OperationContext, OperationGuard};
use lattice_wiring::CapabilityBatch;
use tracing::{debug, error, info, warn};

use crate::activator::Activator;
use crate::context::UnitContext;
use crate::error::{BoxError, RuntimeError, RuntimeResult};
use crate::framework::Framework;
use crate::unit::{Declarations, Unit, Zombie};

/// How [`Framework::start_with`] starts a unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartOptions {
    /// Do not record the start in the unit's archive.
    pub transient: bool,
    /// Honour `Bundle-ActivationPolicy: lazy` and wait for a trigger class
    /// load instead of activating now.
    pub activation_policy: bool,
}

impl StartOptions {
    /// Persistent start that honours the lazy activation policy.
    #[must_use]
    pub fn lazy() -> Self {
        Self {
            transient: false,
            activation_policy: true,
        }
    }
}

/// How [`Framework::stop_with`] stops a unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopOptions {
    /// Keep the persisted start flag.
    pub transient: bool,
}

impl Framework {
    /// Start a unit eagerly and remember it across restarts.
    ///
    /// # Errors
    ///
    /// See [`start_with`](Self::start_with).
    pub fn start(&self, id: UnitId) -> RuntimeResult<()> {
        self.start_with(id, StartOptions::default())
    }

    /// Start a unit.
    ///
    /// Starting an ACTIVE unit does nothing. Below the unit's start level
    /// the request is recorded and the unit starts once the framework
    /// level rises.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::StateViolation`] for uninstalled units, fragments,
    ///   and calls made from inside the unit's own activator
    /// - [`RuntimeError::Resolution`] if the unit cannot be resolved
    /// - [`RuntimeError::Activation`] if the activator failed; the unit is
    ///   back in RESOLVED
    pub fn start_with(&self, id: UnitId, options: StartOptions) -> RuntimeResult<()> {
        let unit = self.unit(id)?;
        let _op = OperationGuard::new(OperationContext::new("start").with_unit(id));
        self.check_lifecycle(id)?;
        if id.is_system() {
            return Ok(());
        }
        let _gate = unit.enter("start")?;
        self.start_entered(&unit, options)
    }

    pub(crate) fn start_entered(&self, unit: &Arc<Unit>, options: StartOptions) -> RuntimeResult<()> {
        match unit.state() {
            UnitState::Active => return Ok(()),
            UnitState::Installed | UnitState::Resolved => {},
            _ => return Err(unit.violation("start")),
        }
        if unit.read().is_fragment() {
            return Err(unit.violation("start"));
        }
        if !options.transient {
            self.persist_start(unit, true);
        }

        let required = unit.read().start_level;
        let current = self.framework_start_level();
        if current < required {
            unit.write().delayed_start = true;
            debug!(unit_id = %unit.id, required, current, "Start delayed until start level rises");
            return Ok(());
        }
        unit.write().delayed_start = false;

        self.resolve_unit(unit)?;

        let lazy = options.activation_policy && unit.read().activation.is_lazy();
        if lazy {
            let newly_armed = !std::mem::replace(&mut unit.write().lazy_armed, true);
            if newly_armed {
                info!(unit_id = %unit.id, "Unit waiting for lazy activation");
                self.fire(unit.id, UnitEventKind::LazyActivation);
            }
            return Ok(());
        }
        self.activate(unit)
    }

    /// RESOLVED to ACTIVE. Rolls back to RESOLVED if unit code fails.
    pub(crate) fn activate(&self, unit: &Arc<Unit>) -> RuntimeResult<()> {
        let id = unit.id;
        unit.set_state(UnitState::Starting);
        self.fire(id, UnitEventKind::Starting);

        let ctx = Arc::new(UnitContext::new(id, Arc::downgrade(&self.inner)));
        {
            let mut inner = unit.write();
            inner.lazy_armed = false;
            inner.context = Some(Arc::clone(&ctx));
        }

        match self.run_activator(unit, &ctx) {
            Ok(activator) => {
                unit.write().activator = activator;
                unit.set_state(UnitState::Active);
                info!(unit_id = %id, "Unit started");
                self.fire(id, UnitEventKind::Started);
                Ok(())
            },
            Err(source) => {
                ctx.invalidate();
                unit.write().context = None;
                unit.set_state(UnitState::Resolved);
                self.fire(id, UnitEventKind::Stopped);
                let err = RuntimeError::Activation { unit: id, source };
                warn!(unit_id = %id, error = %err, "Unit failed to start");
                self.report(id, &err);
                Err(err)
            },
        }
    }

    fn run_activator(
        &self,
        unit: &Arc<Unit>,
        ctx: &UnitContext,
    ) -> Result<Option<Arc<dyn Activator>>, BoxError> {
        let Some(class) = unit.read().activator_class.clone() else {
            return Ok(None);
        };
        self.check(unit.id, PermissionAction::Execute, &class)?;
        let loaded = self.loader_for(unit)?.load_class(&class)?;
        let activator: Arc<dyn Activator> =
            Arc::from(self.inner.activators.create(unit.id, &loaded)?);
        activator.start(ctx)?;
        debug!(unit_id = %unit.id, class = %class, "Activator started");
        Ok(Some(activator))
    }

    /// ACTIVE to RESOLVED. Teardown always completes; an activator error
    /// is reported and returned afterwards.
    pub(crate) fn deactivate(&self, unit: &Unit) -> RuntimeResult<()> {
        let id = unit.id;
        unit.set_state(UnitState::Stopping);
        self.fire(id, UnitEventKind::Stopping);

        let (activator, ctx) = {
            let mut inner = unit.write();
            (inner.activator.take(), inner.context.take())
        };
        let result = match (&activator, &ctx) {
            (Some(activator), Some(ctx)) => activator.stop(ctx),
            _ => Ok(()),
        };
        if let Some(ctx) = ctx {
            ctx.invalidate();
        }

        unit.set_state(UnitState::Resolved);
        info!(unit_id = %id, "Unit stopped");
        self.fire(id, UnitEventKind::Stopped);

        result.map_err(|source| {
            let err = RuntimeError::Activation { unit: id, source };
            warn!(unit_id = %id, error = %err, "Activator failed to stop cleanly");
            self.report(id, &err);
            err
        })
    }

    /// Stop a unit and forget its persisted start.
    ///
    /// # Errors
    ///
    /// See [`stop_with`](Self::stop_with).
    pub fn stop(&self, id: UnitId) -> RuntimeResult<()> {
        self.stop_with(id, StopOptions::default())
    }

    /// Stop a unit. Stopping a unit that is not ACTIVE only clears its
    /// delayed or lazy start.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::StateViolation`] for the system unit, uninstalled
    ///   units, and calls made from inside the unit's own activator
    /// - [`RuntimeError::Activation`] if the activator's stop failed; the
    ///   unit is RESOLVED regardless
    pub fn stop_with(&self, id: UnitId, options: StopOptions) -> RuntimeResult<()> {
        let unit = self.unit(id)?;
        let _op = OperationGuard::new(OperationContext::new("stop").with_unit(id));
        self.check_lifecycle(id)?;
        if id.is_system() {
            return Err(unit.violation("stop"));
        }
        let _gate = unit.enter("stop")?;
        if unit.state() == UnitState::Uninstalled {
            return Err(unit.violation("stop"));
        }
        if !options.transient {
            self.persist_start(&unit, false);
        }
        {
            let mut inner = unit.write();
            inner.delayed_start = false;
            inner.lazy_armed = false;
        }
        if unit.state() == UnitState::Active {
            self.deactivate(&unit)
        } else {
            Ok(())
        }
    }

    /// Replace a unit's declarations, from `archive` or by re-reading the
    /// current one.
    ///
    /// An ACTIVE unit is stopped first and restarted afterwards. The old
    /// declarations become a zombie while other units are wired to them.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::StateViolation`] for the system unit and
    ///   uninstalled units
    /// - the restart's error, if the unit was ACTIVE and fails to come back
    pub fn update(&self, id: UnitId, archive: Option<Arc<dyn Archive>>) -> RuntimeResult<()> {
        let unit = self.unit(id)?;
        let _op = OperationGuard::new(OperationContext::new("update").with_unit(id));
        self.check_lifecycle(id)?;
        if id.is_system() {
            return Err(unit.violation("update"));
        }
        let _gate = unit.enter("update")?;
        let previous = unit.state();
        if previous == UnitState::Uninstalled {
            return Err(unit.violation("update"));
        }
        let was_active = previous == UnitState::Active;
        if was_active {
            if let Err(e) = self.deactivate(&unit) {
                debug!(unit_id = %id, error = %e, "Continuing update after failed stop");
            }
        }

        let (archive, next) = {
            let inner = unit.read();
            let archive = archive.unwrap_or_else(|| Arc::clone(&inner.archive));
            let next = inner.generation().generation.saturating_add(1);
            (archive, UnitGeneration::new(id, next))
        };
        let decl = Declarations::read(next, &*archive);
        for err in decl.packages.declaration_errors() {
            self.report(id, &RuntimeError::Declaration {
                unit: id,
                source: err.clone(),
            });
        }
        let added = decl.capabilities.clone();

        self.detach_fragments(&unit);
        self.detach_from_host(&unit);
        let removed = self.retire_declarations(&unit, decl, Some(archive))?;
        unit.set_state(UnitState::Installed);
        self.swap_capabilities(id, &removed, &added);

        if previous.is_resolved() {
            self.fire(id, UnitEventKind::Unresolved);
        }
        info!(unit_id = %id, generation = next.generation, "Unit updated");
        self.fire(id, UnitEventKind::Updated);
        self.purge_if_configured();

        if was_active {
            self.start_entered(&unit, StartOptions {
                transient: true,
                activation_policy: false,
            })?;
        }
        Ok(())
    }

    /// Remove a unit.
    ///
    /// An ACTIVE unit is stopped first; a failing stop is reported but does
    /// not prevent the uninstall. Persistent storage is erased best-effort.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::StateViolation`] for the system unit and
    /// units already uninstalled.
    pub fn uninstall(&self, id: UnitId) -> RuntimeResult<()> {
        let unit = self.unit(id)?;
        let _op = OperationGuard::new(OperationContext::new("uninstall").with_unit(id));
        self.check_lifecycle(id)?;
        if id.is_system() {
            return Err(unit.violation("uninstall"));
        }
        let _gate = unit.enter("uninstall")?;
        let previous = unit.state();
        if previous == UnitState::Uninstalled {
            return Err(unit.violation("uninstall"));
        }
        if previous == UnitState::Active {
            if let Err(e) = self.deactivate(&unit) {
                debug!(unit_id = %id, error = %e, "Continuing uninstall after failed stop");
            }
        }

        let next = UnitGeneration::new(id, unit.read().generation().generation.saturating_add(1));
        self.detach_fragments(&unit);
        self.detach_from_host(&unit);
        let removed = self.retire_declarations(&unit, Declarations::empty(next), None)?;
        unit.set_state(UnitState::Uninstalled);
        self.swap_capabilities(id, &removed, &CapabilityBatch::new());

        let archive = Arc::clone(&unit.read().archive);
        if let Err(e) = archive.purge() {
            self.report(id, &RuntimeError::Archive(e));
        }

        if previous.is_resolved() {
            self.fire(id, UnitEventKind::Unresolved);
        }
        info!(unit_id = %id, location = %unit.location, "Unit uninstalled");
        self.fire(id, UnitEventKind::Uninstalled);
        self.purge_if_configured();
        Ok(())
    }

    /// Swap in `decl` and retire the previous declaration set, keeping it
    /// as a zombie if other units are still wired to it. Returns the
    /// retired capabilities.
    ///
    /// `decl` is registered only when a replacement archive is given;
    /// uninstall passes `None`.
    fn retire_declarations(
        &self,
        unit: &Unit,
        decl: Declarations,
        archive: Option<Arc<dyn Archive>>,
    ) -> RuntimeResult<CapabilityBatch> {
        let register = archive.is_some();
        let mut table = self.inner.resolver.write()?;
        let mut inner = unit.write();
        let (mut old, removed) = inner.replace(decl);
        if let Some(archive) = archive {
            inner.archive = archive;
        }

        let loader = inner.loader.take();
        if let Some(loader) = &loader {
            loader.close();
        }
        let old_generation = old.owner();
        if old.unregister(&mut table, false) {
            debug!(unit_id = %unit.id, generation = old_generation.generation, "Declarations retired");
        } else {
            info!(
                unit_id = %unit.id,
                generation = old_generation.generation,
                "Declarations still wired; keeping zombie"
            );
            inner.zombies.insert(old_generation.generation, Zombie {
                packages: old,
                loader,
            });
        }

        if register && !inner.is_fragment() {
            inner.packages.register(&mut table, &*self.inner.permissions);
        }
        Ok(removed)
    }

    fn swap_capabilities(&self, id: UnitId, removed: &CapabilityBatch, added: &CapabilityBatch) {
        if let Err(e) = self.inner.capabilities.remove(removed) {
            error!(unit_id = %id, error = %e, "Capability registry out of sync");
            self.report(id, &RuntimeError::Wiring(e));
        }
        if let Err(e) = self.inner.capabilities.add(added) {
            self.report(id, &RuntimeError::Wiring(e));
        }
    }

    /// Retry unregistering every zombie declaration set. Returns how many
    /// were released.
    ///
    /// # Errors
    ///
    /// Returns a wiring error if the resolution lock is poisoned.
    pub fn refresh(&self) -> RuntimeResult<usize> {
        let _op = OperationGuard::new(OperationContext::new("refresh"));
        let mut table = self.inner.resolver.write()?;
        let mut released = 0usize;
        for unit in self.all_units() {
            let mut inner = unit.write();
            let generations: Vec<u32> = inner.zombies.keys().copied().collect();
            for generation in generations {
                let unwired = inner
                    .zombies
                    .get_mut(&generation)
                    .is_some_and(|z| z.packages.unregister(&mut table, false));
                if unwired {
                    inner.zombies.remove(&generation);
                    released = released.saturating_add(1);
                    debug!(unit_id = %unit.id, generation, "Zombie released");
                }
            }
        }
        if released > 0 {
            info!(released, "Refreshed zombie declarations");
        }
        Ok(released)
    }

    fn purge_if_configured(&self) {
        if !self.inner.settings.purge_zombies_on_unwire {
            return;
        }
        if let Err(e) = self.refresh() {
            self.report(UnitId::SYSTEM, &e);
        }
    }

    fn persist_start(&self, unit: &Unit, persistent: bool) {
        let archive = {
            let mut inner = unit.write();
            inner.persistent_start = persistent;
            Arc::clone(&inner.archive)
        };
        if let Err(e) = archive.persist(persistent) {
            self.report(unit.id, &RuntimeError::Archive(e));
        }
    }

    // ------------------------------------------------------------------
    // Start levels
    // ------------------------------------------------------------------

    /// A unit's start level.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UnknownUnit`] for an id never issued.
    pub fn get_start_level(&self, id: UnitId) -> RuntimeResult<u32> {
        Ok(self.unit(id)?.read().start_level)
    }

    /// Move a unit to another start level, starting or stopping it if the
    /// framework level now says so. The level is persisted through the
    /// unit's archive.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidArgument`] for level 0 and a state
    /// violation for the system unit or uninstalled units.
    pub fn set_start_level(&self, id: UnitId, level: u32) -> RuntimeResult<()> {
        if level == 0 {
            return Err(RuntimeError::InvalidArgument(
                "unit start level must be at least 1".to_owned(),
            ));
        }
        let unit = self.unit(id)?;
        self.check_lifecycle(id)?;
        if id.is_system() || unit.state() == UnitState::Uninstalled {
            return Err(unit.violation("set start level of"));
        }
        let archive = {
            let mut inner = unit.write();
            inner.start_level = level;
            Arc::clone(&inner.archive)
        };
        if let Err(e) = archive.set_start_level(level) {
            self.report(id, &RuntimeError::Archive(e));
        }
        debug!(unit_id = %id, level, "Unit start level set");
        self.apply_start_level(&unit, self.framework_start_level());
        Ok(())
    }

    /// The framework's current start level.
    #[must_use]
    pub fn framework_start_level(&self) -> u32 {
        self.inner.start_level.load(Ordering::Acquire)
    }

    /// Change the framework start level.
    ///
    /// Raising it starts units whose start was delayed or persisted, by
    /// ascending (level, id). Lowering it stops ACTIVE units above the new
    /// level in the reverse order; they restart when the level rises again.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidArgument`] for level 0.
    pub fn set_framework_start_level(&self, level: u32) -> RuntimeResult<()> {
        if level == 0 {
            return Err(RuntimeError::InvalidArgument(
                "framework start level must be at least 1".to_owned(),
            ));
        }
        self.check_lifecycle(UnitId::SYSTEM)?;
        let _op = OperationGuard::new(
            OperationContext::new("set-start-level").with_metadata("level", level.to_string()),
        );
        let _levels = self
            .inner
            .level_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let previous = self.inner.start_level.swap(level, Ordering::AcqRel);
        info!(from = previous, to = level, "Framework start level changed");

        let mut units: Vec<(u32, Arc<Unit>)> = self
            .all_units()
            .into_iter()
            .filter(|u| !u.id.is_system() && u.state() != UnitState::Uninstalled)
            .map(|u| {
                let unit_level = u.read().start_level;
                (unit_level, u)
            })
            .collect();
        units.sort_by_key(|(l, u)| (*l, u.id));
        if level < previous {
            units.reverse();
        }
        for (_, unit) in &units {
            self.apply_start_level(unit, level);
        }
        Ok(())
    }

    fn apply_start_level(&self, unit: &Arc<Unit>, framework_level: u32) {
        let Ok(_gate) = unit.enter("apply start level to") else {
            return;
        };
        let (level, wanted) = {
            let inner = unit.read();
            (
                inner.start_level,
                (inner.delayed_start || inner.persistent_start) && !inner.is_fragment(),
            )
        };
        let state = unit.state();
        if level <= framework_level {
            let startable = matches!(state, UnitState::Installed | UnitState::Resolved)
                && !unit.read().lazy_armed;
            if wanted && startable {
                let options = StartOptions {
                    transient: true,
                    activation_policy: false,
                };
                if let Err(e) = self.start_entered(unit, options) {
                    if !matches!(e, RuntimeError::Activation { .. }) {
                        self.report(unit.id, &e);
                    }
                }
            }
        } else if state == UnitState::Active {
            // Activator errors are reported by `deactivate`.
            let _ = self.deactivate(unit);
            unit.write().delayed_start = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use lattice_test::{MemoryArchive, RecordingEventSink};

    use super::*;

    fn framework(events: &RecordingEventSink) -> Framework {
        Framework::builder()
            .event_sink(Arc::new(events.clone()))
            .build()
            .unwrap()
    }

    #[test]
    fn start_and_stop_without_activator() {
        let events = RecordingEventSink::new();
        let fw = framework(&events);
        let id = fw.install(Arc::new(MemoryArchive::new("mem:plain"))).unwrap();

        fw.start(id).unwrap();
        assert_eq!(fw.get_state(id).unwrap(), UnitState::Active);
        fw.start(id).unwrap();
        fw.stop(id).unwrap();
        assert_eq!(fw.get_state(id).unwrap(), UnitState::Resolved);
        assert_eq!(events.kinds_for(id), vec![
            UnitEventKind::Installed,
            UnitEventKind::Resolved,
            UnitEventKind::Starting,
            UnitEventKind::Started,
            UnitEventKind::Stopping,
            UnitEventKind::Stopped,
        ]);
    }

    #[test]
    fn start_persists_and_stop_clears() {
        let events = RecordingEventSink::new();
        let fw = framework(&events);
        let archive = MemoryArchive::new("mem:p");
        let id = fw.install(Arc::new(archive.clone())).unwrap();

        fw.start(id).unwrap();
        assert!(archive.persistent_start());
        fw.stop_with(id, StopOptions { transient: true }).unwrap();
        assert!(archive.persistent_start());
        fw.stop(id).unwrap();
        assert!(!archive.persistent_start());
    }

    #[test]
    fn system_unit_refuses_stop_and_uninstall() {
        let fw = framework(&RecordingEventSink::new());
        assert_eq!(fw.get_state(UnitId::SYSTEM).unwrap(), UnitState::Active);
        assert!(matches!(fw.stop(UnitId::SYSTEM), Err(RuntimeError::StateViolation { .. })));
        assert!(matches!(
            fw.uninstall(UnitId::SYSTEM),
            Err(RuntimeError::StateViolation { .. })
        ));
        fw.start(UnitId::SYSTEM).unwrap();
    }

    #[test]
    fn start_level_zero_is_rejected() {
        let fw = framework(&RecordingEventSink::new());
        let id = fw.install(Arc::new(MemoryArchive::new("mem:l"))).unwrap();
        assert!(matches!(fw.set_start_level(id, 0), Err(RuntimeError::InvalidArgument(_))));
        assert!(matches!(
            fw.set_framework_start_level(0),
            Err(RuntimeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn uninstalled_unit_rejects_everything() {
        let fw = framework(&RecordingEventSink::new());
        let id = fw.install(Arc::new(MemoryArchive::new("mem:u"))).unwrap();
        fw.uninstall(id).unwrap();
        assert_eq!(fw.get_state(id).unwrap(), UnitState::Uninstalled);
        assert!(fw.start(id).is_err());
        assert!(fw.stop(id).is_err());
        assert!(fw.update(id, None).is_err());
        assert!(fw.uninstall(id).is_err());
        assert!(fw.set_start_level(id, 2).is_err());
        assert!(!fw.units().contains(&id));
    }
}
