//! Lazy activation triggered by class loads.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::Harness;
use lattice_core::{UnitEventKind, UnitGeneration, UnitState};
use lattice_runtime::{FnActivator, Linker, LoadStrategy, LoadedClass, RuntimeResult, StartOptions};
use lattice_test::MemoryArchive;

/// Class bytes of the form `links:a.B,a.C` link those classes at
/// definition time; anything else links nothing.
struct LinkingStrategy;

impl LoadStrategy for LinkingStrategy {
    fn define(
        &self,
        owner: UnitGeneration,
        name: &str,
        bytes: Vec<u8>,
        linker: &mut dyn Linker,
    ) -> RuntimeResult<LoadedClass> {
        let text = String::from_utf8_lossy(&bytes).into_owned();
        if let Some(links) = text.strip_prefix("links:") {
            for dep in links.split(',').map(str::trim).filter(|d| !d.is_empty()) {
                linker.resolve(dep)?;
            }
        }
        Ok(LoadedClass::new(name, owner, bytes))
    }
}

fn linking_harness() -> Harness {
    Harness::with_strategy(Arc::new(LinkingStrategy))
}

fn lazy_unit(policy: &str) -> MemoryArchive {
    MemoryArchive::new("mem:lazy")
        .with_header("Bundle-SymbolicName", "lazy")
        .with_header("Export-Package", "pkg.lazy,pkg.lazy.api")
        .with_header("Bundle-ActivationPolicy", policy)
        .with_header("Bundle-Activator", "pkg.lazy.Activator")
        .with_class("pkg.lazy.Activator")
        .with_class("pkg.lazy.A")
        .with_class("pkg.lazy.B")
        .with_class("pkg.lazy.C")
        .with_class("pkg.lazy.Late")
        .with_class("pkg.lazy.api.Constants")
}

fn consumer(links: &str) -> MemoryArchive {
    MemoryArchive::new("mem:app")
        .with_header("Import-Package", "pkg.lazy,pkg.lazy.api")
        .with_entry("app/Main.class", format!("links:{links}").into_bytes())
}

/// Registers an activator for the lazy unit and returns its start counter.
fn count_starts(h: &Harness) -> Arc<AtomicUsize> {
    let starts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&starts);
    h.activators.register("pkg.lazy.Activator", move |_| {
        let counter = Arc::clone(&counter);
        Box::new(FnActivator::new().on_start(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
    });
    starts
}

#[test]
fn lazy_start_waits_for_a_trigger() {
    let h = linking_harness();
    let starts = count_starts(&h);
    let lazy = h.install(lazy_unit("lazy"));

    h.fw.start_with(lazy, StartOptions::lazy()).unwrap();
    assert_eq!(h.fw.get_state(lazy).unwrap(), UnitState::Resolved);
    assert_eq!(h.events.count(lazy, UnitEventKind::LazyActivation), 1);
    assert_eq!(starts.load(Ordering::SeqCst), 0);

    // Arming twice fires once.
    h.fw.start_with(lazy, StartOptions::lazy()).unwrap();
    assert_eq!(h.events.count(lazy, UnitEventKind::LazyActivation), 1);

    h.fw.load_class(lazy, "pkg.lazy.A").unwrap();
    assert_eq!(h.fw.get_state(lazy).unwrap(), UnitState::Active);
    assert_eq!(starts.load(Ordering::SeqCst), 1);
}

#[test]
fn one_call_chain_activates_once() {
    let h = linking_harness();
    let starts = count_starts(&h);
    let lazy = h.install(lazy_unit("lazy"));
    let app = h.install(consumer("pkg.lazy.A,pkg.lazy.B,pkg.lazy.C"));
    h.fw.start_with(lazy, StartOptions::lazy()).unwrap();

    let main = h.fw.load_class(app, "app.Main").unwrap();
    assert_eq!(main.owner().unit, app);

    assert_eq!(h.fw.get_state(lazy).unwrap(), UnitState::Active);
    assert_eq!(starts.load(Ordering::SeqCst), 1);
    assert_eq!(h.events.count(lazy, UnitEventKind::Starting), 1);
    assert_eq!(h.events.count(lazy, UnitEventKind::Started), 1);

    // Later loads find the unit already active.
    h.fw.load_class(app, "pkg.lazy.Late").unwrap();
    assert_eq!(starts.load(Ordering::SeqCst), 1);
}

#[test]
fn activator_loading_its_own_classes_does_not_deadlock() {
    let h = linking_harness();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    h.activators.register("pkg.lazy.Activator", move |_| {
        let counter = Arc::clone(&counter);
        Box::new(FnActivator::new().on_start(move |ctx| {
            // One cached trigger and one defined during activation.
            ctx.load_class("pkg.lazy.A")?;
            ctx.load_class("pkg.lazy.Late")?;
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
    });
    let lazy = h.install(lazy_unit("lazy"));
    let app = h.install(consumer("pkg.lazy.A"));
    h.fw.start_with(lazy, StartOptions::lazy()).unwrap();

    h.fw.load_class(app, "app.Main").unwrap();

    assert_eq!(h.fw.get_state(lazy).unwrap(), UnitState::Active);
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(h.errors.count_for(lazy), 0);
}

#[test]
fn excluded_packages_do_not_trigger() {
    let h = linking_harness();
    let starts = count_starts(&h);
    let lazy = h.install(lazy_unit(r#"lazy;exclude:="pkg.lazy.api""#));
    let app = h.install(consumer("pkg.lazy.api.Constants"));
    h.fw.start_with(lazy, StartOptions::lazy()).unwrap();

    h.fw.load_class(app, "app.Main").unwrap();
    assert_eq!(h.fw.get_state(lazy).unwrap(), UnitState::Resolved);
    assert_eq!(starts.load(Ordering::SeqCst), 0);

    h.fw.load_class(app, "pkg.lazy.B").unwrap();
    assert_eq!(h.fw.get_state(lazy).unwrap(), UnitState::Active);
}

#[test]
fn include_limits_triggers_to_listed_packages() {
    let h = linking_harness();
    let starts = count_starts(&h);
    let lazy = h.install(lazy_unit(r#"lazy;include:="pkg.lazy.api""#));
    h.fw.start_with(lazy, StartOptions::lazy()).unwrap();

    h.fw.load_class(lazy, "pkg.lazy.A").unwrap();
    assert_eq!(starts.load(Ordering::SeqCst), 0);

    h.fw.load_class(lazy, "pkg.lazy.api.Constants").unwrap();
    assert_eq!(starts.load(Ordering::SeqCst), 1);
}

#[test]
fn eager_start_ignores_the_lazy_policy() {
    let h = linking_harness();
    let starts = count_starts(&h);
    let lazy = h.install(lazy_unit("lazy"));

    h.fw.start(lazy).unwrap();
    assert_eq!(h.fw.get_state(lazy).unwrap(), UnitState::Active);
    assert_eq!(starts.load(Ordering::SeqCst), 1);
    assert_eq!(h.events.count(lazy, UnitEventKind::LazyActivation), 0);
}

#[test]
fn loads_without_a_lazy_start_never_activate() {
    let h = linking_harness();
    let starts = count_starts(&h);
    let lazy = h.install(lazy_unit("lazy"));
    h.fw.resolve(lazy).unwrap();

    h.fw.load_class(lazy, "pkg.lazy.A").unwrap();
    assert_eq!(h.fw.get_state(lazy).unwrap(), UnitState::Resolved);
    assert_eq!(starts.load(Ordering::SeqCst), 0);
}

#[test]
fn stop_disarms_a_pending_lazy_start() {
    let h = linking_harness();
    let starts = count_starts(&h);
    let lazy = h.install(lazy_unit("lazy"));
    h.fw.start_with(lazy, StartOptions::lazy()).unwrap();
    h.fw.stop(lazy).unwrap();

    h.fw.load_class(lazy, "pkg.lazy.A").unwrap();
    assert_eq!(h.fw.get_state(lazy).unwrap(), UnitState::Resolved);
    assert_eq!(starts.load(Ordering::SeqCst), 0);
}

#[test]
fn failed_lazy_activation_leaves_the_unit_resolved() {
    let h = linking_harness();
    h.activators.register("pkg.lazy.Activator", |_| {
        Box::new(FnActivator::new().on_start(|_| Err("database unreachable".into())))
    });
    let lazy = h.install(lazy_unit("lazy"));
    h.fw.start_with(lazy, StartOptions::lazy()).unwrap();

    // The load itself succeeds; the activation failure goes to the sink.
    h.fw.load_class(lazy, "pkg.lazy.A").unwrap();
    assert_eq!(h.fw.get_state(lazy).unwrap(), UnitState::Resolved);
    assert_eq!(h.errors.count_for(lazy), 1);
    assert!(h.errors.errors()[0].1.contains("database unreachable"));
}
