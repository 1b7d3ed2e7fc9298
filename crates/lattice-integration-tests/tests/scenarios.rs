//! End-to-end wiring scenarios: install, resolve, uninstall and the zombie
//! declarations left behind.

mod common;

use std::sync::Arc;

use common::{Harness, generation};
use lattice_core::{UnitEventKind, UnitState};
use lattice_runtime::RuntimeError;
use lattice_test::{MemoryArchive, exporter, importer};

#[test]
fn importer_is_wired_to_matching_exporter() {
    let h = Harness::new();
    let u1 = h.install(exporter("mem:u1", "pkg.a", "1.0"));
    let u2 = h.install(importer("mem:u2", "pkg.a", "1.0"));

    h.fw.resolve(u2).unwrap();

    assert_eq!(h.fw.provider_for(u2, "pkg.a").unwrap(), Some(generation(u1, 0)));
    assert_eq!(h.fw.get_state(u2).unwrap(), UnitState::Resolved);
    // The provider is resolved along with its importer.
    assert_eq!(h.fw.get_state(u1).unwrap(), UnitState::Resolved);
    let imported = h.fw.imported_packages(u2).unwrap();
    assert_eq!(imported.len(), 1);
    assert_eq!(imported[0].name(), "pkg.a");
}

#[test]
fn unsatisfiable_version_fails_with_package_named() {
    let h = Harness::new();
    h.install(exporter("mem:u1", "pkg.a", "1.0"));
    let u2 = h.install(importer("mem:u2", "pkg.a", "2.0"));

    let err = h.fw.resolve(u2).unwrap_err();
    let RuntimeError::Resolution { unit, failure } = &err else {
        panic!("expected a resolution failure, got {err}");
    };
    assert_eq!(*unit, u2);
    assert!(failure.mentions("pkg.a"));
    assert!(err.to_string().contains("pkg.a"));

    assert_eq!(h.fw.get_state(u2).unwrap(), UnitState::Installed);
    let reason = h.fw.resolve_fail_reason(u2).unwrap().unwrap();
    assert!(reason.contains("pkg.a"));
    assert!(h.fw.start(u2).is_err());
}

#[test]
fn every_missing_package_is_reported() {
    let h = Harness::new();
    let u = h.install(
        MemoryArchive::new("mem:greedy").with_header("Import-Package", "pkg.x, pkg.y, pkg.z"),
    );
    h.install(exporter("mem:y", "pkg.y", "1.0"));

    let Err(RuntimeError::Resolution { failure, .. }) = h.fw.resolve(u) else {
        panic!("expected a resolution failure");
    };
    assert_eq!(failure.missing, vec!["pkg.x".to_owned(), "pkg.z".to_owned()]);
}

#[test]
fn uninstalled_provider_lingers_as_zombie_until_importer_lets_go() {
    let h = Harness::new();
    let u1 = h.install(exporter("mem:u1", "pkg.a", "1.0"));
    let u2 = h.install(importer("mem:u2", "pkg.a", "1.0"));
    h.fw.resolve(u2).unwrap();
    let before = h.fw.load_class(u2, "pkg.a.Impl").unwrap();
    assert_eq!(before.owner(), generation(u1, 0));

    h.fw.uninstall(u1).unwrap();

    assert_eq!(h.fw.get_state(u1).unwrap(), UnitState::Uninstalled);
    assert_eq!(h.fw.zombie_generations(u1).unwrap(), vec![generation(u1, 0)]);
    assert_eq!(h.fw.provider_for(u2, "pkg.a").unwrap(), Some(generation(u1, 0)));
    let after = h.fw.load_class(u2, "pkg.a.Impl").unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    let exported = h.fw.exported_packages(u1).unwrap();
    assert_eq!(exported.len(), 1);
    assert_eq!(exported[0].owner(), generation(u1, 0));

    // Nothing changed, so an explicit refresh cannot release it either.
    assert_eq!(h.fw.refresh().unwrap(), 0);

    h.fw
        .update(u2, Some(Arc::new(MemoryArchive::new("mem:u2"))))
        .unwrap();
    assert!(h.fw.zombie_generations(u1).unwrap().is_empty());
    assert!(h.fw.exported_packages(u1).unwrap().is_empty());
    assert_eq!(h.fw.provider_for(u2, "pkg.a").unwrap(), None);
}

#[test]
fn updated_exporter_loads_its_own_new_classes_while_old_importers_remain() {
    let h = Harness::new();
    let u1 = h.install(exporter("mem:u1", "pkg.a", "1.0").with_class("pkg.a.Later"));
    let u2 = h.install(importer("mem:u2", "pkg.a", "1.0"));
    h.fw.resolve(u2).unwrap();
    h.fw.load_class(u2, "pkg.a.Impl").unwrap();

    h.fw.update(u1, None).unwrap();
    h.fw.resolve(u1).unwrap();

    // The importer stays on the old generation.
    assert_eq!(h.fw.provider_for(u2, "pkg.a").unwrap(), Some(generation(u1, 0)));
    assert_ne!(h.fw.provider_for(u1, "pkg.a").unwrap(), Some(generation(u1, 0)));

    // Never loaded by generation 0, so only local code can serve it.
    let later = h.fw.load_class(u1, "pkg.a.Later").unwrap();
    assert_eq!(later.owner(), generation(u1, 1));
    let own = h.fw.load_class(u1, "pkg.a.Impl").unwrap();
    assert_eq!(own.owner(), generation(u1, 1));

    // Once the importer lets go, newcomers wire to the current generation.
    h.fw.uninstall(u2).unwrap();
    assert!(h.fw.zombie_generations(u1).unwrap().is_empty());
    let u3 = h.install(importer("mem:u3", "pkg.a", "1.0"));
    h.fw.resolve(u3).unwrap();
    assert_eq!(h.fw.provider_for(u3, "pkg.a").unwrap(), Some(generation(u1, 1)));
    assert_eq!(h.fw.load_class(u3, "pkg.a.Later").unwrap().owner(), generation(u1, 1));
}

#[test]
fn zombies_wait_for_refresh_when_auto_purge_is_off() {
    let mut config = lattice_config::Config::default();
    config.framework.purge_zombies_on_unwire = false;
    let h = Harness::with_config(config);
    let u1 = h.install(exporter("mem:u1", "pkg.a", "1.0"));
    let u2 = h.install(importer("mem:u2", "pkg.a", "1.0"));
    h.fw.resolve(u2).unwrap();

    h.fw.uninstall(u1).unwrap();
    h.fw.uninstall(u2).unwrap();
    assert_eq!(h.fw.zombie_generations(u1).unwrap().len(), 1);

    assert_eq!(h.fw.refresh().unwrap(), 1);
    assert!(h.fw.zombie_generations(u1).unwrap().is_empty());
}

#[test]
fn wired_provider_is_kept_when_a_newer_one_appears() {
    let h = Harness::new();
    let old = h.install(exporter("mem:old", "pkg.a", "1.0"));
    let first = h.install(importer("mem:first", "pkg.a", "1.0"));
    h.fw.resolve(first).unwrap();

    h.install(exporter("mem:new", "pkg.a", "2.0"));
    let second = h.install(importer("mem:second", "pkg.a", "1.0"));
    h.fw.resolve(second).unwrap();

    assert_eq!(h.fw.provider_for(first, "pkg.a").unwrap(), Some(generation(old, 0)));
    assert_eq!(h.fw.provider_for(second, "pkg.a").unwrap(), Some(generation(old, 0)));
}

#[test]
fn highest_version_wins_when_nothing_is_wired() {
    let h = Harness::new();
    h.install(exporter("mem:low", "pkg.a", "1.0"));
    let high = h.install(exporter("mem:high", "pkg.a", "1.5"));
    let consumer = h.install(importer("mem:c", "pkg.a", "[1.0,2.0)"));

    h.fw.resolve(consumer).unwrap();
    assert_eq!(h.fw.provider_for(consumer, "pkg.a").unwrap(), Some(generation(high, 0)));
}

#[test]
fn optional_import_without_provider_still_resolves() {
    let h = Harness::new();
    let u = h.install(
        MemoryArchive::new("mem:opt").with_header("Import-Package", "pkg.none;resolution:=optional"),
    );
    h.fw.resolve(u).unwrap();
    assert_eq!(h.fw.provider_for(u, "pkg.none").unwrap(), None);
    assert!(h.fw.imported_packages(u).unwrap().is_empty());
}

#[test]
fn malformed_clauses_are_reported_but_do_not_block_install() {
    let h = Harness::new();
    let u = h.install(
        MemoryArchive::new("mem:bad")
            .with_header("Export-Package", "pkg.ok;version=1.0, pkg.bad;version=x.y")
            .with_header("DynamicImport-Package", "pkg*"),
    );

    assert_eq!(h.fw.get_state(u).unwrap(), UnitState::Installed);
    assert_eq!(h.errors.count_for(u), 2);
    let exported = h.fw.exported_packages(u).unwrap();
    assert_eq!(exported.len(), 1);
    assert_eq!(exported[0].name(), "pkg.ok");
    h.fw.resolve(u).unwrap();
}

#[test]
fn reinstalling_a_location_returns_the_same_unit() {
    let h = Harness::new();
    let first = h.install(exporter("mem:same", "pkg.a", "1.0"));
    let second = h.install(exporter("mem:same", "pkg.a", "1.0"));
    assert_eq!(first, second);
    assert_eq!(h.events.count(first, UnitEventKind::Installed), 1);

    h.fw.uninstall(first).unwrap();
    let third = h.install(exporter("mem:same", "pkg.a", "1.0"));
    assert_ne!(third, first);
    assert_eq!(h.fw.location(third).unwrap(), "mem:same");
}

#[test]
fn required_unit_reexports_are_followed() {
    let h = Harness::new();
    let base = h.install(
        MemoryArchive::new("mem:base")
            .with_header("Bundle-SymbolicName", "base")
            .with_header("Export-Package", "pkg.base")
            .with_class("pkg.base.Impl"),
    );
    h.install(
        MemoryArchive::new("mem:mid")
            .with_header("Bundle-SymbolicName", "mid")
            .with_header("Require-Bundle", "base;visibility:=reexport"),
    );
    let top = h.install(
        MemoryArchive::new("mem:top")
            .with_header("Bundle-SymbolicName", "top")
            .with_header("Require-Bundle", "mid"),
    );

    h.fw.resolve(top).unwrap();
    let class = h.fw.load_class(top, "pkg.base.Impl").unwrap();
    assert_eq!(class.owner(), generation(base, 0));
}

#[test]
fn missing_required_unit_fails_resolution() {
    let h = Harness::new();
    let u = h.install(MemoryArchive::new("mem:lonely").with_header("Require-Bundle", "nobody"));
    let Err(RuntimeError::Resolution { failure, .. }) = h.fw.resolve(u) else {
        panic!("expected a resolution failure");
    };
    assert!(failure.mentions("nobody"));
}

#[test]
fn mutually_requiring_units_terminate_on_miss() {
    let h = Harness::new();
    let a = h.install(
        MemoryArchive::new("mem:a")
            .with_header("Bundle-SymbolicName", "a")
            .with_header("Require-Bundle", "b;visibility:=reexport"),
    );
    let b = h.install(
        MemoryArchive::new("mem:b")
            .with_header("Bundle-SymbolicName", "b")
            .with_header("Require-Bundle", "a;visibility:=reexport"),
    );
    h.fw.resolve(a).unwrap();
    h.fw.resolve(b).unwrap();

    assert!(h.fw.load_class(a, "pkg.nowhere.Thing").unwrap_err().is_not_found());
}

#[test]
fn fragments_attach_to_their_host() {
    let h = Harness::new();
    let host = h.install(
        MemoryArchive::new("mem:host")
            .with_header("Bundle-SymbolicName", "host")
            .with_class("host.core.Main"),
    );
    let fragment = h.install(
        MemoryArchive::new("mem:frag")
            .with_header("Fragment-Host", "host")
            .with_class("host.extra.Helper"),
    );

    h.fw.resolve(host).unwrap();
    assert_eq!(h.fw.get_state(fragment).unwrap(), UnitState::Resolved);

    let helper = h.fw.load_class(host, "host.extra.Helper").unwrap();
    assert_eq!(helper.owner(), generation(host, 0));
    assert!(matches!(
        h.fw.start(fragment),
        Err(RuntimeError::StateViolation { .. })
    ));

    h.fw.uninstall(host).unwrap();
    assert_eq!(h.fw.get_state(fragment).unwrap(), UnitState::Installed);
}

#[test]
fn fragment_without_host_cannot_resolve() {
    let h = Harness::new();
    let fragment = h.install(MemoryArchive::new("mem:frag").with_header("Fragment-Host", "absent"));
    let Err(RuntimeError::Resolution { failure, .. }) = h.fw.resolve(fragment) else {
        panic!("expected a resolution failure");
    };
    assert!(failure.mentions("absent"));

    h.install(MemoryArchive::new("mem:late").with_header("Bundle-SymbolicName", "absent"));
    h.fw.resolve(fragment).unwrap();
    assert_eq!(h.fw.get_state(fragment).unwrap(), UnitState::Resolved);
}

#[test]
fn dynamic_imports_wire_on_first_use() {
    let h = Harness::new();
    let provider = h.install(exporter("mem:p", "pkg.dyn", "1.0"));
    let consumer =
        h.install(MemoryArchive::new("mem:c").with_header("DynamicImport-Package", "pkg.*"));
    let plain = h.install(MemoryArchive::new("mem:plain"));
    h.fw.resolve(provider).unwrap();
    h.fw.resolve(consumer).unwrap();
    h.fw.resolve(plain).unwrap();

    let class = h.fw.load_class(consumer, "pkg.dyn.Impl").unwrap();
    assert_eq!(class.owner(), generation(provider, 0));
    assert_eq!(h.fw.provider_for(consumer, "pkg.dyn").unwrap(), Some(generation(provider, 0)));

    assert!(h.fw.load_class(plain, "pkg.dyn.Impl").unwrap_err().is_not_found());
    assert_eq!(h.fw.provider_for(plain, "pkg.dyn").unwrap(), None);
}

#[test]
fn capabilities_follow_the_unit() {
    let h = Harness::new();
    let u = h.install(
        MemoryArchive::new("mem:cap")
            .with_header("Provide-Capability", "lattice.service;name=db;tier:=gold"),
    );
    let caps = h.fw.capabilities("lattice.service");
    assert_eq!(caps.len(), 1);
    assert_eq!(caps[0].owner, u);

    h.fw
        .update(
            u,
            Some(Arc::new(
                MemoryArchive::new("mem:cap")
                    .with_header("Provide-Capability", "lattice.service;name=db, lattice.service;name=cache"),
            )),
        )
        .unwrap();
    assert_eq!(h.fw.capabilities("lattice.service").len(), 2);

    h.fw.uninstall(u).unwrap();
    assert!(h.fw.capabilities("lattice.service").is_empty());
    assert!(h.errors.errors().is_empty());
}
