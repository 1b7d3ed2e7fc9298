//! Delegating search order of module loaders.

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use common::{Harness, generation};
use lattice_config::Config;
use lattice_core::UnitId;
use lattice_runtime::{ListOptions, RuntimeError};
use lattice_test::{MemoryArchive, exporter, importer};

#[test]
fn bound_import_is_authoritative_over_local_code() {
    let h = Harness::new();
    let provider = h.install(exporter("mem:p", "pkg.c", "1.0"));
    let consumer = h.install(
        importer("mem:c", "pkg.c", "1.0")
            .with_class("pkg.c.Local")
            .with_class("pkg.c.Impl"),
    );
    h.fw.resolve(consumer).unwrap();

    // Provided by the import, not by the consumer's own copy.
    let class = h.fw.load_class(consumer, "pkg.c.Impl").unwrap();
    assert_eq!(class.owner(), generation(provider, 0));

    // The provider misses; the local copy must not be used.
    let err = h.fw.load_class(consumer, "pkg.c.Local").unwrap_err();
    assert!(matches!(err, RuntimeError::ClassNotFound { unit, .. } if unit == consumer));
}

#[test]
fn unwired_declared_package_never_falls_through_to_dynamic_import() {
    let h = Harness::new();
    let greedy = h.install(
        MemoryArchive::new("mem:greedy")
            .with_header("Import-Package", "pkg.late;resolution:=optional")
            .with_header("DynamicImport-Package", "*"),
    );
    let open = h.install(MemoryArchive::new("mem:open").with_header("DynamicImport-Package", "*"));
    h.fw.resolve(greedy).unwrap();
    h.fw.resolve(open).unwrap();

    let late = h.install(exporter("mem:late", "pkg.late", "1.0"));
    h.fw.resolve(late).unwrap();

    assert!(h.fw.load_class(greedy, "pkg.late.Impl").unwrap_err().is_not_found());
    let class = h.fw.load_class(open, "pkg.late.Impl").unwrap();
    assert_eq!(class.owner(), generation(late, 0));
}

#[test]
fn local_code_serves_undeclared_packages() {
    let h = Harness::new();
    let u = h.install(MemoryArchive::new("mem:u").with_class("own.Thing"));
    let class = h.fw.load_class(u, "own.Thing").unwrap();
    assert_eq!(class.owner(), generation(u, 0));
    assert_eq!(class.name(), "own.Thing");
    assert_eq!(class.bytes(), b"own.Thing");

    // Loaded once, then served from the loader's cache.
    let again = h.fw.load_class(u, "own.Thing").unwrap();
    assert!(Arc::ptr_eq(&class, &again));
}

#[test]
fn boot_delegation_goes_to_the_system_unit_first() {
    let h = Harness::with(|b| {
        b.system_archive(Arc::new(
            MemoryArchive::new("system").with_class("java.lang.Object"),
        ))
    });
    let u = h.install(MemoryArchive::new("mem:u").with_class("java.lang.Object"));

    let class = h.fw.load_class(u, "java.lang.Object").unwrap();
    assert_eq!(class.owner().unit, UnitId::SYSTEM);
}

#[test]
fn system_packages_are_exported_by_the_system_unit() {
    let mut config = Config::default();
    config.framework.system_packages = vec!["host.api;version=2.0".to_owned()];
    let h = Harness::with_config(config);
    let u = h.install(importer("mem:u", "host.api", "[2.0,3.0)"));

    h.fw.resolve(u).unwrap();
    assert_eq!(
        h.fw.provider_for(u, "host.api").unwrap(),
        Some(generation(UnitId::SYSTEM, 0))
    );
    assert_eq!(h.fw.symbolic_name(UnitId::SYSTEM).unwrap().as_deref(), Some("lattice.system"));
}

#[test]
fn resources_follow_the_same_delegation() {
    let h = Harness::new();
    let provider = h.install(
        exporter("mem:p", "pkg.a", "1.0").with_entry("pkg/a/defaults.toml", b"answer = 42".to_vec()),
    );
    let consumer = h.install(
        importer("mem:c", "pkg.a", "1.0")
            .with_entry("pkg/a/defaults.toml", b"shadowed".to_vec())
            .with_entry("own/readme.txt", b"hello".to_vec()),
    );
    h.fw.resolve(consumer).unwrap();

    let res = h.fw.find_resource(consumer, "/pkg/a/defaults.toml").unwrap();
    assert_eq!(res.owner, generation(provider, 0));
    assert_eq!(&*res.bytes, b"answer = 42");

    let own = h.fw.find_resource(consumer, "own/readme.txt").unwrap();
    assert_eq!(own.owner, generation(consumer, 0));

    assert!(matches!(
        h.fw.find_resource(consumer, "own/missing.txt"),
        Err(RuntimeError::ResourceNotFound { .. })
    ));
}

#[test]
fn listing_merges_required_units_and_recurses() {
    let h = Harness::new();
    h.install(
        MemoryArchive::new("mem:lib")
            .with_header("Bundle-SymbolicName", "lib")
            .with_header("Export-Package", "conf")
            .with_entry("conf/lib.toml", Vec::new())
            .with_entry("conf/shared.toml", Vec::new()),
    );
    let app = h.install(
        MemoryArchive::new("mem:app")
            .with_header("Require-Bundle", "lib")
            .with_entry("conf/app.toml", Vec::new())
            .with_entry("conf/shared.toml", Vec::new())
            .with_entry("conf/notes.txt", Vec::new())
            .with_entry("conf/env/prod.toml", Vec::new()),
    );
    h.fw.resolve(app).unwrap();

    let flat = h.fw.list_resources(app, "conf", "*.toml", ListOptions::default()).unwrap();
    assert_eq!(flat, vec!["conf/app.toml", "conf/lib.toml", "conf/shared.toml"]);

    let deep = h
        .fw
        .list_resources(app, "/conf/", "*.toml", ListOptions {
            recurse: true,
            local_only: false,
        })
        .unwrap();
    assert_eq!(deep, vec![
        "conf/app.toml",
        "conf/env/prod.toml",
        "conf/lib.toml",
        "conf/shared.toml"
    ]);

    let local = h
        .fw
        .list_resources(app, "conf", "*", ListOptions {
            recurse: false,
            local_only: true,
        })
        .unwrap();
    assert_eq!(local, vec!["conf/app.toml", "conf/notes.txt", "conf/shared.toml"]);

    assert!(matches!(
        h.fw.list_resources(app, "conf", "[", ListOptions::default()),
        Err(RuntimeError::InvalidArgument(_))
    ));
}

#[test]
fn native_libraries_come_from_the_archive() {
    let h = Harness::new();
    let u = h.install(
        MemoryArchive::new("mem:native").with_native_library("libcodec.so", "/opt/lib/libcodec.so"),
    );
    assert_eq!(
        h.fw.find_native_library(u, "codec").unwrap(),
        Some(PathBuf::from("/opt/lib/libcodec.so"))
    );
    assert_eq!(h.fw.find_native_library(u, "missing").unwrap(), None);
}

#[test]
fn closed_loader_serves_only_what_it_already_defined() {
    let h = Harness::new();
    let u = h.install(MemoryArchive::new("mem:u").with_class("a.Loaded").with_class("a.Never"));
    let loader = h.fw.loader(u).unwrap();
    loader.load_class("a.Loaded").unwrap();

    h.fw.update(u, None).unwrap();

    assert!(loader.is_closed());
    assert!(loader.load_class("a.Loaded").is_ok());
    assert!(loader.load_class("a.Never").unwrap_err().is_not_found());
    // The new generation has a fresh loader that sees everything.
    let fresh = h.fw.loader(u).unwrap();
    assert_eq!(fresh.owner(), generation(u, 1));
    assert!(fresh.load_class("a.Never").is_ok());
}
