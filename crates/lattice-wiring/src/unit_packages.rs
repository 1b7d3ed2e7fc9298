//! Per-unit package declarations and resolution bookkeeping.

use std::collections::BTreeMap;

use lattice_core::{PermissionAction, PermissionCheck, UnitGeneration, Version, VersionRange};
use tracing::{debug, warn};

use crate::entry::{PackageEntry, RequireEntry};
use crate::error::{ResolveFailure, WiringError};
use crate::manifest::{Clause, ManifestHeaders, headers, parse_header};
use crate::resolver::PackageResolver;

/// Prefix every unit may dynamically import.
const IMPLICIT_DYNAMIC_PREFIX: &str = "java.";

/// One `DynamicImport-Package` pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DynamicPattern {
    /// A literal package name.
    Exact {
        /// Package name.
        name: String,
        /// Acceptable provider versions.
        range: VersionRange,
    },
    /// Every package starting with `prefix` (which ends in a dot).
    Prefix {
        /// Name prefix including the trailing dot.
        prefix: String,
        /// Acceptable provider versions.
        range: VersionRange,
    },
}

impl DynamicPattern {
    /// Whether `pkg` matches this pattern.
    #[must_use]
    pub fn matches(&self, pkg: &str) -> bool {
        match self {
            Self::Exact { name, .. } => name == pkg,
            Self::Prefix { prefix, .. } => pkg.starts_with(prefix.as_str()),
        }
    }

    /// Version range wired packages must satisfy.
    #[must_use]
    pub fn range(&self) -> &VersionRange {
        match self {
            Self::Exact { range, .. } | Self::Prefix { range, .. } => range,
        }
    }
}

/// Everything one unit generation declares at package level, plus the
/// outcome of its last resolution.
#[derive(Debug, Clone)]
pub struct UnitPackages {
    owner: UnitGeneration,
    symbolic_name: Option<String>,
    version: Version,
    exports: Vec<PackageEntry>,
    imports: Vec<PackageEntry>,
    requires: Vec<RequireEntry>,
    /// `None` matches anything.
    dynamic: Option<Vec<DynamicPattern>>,
    declaration_errors: Vec<WiringError>,
    bound: Option<BTreeMap<String, PackageEntry>>,
    fail_reason: Option<String>,
}

impl UnitPackages {
    /// Build the declaration set from manifest headers.
    ///
    /// Malformed clauses are dropped and kept in
    /// [`declaration_errors`](Self::declaration_errors); they never make
    /// construction fail.
    #[must_use]
    pub fn parse(owner: UnitGeneration, manifest: &ManifestHeaders) -> Self {
        let mut errors = Vec::new();

        let version = match manifest.version.as_deref().map(Version::parse) {
            Some(Ok(v)) => v,
            Some(Err(source)) => {
                errors.push(WiringError::InvalidVersion {
                    header: headers::BUNDLE_VERSION.to_owned(),
                    package: manifest.symbolic_name().unwrap_or_default(),
                    source,
                });
                Version::EMPTY
            },
            None => Version::EMPTY,
        };

        let exports = parse_exports(owner, manifest.exports.as_deref(), &mut errors);

        let mut explicit = Vec::new();
        for import in parse_imports(owner, manifest.imports.as_deref(), &mut errors) {
            merge_import(&mut explicit, import);
        }
        // An explicit import keeps its own range and resolution over the
        // one synthesized from an export of the same name.
        let mut imports = Vec::new();
        for export in &exports {
            let own =
                PackageEntry::import(export.name(), VersionRange::at_least(*export.version()), owner)
                    .optional();
            merge_import(&mut imports, own);
        }
        imports.retain(|own| !explicit.iter().any(|i| i.package_equal(own)));
        imports.extend(explicit);

        let requires = parse_requires(manifest.requires.as_deref(), &mut errors);
        let dynamic = parse_dynamic(manifest.dynamic_imports.as_deref(), &mut errors);

        for err in &errors {
            warn!(owner = %owner, error = %err, "Dropped manifest clause");
        }

        Self {
            owner,
            symbolic_name: manifest.symbolic_name(),
            version,
            exports,
            imports,
            requires,
            dynamic,
            declaration_errors: errors,
            bound: None,
            fail_reason: None,
        }
    }

    /// Push declarations into the resolver. No wiring is performed.
    ///
    /// Exports the unit may not offer are left out.
    pub fn register(&self, table: &mut PackageResolver, permissions: &dyn PermissionCheck) {
        table.register_unit(
            self.owner,
            self.symbolic_name.clone(),
            self.version,
            self.requires.clone(),
        );
        let exports: Vec<PackageEntry> = self
            .exports
            .iter()
            .filter(|e| {
                let allowed =
                    permissions.allows(self.owner.unit, PermissionAction::ExportPackage, e.name());
                if !allowed {
                    debug!(owner = %self.owner, package = %e.name(), "Export not permitted");
                }
                allowed
            })
            .cloned()
            .collect();
        table.register_packages(self.owner, &exports, &self.imports);
    }

    /// Remove declarations from the resolver.
    ///
    /// Returns `false` (and keeps everything, including the resolution
    /// state) if another unit is still wired to this one and `force` is not
    /// set.
    pub fn unregister(&mut self, table: &mut PackageResolver, force: bool) -> bool {
        let removed = table.unregister_packages(self.owner, &self.exports, force);
        if removed {
            self.bound = None;
            self.fail_reason = None;
        }
        removed
    }

    /// Bind every import through the resolver.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolveFailure`] listing every denied or unsatisfied
    /// name, in encounter order. The reason is cached for
    /// [`resolve_fail_reason`](Self::resolve_fail_reason).
    pub fn resolve(
        &mut self,
        table: &mut PackageResolver,
        permissions: &dyn PermissionCheck,
    ) -> Result<(), ResolveFailure> {
        let denied = self.denied_names(permissions);
        if !denied.is_empty() {
            let failure = ResolveFailure::new(
                format!("permission denied for: {}", denied.join(", ")),
                denied,
            );
            self.fail(&failure);
            return Err(failure);
        }

        if let Some(missing) = table.check_resolve(self.owner, &self.imports) {
            let mut parts = Vec::new();
            if !missing.packages.is_empty() {
                let names: Vec<&str> = missing.packages.iter().map(PackageEntry::name).collect();
                parts.push(format!("unresolved packages: {}", names.join(", ")));
            }
            if !missing.units.is_empty() {
                let names: Vec<&str> = missing.units.iter().map(|u| u.name.as_str()).collect();
                parts.push(format!("missing required units: {}", names.join(", ")));
            }
            let failure = ResolveFailure::new(parts.join("; "), missing.names());
            self.fail(&failure);
            return Err(failure);
        }

        let bound = self
            .imports
            .iter()
            .filter(|i| table.is_wired(i))
            .map(|i| (i.name().to_owned(), i.clone()))
            .collect();
        self.bound = Some(bound);
        self.fail_reason = None;
        debug!(owner = %self.owner, "Unit packages resolved");
        Ok(())
    }

    fn denied_names(&self, permissions: &dyn PermissionCheck) -> Vec<String> {
        let unit = self.owner.unit;
        let exports = self
            .exports
            .iter()
            .filter(|e| !permissions.allows(unit, PermissionAction::ExportPackage, e.name()))
            .map(|e| e.name().to_owned());
        let imports = self
            .imports
            .iter()
            .filter(|i| !self.is_exported(i.name()))
            .filter(|i| !permissions.allows(unit, PermissionAction::ImportPackage, i.name()))
            .map(|i| i.name().to_owned());
        let requires = self
            .requires
            .iter()
            .filter(|r| !permissions.allows(unit, PermissionAction::RequireUnit, &r.name))
            .map(|r| r.name.clone());
        exports.chain(imports).chain(requires).collect()
    }

    fn fail(&mut self, failure: &ResolveFailure) {
        debug!(owner = %self.owner, reason = %failure.reason, "Unit packages failed to resolve");
        self.bound = None;
        self.fail_reason = Some(failure.reason.clone());
    }

    /// The unit that supplies `pkg` to this one.
    ///
    /// Bound static imports answer from the wiring. Other packages matching
    /// a dynamic-import pattern are wired on demand. Anything that prevents
    /// a wire (unresolved unit, no pattern, permission, no provider) yields
    /// `None`.
    pub fn provider_for(
        &mut self,
        pkg: &str,
        table: &mut PackageResolver,
        permissions: &dyn PermissionCheck,
    ) -> Option<UnitGeneration> {
        let bound = self.bound.as_mut()?;
        if bound.contains_key(pkg) {
            return table.get_provider(pkg);
        }
        if self.imports.iter().any(|i| i.name() == pkg) {
            return None;
        }

        let range = dynamic_range(self.dynamic.as_deref(), pkg)?;
        if !permissions.allows(self.owner.unit, PermissionAction::ImportPackage, pkg) {
            debug!(owner = %self.owner, package = %pkg, "Dynamic import not permitted");
            return None;
        }
        let entry = PackageEntry::import(pkg, range, self.owner);
        let provider = table.register_dynamic_import(entry.clone())?;
        bound.insert(pkg.to_owned(), entry);
        Some(provider)
    }

    /// Owning generation.
    #[must_use]
    pub fn owner(&self) -> UnitGeneration {
        self.owner
    }

    /// `Bundle-SymbolicName` without directives.
    #[must_use]
    pub fn symbolic_name(&self) -> Option<&str> {
        self.symbolic_name.as_deref()
    }

    /// `Bundle-Version`, empty if absent or malformed.
    #[must_use]
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Exports in manifest order.
    #[must_use]
    pub fn exports(&self) -> &[PackageEntry] {
        &self.exports
    }

    /// Imports, one per package name, including synthesized self-imports.
    #[must_use]
    pub fn imports(&self) -> &[PackageEntry] {
        &self.imports
    }

    /// Whole-unit requirements in declared order.
    #[must_use]
    pub fn requires(&self) -> &[RequireEntry] {
        &self.requires
    }

    /// Dynamic-import patterns; `None` matches any package.
    #[must_use]
    pub fn dynamic_patterns(&self) -> Option<&[DynamicPattern]> {
        self.dynamic.as_deref()
    }

    /// Clauses dropped while parsing.
    #[must_use]
    pub fn declaration_errors(&self) -> &[WiringError] {
        &self.declaration_errors
    }

    /// Whether the last resolution succeeded.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.bound.is_some()
    }

    /// Reason of the last failed resolution.
    #[must_use]
    pub fn resolve_fail_reason(&self) -> Option<&str> {
        self.fail_reason.as_deref()
    }

    /// Bound entry for `pkg`, static or dynamic.
    #[must_use]
    pub fn bound_import(&self, pkg: &str) -> Option<&PackageEntry> {
        self.bound.as_ref().and_then(|b| b.get(pkg))
    }

    /// All bound entries, ordered by package name.
    pub fn bound_imports(&self) -> impl Iterator<Item = &PackageEntry> {
        self.bound.iter().flat_map(BTreeMap::values)
    }

    /// Whether the unit exports `pkg`.
    #[must_use]
    pub fn is_exported(&self, pkg: &str) -> bool {
        self.exports.iter().any(|e| e.name() == pkg)
    }

    /// Whether the unit statically imports `pkg`.
    #[must_use]
    pub fn is_imported(&self, pkg: &str) -> bool {
        self.imports.iter().any(|i| i.name() == pkg)
    }

    /// Whether `pkg` matches a dynamic-import pattern.
    #[must_use]
    pub fn dynamic_matches(&self, pkg: &str) -> bool {
        dynamic_range(self.dynamic.as_deref(), pkg).is_some()
    }
}

fn dynamic_range(patterns: Option<&[DynamicPattern]>, pkg: &str) -> Option<VersionRange> {
    if pkg.starts_with(IMPLICIT_DYNAMIC_PREFIX) {
        return Some(VersionRange::ANY);
    }
    match patterns {
        None => Some(VersionRange::ANY),
        Some(list) => list.iter().find(|p| p.matches(pkg)).map(|p| *p.range()),
    }
}

fn merge_import(imports: &mut Vec<PackageEntry>, import: PackageEntry) {
    match imports.iter().position(|i| i.package_equal(&import)) {
        Some(pos) => {
            if import.supersedes(&imports[pos]) {
                imports[pos] = import;
            }
        },
        None => imports.push(import),
    }
}

fn clause_range(
    clause: &Clause,
    key: Option<&str>,
    header: &str,
    errors: &mut Vec<WiringError>,
) -> Option<VersionRange> {
    let raw = match key {
        Some(k) => clause.attribute(k),
        None => clause.version_attribute(),
    };
    match raw.map(VersionRange::parse) {
        None => Some(VersionRange::ANY),
        Some(Ok(range)) => Some(range),
        Some(Err(source)) => {
            errors.push(WiringError::InvalidVersion {
                header: header.to_owned(),
                package: clause.names.join(";"),
                source,
            });
            None
        },
    }
}

fn parse_exports(
    owner: UnitGeneration,
    value: Option<&str>,
    errors: &mut Vec<WiringError>,
) -> Vec<PackageEntry> {
    let mut out = Vec::new();
    for clause in parse_header(value.unwrap_or_default()) {
        let version = match clause.version_attribute().map(Version::parse) {
            None => Version::EMPTY,
            Some(Ok(v)) => v,
            Some(Err(source)) => {
                errors.push(WiringError::InvalidVersion {
                    header: headers::EXPORT_PACKAGE.to_owned(),
                    package: clause.names.join(";"),
                    source,
                });
                continue;
            },
        };
        out.extend(
            clause
                .names
                .iter()
                .map(|n| PackageEntry::export(n.as_str(), version, owner)),
        );
    }
    out
}

fn parse_imports(
    owner: UnitGeneration,
    value: Option<&str>,
    errors: &mut Vec<WiringError>,
) -> Vec<PackageEntry> {
    let mut out = Vec::new();
    for clause in parse_header(value.unwrap_or_default()) {
        let Some(range) = clause_range(&clause, None, headers::IMPORT_PACKAGE, errors) else {
            continue;
        };
        let optional = clause.directive("resolution") == Some("optional");
        for name in &clause.names {
            let entry = PackageEntry::import(name.as_str(), range, owner);
            out.push(if optional { entry.optional() } else { entry });
        }
    }
    out
}

fn parse_requires(value: Option<&str>, errors: &mut Vec<WiringError>) -> Vec<RequireEntry> {
    let mut out = Vec::new();
    for clause in parse_header(value.unwrap_or_default()) {
        let Some(range) =
            clause_range(&clause, Some("bundle-version"), headers::REQUIRE_BUNDLE, errors)
        else {
            continue;
        };
        let reexport = clause.directive("visibility") == Some("reexport");
        let optional = clause.directive("resolution") == Some("optional");
        for name in &clause.names {
            let mut req = RequireEntry::new(name.as_str(), range);
            req.reexport = reexport;
            req.optional = optional;
            out.push(req);
        }
    }
    out
}

fn parse_dynamic(
    value: Option<&str>,
    errors: &mut Vec<WiringError>,
) -> Option<Vec<DynamicPattern>> {
    let mut patterns = Vec::new();
    let mut any = false;
    for clause in parse_header(value.unwrap_or_default()) {
        let Some(range) =
            clause_range(&clause, None, headers::DYNAMIC_IMPORT_PACKAGE, errors)
        else {
            continue;
        };
        for name in &clause.names {
            match dynamic_pattern(name, &range) {
                Ok(Some(p)) => patterns.push(p),
                Ok(None) => any = true,
                Err(message) => errors.push(WiringError::InvalidClause {
                    header: headers::DYNAMIC_IMPORT_PACKAGE.to_owned(),
                    clause: name.clone(),
                    message,
                }),
            }
        }
    }
    (!any).then_some(patterns)
}

/// `Ok(None)` is the universal wildcard.
fn dynamic_pattern(name: &str, range: &VersionRange) -> Result<Option<DynamicPattern>, String> {
    if name == "*" {
        return Ok(None);
    }
    if let Some(stem) = name.strip_suffix('*') {
        if !stem.ends_with('.') || stem.contains('*') || stem.len() < 2 {
            return Err("wildcard must follow a package prefix as 'pkg.*'".to_owned());
        }
        return Ok(Some(DynamicPattern::Prefix {
            prefix: stem.to_owned(),
            range: *range,
        }));
    }
    if name.contains('*') {
        return Err("wildcard is only allowed at the end".to_owned());
    }
    if name.ends_with('.') {
        return Err("package name must not end with a dot".to_owned());
    }
    Ok(Some(DynamicPattern::Exact {
        name: name.to_owned(),
        range: *range,
    }))
}

#[cfg(test)]
mod tests {
    use lattice_core::{AllowAll, UnitId};
    use lattice_test::DenyList;

    use super::*;

    fn g(id: u64) -> UnitGeneration {
        UnitGeneration::new(UnitId(id), 0)
    }

    #[test]
    fn duplicate_imports_keep_highest_version() {
        let m = ManifestHeaders::default().with_imports("p;version=1.0, p;version=1.5");
        let pkgs = UnitPackages::parse(g(1), &m);
        assert_eq!(pkgs.imports().len(), 1);
        assert_eq!(pkgs.imports()[0].version(), &Version::parse("1.5").unwrap());

        let m = ManifestHeaders::default().with_imports("p;version=1.5, p;version=1.0");
        let pkgs = UnitPackages::parse(g(1), &m);
        assert_eq!(pkgs.imports().len(), 1);
        assert_eq!(pkgs.imports()[0].version(), &Version::parse("1.5").unwrap());
    }

    #[test]
    fn exports_keep_order_and_synthesize_optional_self_imports() {
        let m = ManifestHeaders::default().with_exports("b;version=2, a, b;version=1");
        let pkgs = UnitPackages::parse(g(1), &m);
        let names: Vec<&str> = pkgs.exports().iter().map(PackageEntry::name).collect();
        assert_eq!(names, vec!["b", "a", "b"]);
        assert_eq!(pkgs.imports().len(), 2);
        assert!(pkgs.imports().iter().all(PackageEntry::is_optional));
        assert!(pkgs.is_exported("a"));
        assert!(pkgs.is_imported("a"));
    }

    #[test]
    fn duplicate_exports_synthesize_one_self_import_at_the_highest_version() {
        let m = ManifestHeaders::default().with_exports("b;version=1, a, b;version=2");
        let pkgs = UnitPackages::parse(g(1), &m);
        let names: Vec<&str> = pkgs.imports().iter().map(PackageEntry::name).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(pkgs.imports()[0].version(), &Version::parse("2").unwrap());
    }

    #[test]
    fn explicit_import_overrides_the_self_import() {
        let m = ManifestHeaders::default()
            .with_exports("p;version=2, q;version=3, q;version=1")
            .with_imports("p;version=\"[1.0,2.0)\", q;version=1");
        let pkgs = UnitPackages::parse(g(1), &m);
        assert_eq!(pkgs.imports().len(), 2);
        for import in pkgs.imports() {
            assert!(!import.is_optional(), "{import} became optional");
        }
        let p = pkgs.imports().iter().find(|i| i.name() == "p").unwrap();
        assert_eq!(p.range(), Some(&VersionRange::parse("[1.0,2.0)").unwrap()));
        let q = pkgs.imports().iter().find(|i| i.name() == "q").unwrap();
        assert_eq!(q.version(), &Version::parse("1").unwrap());
    }

    #[test]
    fn dynamic_patterns_parse_and_match() {
        let m = ManifestHeaders::default().with_dynamic_imports("org.x.*, org.y.Exact");
        let pkgs = UnitPackages::parse(g(1), &m);
        assert!(pkgs.declaration_errors().is_empty());
        assert!(pkgs.dynamic_matches("org.x.sub"));
        assert!(pkgs.dynamic_matches("org.y.Exact"));
        assert!(!pkgs.dynamic_matches("org.y.Other"));
        assert!(pkgs.dynamic_matches("java.util"));
    }

    #[test]
    fn universal_wildcard_matches_everything() {
        let m = ManifestHeaders::default().with_dynamic_imports("org.x.*, *");
        let pkgs = UnitPackages::parse(g(1), &m);
        assert!(pkgs.dynamic_patterns().is_none());
        assert!(pkgs.dynamic_matches("anything.at.all"));
    }

    #[test]
    fn malformed_dynamic_clauses_are_dropped_and_reported() {
        let m = ManifestHeaders::default().with_dynamic_imports("org.bad., org.*.x, org.ok.*");
        let pkgs = UnitPackages::parse(g(1), &m);
        assert_eq!(pkgs.declaration_errors().len(), 2);
        assert_eq!(pkgs.dynamic_patterns().map(<[_]>::len), Some(1));
        assert!(pkgs.dynamic_matches("org.ok.y"));
    }

    #[test]
    fn missing_dynamic_header_only_allows_java() {
        let pkgs = UnitPackages::parse(g(1), &ManifestHeaders::default());
        assert!(pkgs.dynamic_matches("java.lang"));
        assert!(!pkgs.dynamic_matches("javax.swing"));
    }

    #[test]
    fn bad_versions_drop_only_their_clause() {
        let m = ManifestHeaders::default()
            .with_exports("a;version=x.y, b;version=1")
            .with_imports("c;version=\"[1,\", d");
        let pkgs = UnitPackages::parse(g(1), &m);
        assert_eq!(pkgs.declaration_errors().len(), 2);
        assert_eq!(pkgs.exports().len(), 1);
        assert!(pkgs.is_imported("d"));
        assert!(!pkgs.is_imported("c"));
    }

    #[test]
    fn requires_read_visibility_and_resolution() {
        let m = ManifestHeaders::default().with_requires(
            "lib.a;bundle-version=\"[1.0,2.0)\";visibility:=reexport, lib.b;resolution:=optional",
        );
        let pkgs = UnitPackages::parse(g(1), &m);
        assert_eq!(pkgs.requires().len(), 2);
        assert!(pkgs.requires()[0].reexport);
        assert!(!pkgs.requires()[0].optional);
        assert!(pkgs.requires()[1].optional);
    }

    #[test]
    fn failed_resolution_lists_every_missing_package() {
        let mut table = PackageResolver::new();
        let m = ManifestHeaders::default().with_imports("pkg.a;version=2.0, pkg.b");
        let mut pkgs = UnitPackages::parse(g(1), &m);
        pkgs.register(&mut table, &AllowAll);

        let failure = pkgs.resolve(&mut table, &AllowAll).unwrap_err();
        assert!(failure.mentions("pkg.a"));
        assert!(failure.mentions("pkg.b"));
        assert!(!pkgs.is_resolved());
        let reason = pkgs.resolve_fail_reason().unwrap();
        assert!(reason.find("pkg.a").unwrap() < reason.find("pkg.b").unwrap());
    }

    #[test]
    fn denied_declarations_fail_resolution_together() {
        let mut table = PackageResolver::new();
        let deny = DenyList::new().deny_target("pkg.x").deny_target("pkg.y");
        let m = ManifestHeaders::default()
            .with_exports("pkg.x")
            .with_imports("pkg.y");
        let mut pkgs = UnitPackages::parse(g(1), &m);
        pkgs.register(&mut table, &deny);
        assert!(table.pkg("pkg.x").map_or(true, |p| p.candidates().is_empty()));

        let failure = pkgs.resolve(&mut table, &deny).unwrap_err();
        assert_eq!(failure.missing, vec!["pkg.x", "pkg.y"]);
    }

    #[test]
    fn dynamic_provider_is_cached_after_first_wire() {
        let mut table = PackageResolver::new();
        let provider = UnitPackages::parse(g(1), &ManifestHeaders::default().with_exports("dyn.a"));
        provider.register(&mut table, &AllowAll);
        let mut consumer =
            UnitPackages::parse(g(2), &ManifestHeaders::default().with_dynamic_imports("dyn.*"));
        consumer.register(&mut table, &AllowAll);
        assert_eq!(consumer.provider_for("dyn.a", &mut table, &AllowAll), None);

        consumer.resolve(&mut table, &AllowAll).unwrap();
        assert_eq!(consumer.provider_for("dyn.a", &mut table, &AllowAll), Some(g(1)));
        assert!(consumer.bound_import("dyn.a").is_some());
        assert_eq!(consumer.provider_for("dyn.b", &mut table, &AllowAll), None);
        assert_eq!(consumer.provider_for("other", &mut table, &AllowAll), None);
    }

    #[test]
    fn denied_dynamic_import_yields_none() {
        let mut table = PackageResolver::new();
        let provider = UnitPackages::parse(g(1), &ManifestHeaders::default().with_exports("dyn.a"));
        provider.register(&mut table, &AllowAll);
        let mut consumer =
            UnitPackages::parse(g(2), &ManifestHeaders::default().with_dynamic_imports("*"));
        consumer.register(&mut table, &AllowAll);
        consumer.resolve(&mut table, &AllowAll).unwrap();

        let deny = DenyList::new().deny_target("dyn.a");
        assert_eq!(consumer.provider_for("dyn.a", &mut table, &deny), None);
    }

    #[test]
    fn unregister_clears_resolution_only_when_removed() {
        let mut table = PackageResolver::new();
        let mut provider =
            UnitPackages::parse(g(1), &ManifestHeaders::default().with_exports("pkg.a"));
        provider.register(&mut table, &AllowAll);
        provider.resolve(&mut table, &AllowAll).unwrap();
        let mut consumer =
            UnitPackages::parse(g(2), &ManifestHeaders::default().with_imports("pkg.a"));
        consumer.register(&mut table, &AllowAll);
        consumer.resolve(&mut table, &AllowAll).unwrap();

        assert!(!provider.unregister(&mut table, false));
        assert!(provider.is_resolved());
        assert!(consumer.unregister(&mut table, false));
        assert!(!consumer.is_resolved());
        assert!(provider.unregister(&mut table, false));
    }
}
