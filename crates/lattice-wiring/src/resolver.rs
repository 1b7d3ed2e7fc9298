//! The global package wiring registry.
//!
//! [`PackageResolver`] owns one [`Pkg`] node per package name. A node keeps
//! the candidate exports registered under that name, the provider currently
//! wired (at most one at a time) and the import entries bound to it.
//! Imports refer to their provider only through the node, never directly.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use lattice_core::{UnitGeneration, Version};
use tracing::{debug, trace};

use crate::entry::{PackageEntry, RequireEntry};
use crate::error::{WiringError, WiringResult};

/// Wiring node for one package name.
#[derive(Debug, Clone)]
pub struct Pkg {
    name: String,
    providers: Vec<PackageEntry>,
    provider: Option<PackageEntry>,
    importers: Vec<PackageEntry>,
    pending: Vec<PackageEntry>,
}

impl Pkg {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            providers: Vec::new(),
            provider: None,
            importers: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Package name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every registered export of this package.
    #[must_use]
    pub fn candidates(&self) -> &[PackageEntry] {
        &self.providers
    }

    /// The export currently wired as provider.
    #[must_use]
    pub fn provider(&self) -> Option<&PackageEntry> {
        self.provider.as_ref()
    }

    /// Import entries bound to this package.
    #[must_use]
    pub fn importers(&self) -> &[PackageEntry] {
        &self.importers
    }

    /// Registered imports that are not bound yet.
    #[must_use]
    pub fn pending(&self) -> &[PackageEntry] {
        &self.pending
    }

    fn has_importers_besides(&self, owner: UnitGeneration) -> bool {
        self.importers.iter().any(|i| i.owner() != owner)
    }

    fn is_unused(&self) -> bool {
        self.providers.is_empty() && self.importers.is_empty() && self.pending.is_empty()
    }
}

/// Whole-unit data the resolver needs for require-style wiring.
#[derive(Debug, Clone)]
struct UnitRecord {
    symbolic_name: Option<String>,
    version: Version,
    exports: BTreeSet<String>,
    requires: Vec<RequireEntry>,
    wired_requires: Vec<(UnitGeneration, bool)>,
}

/// Imports and requirements a resolution attempt could not satisfy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Unsatisfied {
    /// Unsatisfied imports in declaration order.
    pub packages: Vec<PackageEntry>,
    /// Unsatisfied whole-unit requirements in declaration order.
    pub units: Vec<RequireEntry>,
}

impl Unsatisfied {
    /// Whether nothing is missing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty() && self.units.is_empty()
    }

    /// Offending names, packages first.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.packages
            .iter()
            .map(|p| p.name().to_owned())
            .chain(self.units.iter().map(|u| u.name.clone()))
            .collect()
    }
}

/// The universe of `Pkg` nodes plus per-generation require bookkeeping.
#[derive(Debug, Default)]
pub struct PackageResolver {
    pkgs: BTreeMap<String, Pkg>,
    units: BTreeMap<UnitGeneration, UnitRecord>,
}

impl PackageResolver {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a unit generation's identity and requirements.
    pub fn register_unit(
        &mut self,
        owner: UnitGeneration,
        symbolic_name: Option<String>,
        version: Version,
        requires: Vec<RequireEntry>,
    ) {
        self.units.insert(
            owner,
            UnitRecord {
                symbolic_name,
                version,
                exports: BTreeSet::new(),
                requires,
                wired_requires: Vec::new(),
            },
        );
    }

    /// Add exports as provider candidates and imports as pending demand.
    /// No wiring happens here.
    pub fn register_packages(
        &mut self,
        owner: UnitGeneration,
        exports: &[PackageEntry],
        imports: &[PackageEntry],
    ) {
        for export in exports {
            let pkg = self
                .pkgs
                .entry(export.name().to_owned())
                .or_insert_with(|| Pkg::new(export.name()));
            if !pkg.providers.contains(export) {
                pkg.providers.push(export.clone());
            }
            if let Some(record) = self.units.get_mut(&owner) {
                record.exports.insert(export.name().to_owned());
            }
        }
        for import in imports {
            let pkg = self
                .pkgs
                .entry(import.name().to_owned())
                .or_insert_with(|| Pkg::new(import.name()));
            if !pkg.pending.iter().any(|p| p.owner() == owner) {
                pkg.pending.push(import.clone());
            }
        }
        trace!(
            owner = %owner,
            exports = exports.len(),
            imports = imports.len(),
            "Registered packages"
        );
    }

    /// Remove a generation's exports and imports.
    ///
    /// Unless `force` is set, nothing is removed and `false` is returned
    /// when another generation is still wired to one of the exports or
    /// requires this generation.
    pub fn unregister_packages(
        &mut self,
        owner: UnitGeneration,
        exports: &[PackageEntry],
        force: bool,
    ) -> bool {
        if !force {
            if let Some(pkg) = exports.iter().find_map(|e| self.blocking_pkg(owner, e)) {
                debug!(owner = %owner, package = %pkg, "Exports still wired; keeping declarations");
                return false;
            }
            if self.is_required_by_others(owner) {
                debug!(owner = %owner, "Unit still required; keeping declarations");
                return false;
            }
        }

        for export in exports {
            if let Some(pkg) = self.pkgs.get_mut(export.name()) {
                pkg.providers.retain(|p| p != export);
                if pkg.provider.as_ref().is_some_and(|p| p.owner() == owner) {
                    pkg.provider = None;
                }
            }
        }
        for pkg in self.pkgs.values_mut() {
            pkg.importers.retain(|i| i.owner() != owner);
            pkg.pending.retain(|i| i.owner() != owner);
        }
        self.pkgs.retain(|_, pkg| !pkg.is_unused());

        self.units.remove(&owner);
        if force {
            for record in self.units.values_mut() {
                record.wired_requires.retain(|(g, _)| *g != owner);
            }
        }
        debug!(owner = %owner, force, "Unregistered packages");
        true
    }

    fn blocking_pkg(&self, owner: UnitGeneration, export: &PackageEntry) -> Option<String> {
        let pkg = self.pkgs.get(export.name())?;
        let wired_here = pkg.provider.as_ref().is_some_and(|p| p == export);
        (wired_here && pkg.has_importers_besides(owner)).then(|| pkg.name.clone())
    }

    fn is_required_by_others(&self, owner: UnitGeneration) -> bool {
        self.units
            .iter()
            .any(|(g, r)| *g != owner && r.wired_requires.iter().any(|(w, _)| *w == owner))
    }

    /// Try to bind every import (and requirement) of `owner`.
    ///
    /// Nothing is bound unless everything mandatory can be; in that case
    /// `None` is returned and all bindings are committed. Otherwise every
    /// unsatisfied entry is reported, not just the first.
    pub fn check_resolve(
        &mut self,
        owner: UnitGeneration,
        imports: &[PackageEntry],
    ) -> Option<Unsatisfied> {
        let mut missing = Unsatisfied::default();
        let mut wires = Vec::new();
        for import in imports {
            match self.select_provider(import) {
                Some(provider) => wires.push((import.clone(), provider)),
                None if import.is_optional() => {
                    trace!(owner = %owner, package = %import.name(), "Optional import left unbound");
                },
                None => missing.packages.push(import.clone()),
            }
        }

        let mut required = Vec::new();
        let requires = self
            .units
            .get(&owner)
            .map(|r| r.requires.clone())
            .unwrap_or_default();
        for req in &requires {
            match self.select_required(owner, req) {
                Some(generation) => required.push((generation, req.reexport)),
                None if req.optional => {},
                None => missing.units.push(req.clone()),
            }
        }

        if !missing.is_empty() {
            debug!(owner = %owner, missing = ?missing.names(), "Resolution failed");
            return Some(missing);
        }

        for (import, provider) in wires {
            self.commit_wire(import, provider);
        }
        if let Some(record) = self.units.get_mut(&owner) {
            record.wired_requires = required;
        }
        None
    }

    /// Candidate rule: the wired provider if it still satisfies the import,
    /// otherwise the highest satisfying version. A wired provider that does
    /// not satisfy the import is never replaced while others are bound to it.
    /// Older generations of the importing unit are never candidates.
    fn select_provider(&self, import: &PackageEntry) -> Option<PackageEntry> {
        let pkg = self.pkgs.get(import.name())?;
        if let Some(current) = &pkg.provider {
            if import.is_satisfied_by(current) && !is_stale_self(import, current) {
                return Some(current.clone());
            }
            if pkg.has_importers_besides(import.owner()) {
                return None;
            }
        }
        pkg.providers
            .iter()
            .filter(|e| import.is_satisfied_by(e) && !is_stale_self(import, e))
            .max_by(|a, b| {
                a.version()
                    .compare(b.version())
                    .then_with(|| b.owner().cmp(&a.owner()))
            })
            .cloned()
    }

    fn select_required(&self, owner: UnitGeneration, req: &RequireEntry) -> Option<UnitGeneration> {
        self.units
            .iter()
            .filter(|(g, r)| {
                g.unit != owner.unit
                    && r.symbolic_name.as_deref() == Some(req.name.as_str())
                    && req.range.contains(&r.version)
            })
            .max_by(|(ga, a), (gb, b)| {
                a.version
                    .compare(&b.version)
                    .then_with(|| gb.cmp(ga))
            })
            .map(|(g, _)| *g)
    }

    fn commit_wire(&mut self, import: PackageEntry, provider: PackageEntry) {
        let Some(pkg) = self.pkgs.get_mut(import.name()) else {
            return;
        };
        if pkg.provider.as_ref() != Some(&provider) {
            debug!(
                package = %pkg.name,
                provider = %provider.owner(),
                "Wired package provider"
            );
            pkg.provider = Some(provider);
        }
        let owner = import.owner();
        pkg.pending.retain(|p| p.owner() != owner);
        if !pkg.importers.iter().any(|i| i.owner() == owner) {
            pkg.importers.push(import);
        }
    }

    /// Owning generation of the current provider of `pkg`.
    #[must_use]
    pub fn get_provider(&self, pkg: &str) -> Option<UnitGeneration> {
        self.provider_entry(pkg).map(PackageEntry::owner)
    }

    /// The export currently wired for `pkg`.
    #[must_use]
    pub fn provider_entry(&self, pkg: &str) -> Option<&PackageEntry> {
        self.pkgs.get(pkg).and_then(|p| p.provider.as_ref())
    }

    /// The wiring node for `pkg`.
    #[must_use]
    pub fn pkg(&self, pkg: &str) -> Option<&Pkg> {
        self.pkgs.get(pkg)
    }

    /// Whether `import` is currently bound.
    #[must_use]
    pub fn is_wired(&self, import: &PackageEntry) -> bool {
        self.pkgs
            .get(import.name())
            .is_some_and(|p| p.importers.iter().any(|i| i.owner() == import.owner()))
    }

    /// Wire one import that was not part of the static import list.
    /// Afterwards it is indistinguishable from a static wire.
    pub fn register_dynamic_import(&mut self, entry: PackageEntry) -> Option<UnitGeneration> {
        let provider = self.select_provider(&entry)?;
        let owner = provider.owner();
        debug!(
            importer = %entry.owner(),
            package = %entry.name(),
            provider = %owner,
            "Dynamic import wired"
        );
        self.commit_wire(entry, provider);
        Some(owner)
    }

    /// Required generations of `owner`, in declared order, that may supply
    /// `pkg`: those exporting it directly and those reexporting their own
    /// requirements. `None` if there are none.
    #[must_use]
    pub fn get_required_unit_generations(
        &self,
        owner: UnitGeneration,
        pkg: &str,
    ) -> Option<Vec<UnitGeneration>> {
        let record = self.units.get(&owner)?;
        let found: Vec<UnitGeneration> = record
            .wired_requires
            .iter()
            .map(|(g, _)| *g)
            .filter(|g| {
                self.units.get(g).is_some_and(|r| {
                    r.exports.contains(pkg) || r.wired_requires.iter().any(|(_, re)| *re)
                })
            })
            .collect();
        (!found.is_empty()).then_some(found)
    }

    /// Requirements of `owner` marked for reexport, in declared order.
    #[must_use]
    pub fn reexported_generations(&self, owner: UnitGeneration) -> Vec<UnitGeneration> {
        self.units
            .get(&owner)
            .map(|r| {
                r.wired_requires
                    .iter()
                    .filter(|(_, re)| *re)
                    .map(|(g, _)| *g)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every generation wired by `owner`'s requirements, in declared order.
    #[must_use]
    pub fn required_generations(&self, owner: UnitGeneration) -> Vec<UnitGeneration> {
        self.units
            .get(&owner)
            .map(|r| r.wired_requires.iter().map(|(g, _)| *g).collect())
            .unwrap_or_default()
    }

    /// Whether `owner` registered an export of `pkg`.
    #[must_use]
    pub fn exports_package(&self, owner: UnitGeneration, pkg: &str) -> bool {
        self.units.get(&owner).is_some_and(|r| r.exports.contains(pkg))
    }

    /// Whether any declarations of `owner` are still registered.
    #[must_use]
    pub fn is_registered(&self, owner: UnitGeneration) -> bool {
        self.units.contains_key(&owner)
    }

    /// Generations wired to `owner`'s exports or requiring it.
    #[must_use]
    pub fn dependents_of(&self, owner: UnitGeneration) -> Vec<UnitGeneration> {
        let mut out = BTreeSet::new();
        for pkg in self.pkgs.values() {
            if pkg.provider.as_ref().is_some_and(|p| p.owner() == owner) {
                out.extend(
                    pkg.importers
                        .iter()
                        .map(PackageEntry::owner)
                        .filter(|o| *o != owner),
                );
            }
        }
        for (g, r) in &self.units {
            if r.wired_requires.iter().any(|(w, _)| *w == owner) {
                out.insert(*g);
            }
        }
        out.into_iter().collect()
    }
}

/// `candidate` belongs to an earlier generation of the importing unit.
fn is_stale_self(import: &PackageEntry, candidate: &PackageEntry) -> bool {
    candidate.owner().unit == import.owner().unit && candidate.owner() != import.owner()
}

/// The process-wide resolution lock around a [`PackageResolver`].
///
/// Take this before any unit-level lock when both are needed.
#[derive(Debug, Default)]
pub struct SharedResolver {
    inner: RwLock<PackageResolver>,
}

impl SharedResolver {
    /// Create an empty, shared registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared access for lookups.
    ///
    /// # Errors
    ///
    /// Returns [`WiringError::LockPoisoned`] if a writer panicked.
    pub fn read(&self) -> WiringResult<RwLockReadGuard<'_, PackageResolver>> {
        self.inner
            .read()
            .map_err(|e| WiringError::LockPoisoned(e.to_string()))
    }

    /// Exclusive access for register, unregister and resolve.
    ///
    /// # Errors
    ///
    /// Returns [`WiringError::LockPoisoned`] if a writer panicked.
    pub fn write(&self) -> WiringResult<RwLockWriteGuard<'_, PackageResolver>> {
        self.inner
            .write()
            .map_err(|e| WiringError::LockPoisoned(e.to_string()))
    }
}
