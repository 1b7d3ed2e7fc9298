//! Delegating module loaders.
//!
//! Every live declaration set gets one [`ModuleLoader`]. A search for a class
//! or resource in package `p` runs, after boot delegation:
//!
//! 1. `p` is a bound import: ask the provider and stop, found or not
//! 2. `p` comes through required units: ask each, first hit wins
//! 3. the unit's own archive, then attached fragments by ascending id; a
//!    miss is final if the unit exports or imports `p`
//! 4. `p` matches a dynamic-import pattern: wire it once, then ask the
//!    new provider

mod search;
mod strategy;

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use globset::Glob;
use lattice_core::{Archive, UnitGeneration};
use tracing::{debug, trace};

pub use search::SearchContext;
pub use strategy::{LoadStrategy, LoadedClass, Linker, RawBytesStrategy};

use crate::error::{RuntimeError, RuntimeResult};
use crate::framework::{Framework, FrameworkInner};
use strategy::class_entry;

/// A resource found by a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Declaration set whose archive (or attached fragment) held it.
    pub owner: UnitGeneration,
    /// Entry path.
    pub path: String,
    /// Entry bytes.
    pub bytes: Arc<[u8]>,
}

/// Options for [`ModuleLoader::list_resources`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Walk subdirectories too.
    pub recurse: bool,
    /// Skip delegation; list the unit's own archive and fragments only.
    pub local_only: bool,
}

#[derive(Clone, Copy)]
enum Target<'a> {
    Class(&'a str),
    Resource(&'a str),
}

impl Target<'_> {
    fn package(self) -> String {
        match self {
            Self::Class(name) => class_package(name).to_owned(),
            Self::Resource(path) => resource_package(path),
        }
    }
}

enum Found {
    Class(Arc<LoadedClass>),
    Resource(Resource),
}

/// Package of a class name (`""` for the default package).
#[must_use]
pub fn class_package(name: &str) -> &str {
    name.rsplit_once('.').map_or("", |(p, _)| p)
}

/// Package of a resource path.
#[must_use]
pub fn resource_package(path: &str) -> String {
    let path = path.trim_start_matches('/');
    path.rsplit_once('/')
        .map_or_else(String::new, |(dir, _)| dir.replace('/', "."))
}

/// Code and resource loader of one unit generation.
pub struct ModuleLoader {
    owner: UnitGeneration,
    archive: Arc<dyn Archive>,
    framework: Weak<FrameworkInner>,
    strategy: Arc<dyn LoadStrategy>,
    closed: AtomicBool,
    classes: RwLock<HashMap<String, Arc<LoadedClass>>>,
}

impl ModuleLoader {
    pub(crate) fn new(
        owner: UnitGeneration,
        archive: Arc<dyn Archive>,
        framework: Weak<FrameworkInner>,
        strategy: Arc<dyn LoadStrategy>,
    ) -> Self {
        Self {
            owner,
            archive,
            framework,
            strategy,
            closed: AtomicBool::new(false),
            classes: RwLock::new(HashMap::new()),
        }
    }

    /// Declaration set this loader serves.
    #[must_use]
    pub fn owner(&self) -> UnitGeneration {
        self.owner
    }

    /// Whether the loader was retired by an update or uninstall.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Retire the loader. Classes defined so far stay available.
    pub(crate) fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(owner = %self.owner, "Closed module loader");
        }
    }

    /// Load a class, starting a new call chain.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ClassNotFound`] when every step misses, or
    /// the strategy's error when the class cannot be defined.
    pub fn load_class(&self, name: &str) -> RuntimeResult<Arc<LoadedClass>> {
        let mut ctx = SearchContext::new();
        self.load_class_in(name, &mut ctx)
    }

    /// Load a class within an existing call chain.
    ///
    /// Only the chain's outermost load activates the units it triggered,
    /// after its own search has returned.
    ///
    /// # Errors
    ///
    /// Same as [`load_class`](Self::load_class).
    pub fn load_class_in(
        &self,
        name: &str,
        ctx: &mut SearchContext,
    ) -> RuntimeResult<Arc<LoadedClass>> {
        let fw = self.framework()?;
        ctx.enter();
        let found = self.search(&fw, Target::Class(name), ctx);
        let outermost = ctx.is_outermost();
        ctx.leave();
        if outermost {
            for unit in ctx.take_pending() {
                fw.activate_lazily(unit);
            }
        }
        match found? {
            Some(Found::Class(class)) => Ok(class),
            _ => Err(RuntimeError::ClassNotFound {
                unit: self.owner.unit,
                name: name.to_owned(),
            }),
        }
    }

    /// Find a resource through the same search order as classes.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ResourceNotFound`] when every step misses.
    pub fn find_resource(&self, path: &str) -> RuntimeResult<Resource> {
        let fw = self.framework()?;
        let path = path.trim_start_matches('/');
        let mut ctx = SearchContext::new();
        match self.search(&fw, Target::Resource(path), &mut ctx)? {
            Some(Found::Resource(resource)) => Ok(resource),
            _ => Err(RuntimeError::ResourceNotFound {
                unit: self.owner.unit,
                path: path.to_owned(),
            }),
        }
    }

    /// Resource paths directly under `path` whose file name matches the
    /// glob `pattern`, sorted and de-duplicated.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidArgument`] for a malformed pattern.
    pub fn list_resources(
        &self,
        path: &str,
        pattern: &str,
        options: ListOptions,
    ) -> RuntimeResult<Vec<String>> {
        let fw = self.framework()?;
        let matcher = Glob::new(pattern)
            .map_err(|e| RuntimeError::InvalidArgument(format!("pattern '{pattern}': {e}")))?
            .compile_matcher();

        let mut found = BTreeSet::new();
        let mut visited_dirs = BTreeSet::new();
        let mut dirs = vec![directory_prefix(path)];
        while let Some(dir) = dirs.pop() {
            if !visited_dirs.insert(dir.clone()) {
                continue;
            }
            let entries = if options.local_only {
                self.local_entries(&fw, &dir)
            } else {
                self.delegated_entries(&fw, &dir)?
            };
            for entry in entries {
                if entry.ends_with('/') {
                    if options.recurse {
                        dirs.push(entry);
                    }
                    continue;
                }
                let file = entry.rsplit('/').next().unwrap_or(&entry);
                if matcher.is_match(file) {
                    found.insert(entry);
                }
            }
        }
        Ok(found.into_iter().collect())
    }

    /// Path of native library `name` in the unit's archive or fragments.
    #[must_use]
    pub fn find_native_library(&self, name: &str) -> Option<PathBuf> {
        if self.is_closed() {
            return None;
        }
        let fw = self.framework().ok()?;
        let file = self.strategy.library_file_name(name);
        self.local_archives(&fw)
            .iter()
            .find_map(|a| a.native_library(&file))
    }

    fn framework(&self) -> RuntimeResult<Framework> {
        self.framework
            .upgrade()
            .map(Framework::from_inner)
            .ok_or_else(|| RuntimeError::Internal("framework dropped".to_owned()))
    }

    fn search(
        &self,
        fw: &Framework,
        target: Target<'_>,
        ctx: &mut SearchContext,
    ) -> RuntimeResult<Option<Found>> {
        if self.is_closed() {
            return Ok(match target {
                Target::Class(name) => self.cached(name).map(Found::Class),
                Target::Resource(_) => None,
            });
        }
        let pkg = target.package();

        if !self.owner.unit.is_system() && fw.is_boot_delegated(&pkg) {
            let system = fw.system_loader()?;
            if let Some(found) = system.find_local(fw, target, ctx)? {
                trace!(owner = %self.owner, package = %pkg, "Served by boot delegation");
                return Ok(Some(found));
            }
        }

        if let Some(provider) = fw.bound_provider(self.owner, &pkg)? {
            trace!(owner = %self.owner, package = %pkg, provider = ?provider, "Bound import");
            return match provider {
                Some(p) if p == self.owner => self.find_local(fw, target, ctx),
                Some(p) => self.delegate(fw, p, target, ctx),
                None => Ok(None),
            };
        }

        for generation in required_providers(fw, self.owner, &pkg)? {
            trace!(owner = %self.owner, package = %pkg, required = %generation, "Required unit");
            if let Some(found) = self.delegate(fw, generation, target, ctx)? {
                return Ok(Some(found));
            }
        }

        if let Some(found) = self.find_local(fw, target, ctx)? {
            return Ok(Some(found));
        }
        if fw.declares(self.owner, &pkg) {
            trace!(owner = %self.owner, package = %pkg, "Declared package missed locally");
            return Ok(None);
        }

        match fw.dynamic_provider(self.owner, &pkg)? {
            Some(p) if p != self.owner => {
                trace!(owner = %self.owner, package = %pkg, provider = %p, "Dynamic import");
                self.delegate(fw, p, target, ctx)
            },
            _ => Ok(None),
        }
    }

    fn delegate(
        &self,
        fw: &Framework,
        provider: UnitGeneration,
        target: Target<'_>,
        ctx: &mut SearchContext,
    ) -> RuntimeResult<Option<Found>> {
        match fw.loader_for_generation(provider) {
            Some(loader) => loader.search(fw, target, ctx),
            None => Ok(None),
        }
    }

    fn local_archives(&self, fw: &Framework) -> Vec<Arc<dyn Archive>> {
        let mut archives = vec![Arc::clone(&self.archive)];
        archives.extend(fw.fragment_archives(self.owner));
        archives
    }

    fn find_local(
        &self,
        fw: &Framework,
        target: Target<'_>,
        ctx: &mut SearchContext,
    ) -> RuntimeResult<Option<Found>> {
        match target {
            Target::Class(name) => Ok(self.define_local(fw, name, ctx)?.map(Found::Class)),
            Target::Resource(path) => Ok(self.read_local(fw, path).map(Found::Resource)),
        }
    }

    fn cached(&self, name: &str) -> Option<Arc<LoadedClass>> {
        self.classes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn define_local(
        &self,
        fw: &Framework,
        name: &str,
        ctx: &mut SearchContext,
    ) -> RuntimeResult<Option<Arc<LoadedClass>>> {
        if let Some(class) = self.cached(name) {
            fw.note_class_loaded(self.owner, name, ctx);
            return Ok(Some(class));
        }
        if self.is_closed() {
            return Ok(None);
        }
        let entry = class_entry(name);
        let Some(bytes) = self
            .local_archives(fw)
            .iter()
            .find_map(|a| a.read_entry(&entry))
        else {
            return Ok(None);
        };

        let defined = {
            let mut linker = LoaderLinker { loader: self, ctx: &mut *ctx };
            self.strategy.define(self.owner, name, bytes, &mut linker)?
        };
        // A concurrent load may have defined it first; keep that one.
        let class = Arc::clone(
            self.classes
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(name.to_owned())
                .or_insert_with(|| Arc::new(defined)),
        );
        trace!(owner = %self.owner, class = %name, "Defined class");
        fw.note_class_loaded(self.owner, name, ctx);
        Ok(Some(class))
    }

    fn read_local(&self, fw: &Framework, path: &str) -> Option<Resource> {
        self.local_archives(fw).iter().find_map(|a| {
            a.read_entry(path).map(|bytes| Resource {
                owner: self.owner,
                path: path.to_owned(),
                bytes: bytes.into(),
            })
        })
    }

    fn local_entries(&self, fw: &Framework, dir: &str) -> Vec<String> {
        if self.is_closed() {
            return Vec::new();
        }
        self.local_archives(fw)
            .iter()
            .flat_map(|a| a.entry_names())
            .filter(|e| is_direct_child(dir, e))
            .collect()
    }

    fn delegated_entries(&self, fw: &Framework, dir: &str) -> RuntimeResult<Vec<String>> {
        if self.is_closed() {
            return Ok(Vec::new());
        }
        let pkg = dir.trim_end_matches('/').replace('/', ".");

        if let Some(provider) = fw.bound_provider(self.owner, &pkg)? {
            return match provider {
                Some(p) if p == self.owner => Ok(self.local_entries(fw, dir)),
                Some(p) => match fw.loader_for_generation(p) {
                    Some(loader) => loader.delegated_entries(fw, dir),
                    None => Ok(Vec::new()),
                },
                None => Ok(Vec::new()),
            };
        }

        let mut entries = Vec::new();
        for generation in required_providers(fw, self.owner, &pkg)? {
            if let Some(loader) = fw.loader_for_generation(generation) {
                entries.extend(loader.delegated_entries(fw, dir)?);
            }
        }
        entries.extend(self.local_entries(fw, dir));
        Ok(entries)
    }
}

impl std::fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("owner", &self.owner)
            .field("location", &self.archive.location())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

struct LoaderLinker<'a> {
    loader: &'a ModuleLoader,
    ctx: &'a mut SearchContext,
}

impl Linker for LoaderLinker<'_> {
    fn resolve(&mut self, name: &str) -> RuntimeResult<Arc<LoadedClass>> {
        self.loader.load_class_in(name, self.ctx)
    }
}

/// Required generations that can supply `pkg` to `owner`, in declared
/// order, following reexports. The visited set stops cycles.
fn required_providers(
    fw: &Framework,
    owner: UnitGeneration,
    pkg: &str,
) -> RuntimeResult<Vec<UnitGeneration>> {
    let mut out = Vec::new();
    let Some(required) = fw.required_generations(owner, pkg)? else {
        return Ok(out);
    };
    let mut visited = BTreeSet::from([owner]);
    for generation in required {
        walk_required(fw, generation, pkg, &mut visited, &mut out)?;
    }
    Ok(out)
}

fn walk_required(
    fw: &Framework,
    generation: UnitGeneration,
    pkg: &str,
    visited: &mut BTreeSet<UnitGeneration>,
    out: &mut Vec<UnitGeneration>,
) -> RuntimeResult<()> {
    if !visited.insert(generation) {
        return Ok(());
    }
    if fw.exports_package(generation, pkg)? {
        out.push(generation);
        return Ok(());
    }
    for next in fw.reexported_generations(generation)? {
        walk_required(fw, next, pkg, visited, out)?;
    }
    Ok(())
}

/// `"a/b"` and `"/a/b/"` both become `"a/b/"`; the root is `""`.
fn directory_prefix(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

/// Whether `entry` sits directly in `dir` (subdirectories included).
fn is_direct_child(dir: &str, entry: &str) -> bool {
    let Some(rest) = entry.strip_prefix(dir) else {
        return false;
    };
    match rest.find('/') {
        None => !rest.is_empty(),
        Some(idx) => idx.saturating_add(1) == rest.len() && idx > 0,
    }
}
