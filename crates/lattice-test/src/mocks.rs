//! Mock implementations for testing.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use lattice_core::{
    Archive, ArchiveError, ArchiveResult, ErrorSink, EventSink, PermissionAction,
    PermissionCheck, UnitEventKind, UnitId,
};

#[derive(Debug, Default)]
struct ArchiveState {
    persistent_start: bool,
    start_level: Option<u32>,
    purged: usize,
    fail_persist: bool,
    fail_purge: bool,
}

/// In-memory [`Archive`].
///
/// Clones share persisted state, so a test can keep a handle after giving
/// the archive to the framework and inspect what was written.
#[derive(Debug, Clone)]
pub struct MemoryArchive {
    location: String,
    headers: BTreeMap<String, String>,
    entries: BTreeMap<String, Vec<u8>>,
    libraries: BTreeMap<String, PathBuf>,
    state: Arc<Mutex<ArchiveState>>,
}

impl MemoryArchive {
    /// Create an empty archive.
    #[must_use]
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            headers: BTreeMap::new(),
            entries: BTreeMap::new(),
            libraries: BTreeMap::new(),
            state: Arc::new(Mutex::new(ArchiveState::default())),
        }
    }

    /// Add a manifest header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Add a raw entry. Parent directory entries are added too.
    #[must_use]
    pub fn with_entry(mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let path = path.into();
        for (idx, _) in path.match_indices('/') {
            self.entries.entry(path[..=idx].to_string()).or_default();
        }
        self.entries.insert(path, bytes.into());
        self
    }

    /// Add a class entry whose bytes are the class name.
    #[must_use]
    pub fn with_class(self, class_name: &str) -> Self {
        let path = format!("{}.class", class_name.replace('.', "/"));
        self.with_entry(path, class_name.as_bytes().to_vec())
    }

    /// Register a native library path.
    #[must_use]
    pub fn with_native_library(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.libraries.insert(name.into(), path.into());
        self
    }

    /// Make every `persist` and `set_start_level` call fail.
    #[must_use]
    pub fn failing_persist(self) -> Self {
        if let Ok(mut s) = self.state.lock() {
            s.fail_persist = true;
        }
        self
    }

    /// Make `purge` fail.
    #[must_use]
    pub fn failing_purge(self) -> Self {
        if let Ok(mut s) = self.state.lock() {
            s.fail_purge = true;
        }
        self
    }

    /// How many times `purge` succeeded.
    #[must_use]
    pub fn purge_count(&self) -> usize {
        self.state.lock().map(|s| s.purged).unwrap_or_default()
    }
}

impl Archive for MemoryArchive {
    fn location(&self) -> &str {
        &self.location
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.headers.get(name).cloned()
    }

    fn read_entry(&self, path: &str) -> Option<Vec<u8>> {
        if path.ends_with('/') {
            return None;
        }
        self.entries.get(path).cloned()
    }

    fn entry_names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn native_library(&self, name: &str) -> Option<PathBuf> {
        self.libraries.get(name).cloned()
    }

    fn persist(&self, persistent_start: bool) -> ArchiveResult<()> {
        let mut s = self.state.lock().map_err(|e| persist_error(&self.location, &e.to_string()))?;
        if s.fail_persist {
            return Err(persist_error(&self.location, "storage is read-only"));
        }
        s.persistent_start = persistent_start;
        Ok(())
    }

    fn persistent_start(&self) -> bool {
        self.state.lock().map(|s| s.persistent_start).unwrap_or_default()
    }

    fn start_level(&self) -> Option<u32> {
        self.state.lock().ok().and_then(|s| s.start_level)
    }

    fn set_start_level(&self, level: u32) -> ArchiveResult<()> {
        let mut s = self.state.lock().map_err(|e| persist_error(&self.location, &e.to_string()))?;
        if s.fail_persist {
            return Err(persist_error(&self.location, "storage is read-only"));
        }
        s.start_level = Some(level);
        Ok(())
    }

    fn purge(&self) -> ArchiveResult<()> {
        let mut s = self.state.lock().map_err(|e| ArchiveError::PurgeFailed {
            location: self.location.clone(),
            message: e.to_string(),
        })?;
        if s.fail_purge {
            return Err(ArchiveError::PurgeFailed {
                location: self.location.clone(),
                message: "storage is busy".to_string(),
            });
        }
        s.purged = s.purged.saturating_add(1);
        Ok(())
    }
}

fn persist_error(location: &str, message: &str) -> ArchiveError {
    ArchiveError::PersistFailed {
        location: location.to_string(),
        what: "unit state".to_string(),
        message: message.to_string(),
    }
}

/// [`ErrorSink`] that records every report.
#[derive(Debug, Clone, Default)]
pub struct RecordingErrorSink {
    errors: Arc<Mutex<Vec<(UnitId, String)>>>,
}

impl RecordingErrorSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every reported error as `(unit, message)`.
    #[must_use]
    pub fn errors(&self) -> Vec<(UnitId, String)> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Number of reports attributed to `unit`.
    #[must_use]
    pub fn count_for(&self, unit: UnitId) -> usize {
        self.errors().iter().filter(|(u, _)| *u == unit).count()
    }
}

impl ErrorSink for RecordingErrorSink {
    fn report(&self, unit: UnitId, error: &(dyn std::error::Error + 'static)) {
        if let Ok(mut guard) = self.errors.lock() {
            guard.push((unit, error.to_string()));
        }
    }
}

/// [`EventSink`] that records every transition.
#[derive(Debug, Clone, Default)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<(UnitId, UnitEventKind)>>>,
}

impl RecordingEventSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event in firing order.
    #[must_use]
    pub fn events(&self) -> Vec<(UnitId, UnitEventKind)> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Event kinds fired for `unit`, in order.
    #[must_use]
    pub fn kinds_for(&self, unit: UnitId) -> Vec<UnitEventKind> {
        self.events()
            .into_iter()
            .filter(|(u, _)| *u == unit)
            .map(|(_, k)| k)
            .collect()
    }

    /// How often `kind` fired for `unit`.
    #[must_use]
    pub fn count(&self, unit: UnitId, kind: UnitEventKind) -> usize {
        self.kinds_for(unit).into_iter().filter(|k| *k == kind).count()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        if let Ok(mut guard) = self.events.lock() {
            guard.clear();
        }
    }
}

impl EventSink for RecordingEventSink {
    fn unit_changed(&self, unit: UnitId, kind: UnitEventKind) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push((unit, kind));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DenyRule {
    unit: Option<UnitId>,
    action: Option<PermissionAction>,
    target: Option<String>,
}

/// [`PermissionCheck`] denying whatever matches one of its rules.
///
/// A rule field left unset matches anything.
#[derive(Debug, Clone, Default)]
pub struct DenyList {
    rules: Vec<DenyRule>,
}

impl DenyList {
    /// Allow everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deny every action on `target`.
    #[must_use]
    pub fn deny_target(mut self, target: impl Into<String>) -> Self {
        self.rules.push(DenyRule {
            unit: None,
            action: None,
            target: Some(target.into()),
        });
        self
    }

    /// Deny `action` for every unit and target.
    #[must_use]
    pub fn deny_action(mut self, action: PermissionAction) -> Self {
        self.rules.push(DenyRule {
            unit: None,
            action: Some(action),
            target: None,
        });
        self
    }

    /// Deny `action` on `target` for `unit` only.
    #[must_use]
    pub fn deny(mut self, unit: UnitId, action: PermissionAction, target: impl Into<String>) -> Self {
        self.rules.push(DenyRule {
            unit: Some(unit),
            action: Some(action),
            target: Some(target.into()),
        });
        self
    }
}

impl PermissionCheck for DenyList {
    fn allows(&self, unit: UnitId, action: PermissionAction, target: &str) -> bool {
        !self.rules.iter().any(|r| {
            r.unit.is_none_or(|u| u == unit)
                && r.action.is_none_or(|a| a == action)
                && r.target.as_deref().is_none_or(|t| t == target)
        })
    }
}
