//! Test harness: tracing setup and a filesystem-backed archive.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use lattice_core::{Archive, ArchiveError, ArchiveResult};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Install a test subscriber once. Later calls are no-ops.
///
/// Honors `RUST_LOG`, defaulting to `warn`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// [`Archive`] whose entries and persisted state live in a temporary
/// directory, removed when the archive is dropped.
#[derive(Debug)]
pub struct DirArchive {
    location: String,
    dir: TempDir,
    headers: BTreeMap<String, String>,
}

impl DirArchive {
    /// Create an empty archive in a fresh temporary directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(location: impl Into<String>) -> io::Result<Self> {
        let dir = TempDir::new()?;
        fs::create_dir_all(dir.path().join("content"))?;
        fs::create_dir_all(dir.path().join("state"))?;
        Ok(Self {
            location: location.into(),
            dir,
            headers: BTreeMap::new(),
        })
    }

    /// Add a manifest header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Write an entry below the content root.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_entry(&self, path: &str, bytes: &[u8]) -> io::Result<()> {
        let target = self.content_root().join(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(target, bytes)
    }

    /// Root of the entry tree.
    #[must_use]
    pub fn content_root(&self) -> PathBuf {
        self.dir.path().join("content")
    }

    fn state_file(&self, name: &str) -> PathBuf {
        self.dir.path().join("state").join(name)
    }

    fn persist_error(&self, what: &str, err: &io::Error) -> ArchiveError {
        ArchiveError::PersistFailed {
            location: self.location.clone(),
            what: what.to_string(),
            message: err.to_string(),
        }
    }
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let rel = rel.to_string_lossy().replace('\\', "/");
        if path.is_dir() {
            out.push(format!("{rel}/"));
            walk(root, &path, out)?;
        } else {
            out.push(rel);
        }
    }
    Ok(())
}

impl Archive for DirArchive {
    fn location(&self) -> &str {
        &self.location
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.headers.get(name).cloned()
    }

    fn read_entry(&self, path: &str) -> Option<Vec<u8>> {
        let target = self.content_root().join(path);
        target.is_file().then(|| fs::read(target).ok()).flatten()
    }

    fn entry_names(&self) -> Vec<String> {
        let root = self.content_root();
        let mut out = Vec::new();
        if walk(&root, &root, &mut out).is_err() {
            return Vec::new();
        }
        out.sort();
        out
    }

    fn persist(&self, persistent_start: bool) -> ArchiveResult<()> {
        fs::write(self.state_file("start"), if persistent_start { "1" } else { "0" })
            .map_err(|e| self.persist_error("start flag", &e))
    }

    fn persistent_start(&self) -> bool {
        fs::read_to_string(self.state_file("start")).is_ok_and(|s| s.trim() == "1")
    }

    fn start_level(&self) -> Option<u32> {
        fs::read_to_string(self.state_file("level"))
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    fn set_start_level(&self, level: u32) -> ArchiveResult<()> {
        fs::write(self.state_file("level"), level.to_string())
            .map_err(|e| self.persist_error("start level", &e))
    }

    fn purge(&self) -> ArchiveResult<()> {
        let state = self.dir.path().join("state");
        fs::remove_dir_all(&state).map_err(|e| ArchiveError::PurgeFailed {
            location: self.location.clone(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_archive_round_trips_state_and_entries() {
        let archive = DirArchive::new("dir:a").unwrap().with_header("Bundle-Version", "1.0");
        archive.write_entry("com/foo/Bar.class", b"bar").unwrap();

        assert_eq!(archive.entry_names(), vec!["com/", "com/foo/", "com/foo/Bar.class"]);
        assert_eq!(archive.read_entry("com/foo/Bar.class").unwrap(), b"bar");
        assert!(archive.read_entry("com/foo").is_none());

        archive.persist(true).unwrap();
        archive.set_start_level(3).unwrap();
        assert!(archive.persistent_start());
        assert_eq!(archive.start_level(), Some(3));

        archive.purge().unwrap();
        assert!(!archive.persistent_start());
        assert!(archive.purge().is_err());
    }
}
