//! Generic namespace to capability-list registry.

use std::collections::BTreeMap;
use std::sync::RwLock;

use lattice_core::UnitId;
use tracing::{debug, error};

use crate::error::{WiringError, WiringResult};
use crate::manifest::parse_header;

/// One capability offered by a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    /// Namespace the capability lives in.
    pub namespace: String,
    /// Matching attributes.
    pub attributes: BTreeMap<String, String>,
    /// Directives.
    pub directives: BTreeMap<String, String>,
    /// Offering unit.
    pub owner: UnitId,
}

/// A batch of capabilities keyed by namespace.
pub type CapabilityBatch = BTreeMap<String, Vec<Capability>>;

/// Registry of capabilities per namespace, in registration order.
#[derive(Debug, Default)]
pub struct Capabilities {
    table: RwLock<CapabilityBatch>,
}

impl Capabilities {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append every capability in `batch`.
    ///
    /// # Errors
    ///
    /// Returns [`WiringError::LockPoisoned`] if the registry lock is poisoned.
    pub fn add(&self, batch: &CapabilityBatch) -> WiringResult<()> {
        let mut table = self
            .table
            .write()
            .map_err(|e| WiringError::LockPoisoned(e.to_string()))?;
        for (namespace, caps) in batch {
            table
                .entry(namespace.clone())
                .or_default()
                .extend(caps.iter().cloned());
            debug!(namespace = %namespace, count = caps.len(), "Added capabilities");
        }
        Ok(())
    }

    /// Remove every capability in `batch`.
    ///
    /// The whole batch is validated first; nothing is removed if any
    /// namespace or capability is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`WiringError::CapabilityInconsistency`] when the caller
    /// removes something it never added.
    pub fn remove(&self, batch: &CapabilityBatch) -> WiringResult<()> {
        let mut table = self
            .table
            .write()
            .map_err(|e| WiringError::LockPoisoned(e.to_string()))?;

        for (namespace, caps) in batch {
            let Some(present) = table.get(namespace) else {
                return Err(inconsistency(namespace, "unknown namespace"));
            };
            let short = |c: &&Capability| {
                let wanted = caps.iter().filter(|x| x == c).count();
                present.iter().filter(|x| x == c).count() < wanted
            };
            if let Some(missing) = caps.iter().find(short) {
                return Err(inconsistency(
                    namespace,
                    &format!("capability of unit {} not registered", missing.owner),
                ));
            }
        }

        for (namespace, caps) in batch {
            if let Some(present) = table.get_mut(namespace) {
                for cap in caps {
                    if let Some(pos) = present.iter().position(|c| c == cap) {
                        present.remove(pos);
                    }
                }
                if present.is_empty() {
                    table.remove(namespace);
                }
            }
        }
        Ok(())
    }

    /// Capabilities registered in `namespace`.
    #[must_use]
    pub fn get(&self, namespace: &str) -> Vec<Capability> {
        self.table
            .read()
            .ok()
            .and_then(|t| t.get(namespace).cloned())
            .unwrap_or_default()
    }

    /// Namespaces with at least one capability.
    #[must_use]
    pub fn namespaces(&self) -> Vec<String> {
        self.table
            .read()
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default()
    }
}

fn inconsistency(namespace: &str, message: &str) -> WiringError {
    error!(namespace = %namespace, message, "Capability registry inconsistency");
    WiringError::CapabilityInconsistency {
        namespace: namespace.to_owned(),
        message: message.to_owned(),
    }
}

/// Read a `Provide-Capability` header into a batch.
#[must_use]
pub fn capabilities_from_header(owner: UnitId, value: &str) -> CapabilityBatch {
    let mut batch = CapabilityBatch::new();
    for clause in parse_header(value) {
        for namespace in &clause.names {
            batch.entry(namespace.clone()).or_default().push(Capability {
                namespace: namespace.clone(),
                attributes: clause.attributes.clone(),
                directives: clause.directives.clone(),
                owner,
            });
        }
    }
    batch
}
