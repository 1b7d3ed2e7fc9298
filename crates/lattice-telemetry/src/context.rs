//! Operation context for correlating log lines.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use lattice_core::UnitId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one framework operation (install, start, a class load...).
///
/// Operations triggered by another one (a lazy activation during a load, a
/// dependent restart during an update) are created with [`child`](Self::child)
/// and share its correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationContext {
    /// Unique id of this operation.
    pub operation_id: Uuid,
    /// Shared by every operation of one call chain.
    pub correlation_id: Uuid,
    /// The operation that triggered this one.
    pub parent_id: Option<Uuid>,
    /// Operation name.
    pub operation: String,
    /// Unit the operation acts on.
    pub unit: Option<UnitId>,
    /// When the operation started.
    pub started_at: DateTime<Utc>,
    /// Free-form fields.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl OperationContext {
    /// A new root operation.
    #[must_use]
    pub fn new(operation: impl Into<String>) -> Self {
        let id = Uuid::new_v4();
        Self {
            operation_id: id,
            correlation_id: id,
            parent_id: None,
            operation: operation.into(),
            unit: None,
            started_at: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    /// A nested operation in the same call chain.
    #[must_use]
    pub fn child(&self, operation: impl Into<String>) -> Self {
        Self {
            operation_id: Uuid::new_v4(),
            correlation_id: self.correlation_id,
            parent_id: Some(self.operation_id),
            operation: operation.into(),
            unit: None,
            started_at: Utc::now(),
            metadata: self.metadata.clone(),
        }
    }

    /// Attach the target unit.
    #[must_use]
    pub fn with_unit(mut self, unit: UnitId) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Add metadata.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Milliseconds since the operation started.
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.started_at)
            .num_milliseconds()
    }

    /// A span carrying the operation's identity.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "operation",
            operation = %self.operation,
            operation_id = %self.operation_id,
            correlation_id = %self.correlation_id,
            unit_id = self.unit.map(|u| u.0),
        )
    }
}

/// Enters an operation's span and logs its duration on drop.
pub struct OperationGuard {
    context: OperationContext,
    _span: tracing::span::EnteredSpan,
}

impl OperationGuard {
    /// Enter `context`'s span.
    #[must_use]
    pub fn new(context: OperationContext) -> Self {
        let span = context.span().entered();
        tracing::trace!("Operation started");
        Self {
            context,
            _span: span,
        }
    }

    /// The guarded context.
    #[must_use]
    pub fn context(&self) -> &OperationContext {
        &self.context
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        tracing::trace!(elapsed_ms = self.context.elapsed_ms(), "Operation finished");
    }
}
