//! Error and event sinks.

use crate::types::{UnitEventKind, UnitId};

/// Receives non-fatal errors the runtime cannot return to a caller.
pub trait ErrorSink: Send + Sync {
    /// Report an error attributed to `unit`.
    fn report(&self, unit: UnitId, error: &(dyn std::error::Error + 'static));
}

/// Receives every lifecycle transition.
pub trait EventSink: Send + Sync {
    /// `unit` went through a transition of the given kind.
    fn unit_changed(&self, unit: UnitId, kind: UnitEventKind);
}

/// Default [`ErrorSink`]: logs through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, unit: UnitId, error: &(dyn std::error::Error + 'static)) {
        tracing::warn!(unit_id = %unit, error = %error, "Unit error reported");
    }
}

/// Default [`EventSink`]: logs through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn unit_changed(&self, unit: UnitId, kind: UnitEventKind) {
        tracing::debug!(unit_id = %unit, kind = ?kind, "Unit changed");
    }
}
