//! Broadcast publication of unit lifecycle events.

use chrono::{DateTime, Utc};
use lattice_core::{EventSink, UnitEventKind, UnitId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// One lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitEvent {
    /// Unit that changed.
    pub unit: UnitId,
    /// What happened.
    pub kind: UnitEventKind,
    /// When the framework fired the event.
    pub timestamp: DateTime<Utc>,
}

/// [`EventSink`] that publishes every transition on a broadcast channel.
///
/// Publishing never blocks the lifecycle operation; slow receivers lag and
/// lose the oldest events.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<UnitEvent>,
}

impl BroadcastEventSink {
    /// Create a sink with [`DEFAULT_CHANNEL_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a sink with the given channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receive every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<UnitEvent> {
        self.sender.subscribe()
    }

    /// Number of live receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for BroadcastEventSink {
    fn unit_changed(&self, unit: UnitId, kind: UnitEventKind) {
        let event = UnitEvent {
            unit,
            kind,
            timestamp: Utc::now(),
        };
        if self.sender.send(event).is_err() {
            trace!(unit_id = %unit, ?kind, "No receivers for unit event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishes_to_every_receiver() {
        let sink = BroadcastEventSink::new();
        let mut a = sink.subscribe();
        let mut b = sink.subscribe();
        assert_eq!(sink.receiver_count(), 2);

        sink.unit_changed(UnitId(2), UnitEventKind::Started);
        assert_eq!(a.try_recv().unwrap().kind, UnitEventKind::Started);
        assert_eq!(b.try_recv().unwrap().unit, UnitId(2));
    }

    #[test]
    fn publishing_without_receivers_is_fine() {
        let sink = BroadcastEventSink::with_capacity(0);
        sink.unit_changed(UnitId(1), UnitEventKind::Installed);
        assert_eq!(sink.receiver_count(), 0);
    }
}
