//! Per-call-chain search state.

use std::collections::BTreeSet;

use lattice_core::UnitId;

/// Accumulates units whose lazy activation was triggered during one call
/// chain of loads.
///
/// The outermost load owns the context. Nested loads (through a
/// [`Linker`](super::Linker)) share it and only append; the outermost load
/// drains it once its own search has returned.
#[derive(Debug, Default)]
pub struct SearchContext {
    depth: u32,
    pending: Vec<UnitId>,
    requested: BTreeSet<UnitId>,
}

impl SearchContext {
    /// A context for a new call chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the load currently running is the chain's first one.
    #[must_use]
    pub fn is_outermost(&self) -> bool {
        self.depth <= 1
    }

    /// Units waiting for activation, in trigger order.
    #[must_use]
    pub fn pending(&self) -> &[UnitId] {
        &self.pending
    }

    /// Queue `unit` for activation. Returns `false` if the chain already
    /// queued it.
    pub fn request_activation(&mut self, unit: UnitId) -> bool {
        if !self.requested.insert(unit) {
            return false;
        }
        self.pending.push(unit);
        true
    }

    pub(crate) fn enter(&mut self) {
        self.depth = self.depth.saturating_add(1);
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Take everything queued so far. Units stay marked as requested, so
    /// a later trigger in the same chain is not queued again.
    pub(crate) fn take_pending(&mut self) -> Vec<UnitId> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_loads_are_not_outermost() {
        let mut ctx = SearchContext::new();
        ctx.enter();
        assert!(ctx.is_outermost());
        ctx.enter();
        assert!(!ctx.is_outermost());
        ctx.leave();
        assert!(ctx.is_outermost());
    }

    #[test]
    fn each_unit_is_requested_once_per_chain() {
        let mut ctx = SearchContext::new();
        assert!(ctx.request_activation(UnitId(3)));
        assert!(ctx.request_activation(UnitId(1)));
        assert!(!ctx.request_activation(UnitId(3)));
        assert_eq!(ctx.pending(), &[UnitId(3), UnitId(1)]);

        assert_eq!(ctx.take_pending(), vec![UnitId(3), UnitId(1)]);
        assert!(ctx.pending().is_empty());
        assert!(!ctx.request_activation(UnitId(1)));
    }
}
