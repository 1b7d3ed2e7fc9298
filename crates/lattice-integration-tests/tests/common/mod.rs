//! Shared harness for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use lattice_config::Config;
use lattice_core::{Archive, UnitGeneration, UnitId};
use lattice_runtime::{ActivatorRegistry, Framework, FrameworkBuilder, LoadStrategy};
use lattice_test::{RecordingErrorSink, RecordingEventSink, init_tracing};

/// A framework wired to recording sinks and an activator registry.
pub struct Harness {
    /// The framework under test.
    pub fw: Framework,
    /// Every lifecycle event.
    pub events: RecordingEventSink,
    /// Every reported error.
    pub errors: RecordingErrorSink,
    /// Activator constructors by class name.
    pub activators: Arc<ActivatorRegistry>,
}

impl Harness {
    /// Default configuration.
    pub fn new() -> Self {
        Self::with(|b| b)
    }

    /// Default collaborators, then `customize`.
    pub fn with(customize: impl FnOnce(FrameworkBuilder) -> FrameworkBuilder) -> Self {
        init_tracing();
        let events = RecordingEventSink::new();
        let errors = RecordingErrorSink::new();
        let activators = Arc::new(ActivatorRegistry::new());
        let builder = Framework::builder()
            .event_sink(Arc::new(events.clone()))
            .error_sink(Arc::new(errors.clone()))
            .activator_factory(activators.clone());
        let fw = customize(builder).build().expect("framework should build");
        Self {
            fw,
            events,
            errors,
            activators,
        }
    }

    /// `config` with default collaborators.
    pub fn with_config(config: Config) -> Self {
        Self::with(|b| b.config(config))
    }

    /// Default configuration and a custom load strategy.
    pub fn with_strategy(strategy: Arc<dyn LoadStrategy>) -> Self {
        Self::with(|b| b.load_strategy(strategy))
    }

    /// Install `archive`, panicking on failure.
    pub fn install(&self, archive: impl Archive + 'static) -> UnitId {
        self.fw.install(Arc::new(archive)).expect("install should succeed")
    }
}

/// Generation `generation` of `unit`.
pub fn generation(unit: UnitId, generation: u32) -> UnitGeneration {
    UnitGeneration::new(unit, generation)
}
