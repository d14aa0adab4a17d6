//! Broadcast events for observers that do not register store listeners.

use tokio::sync::broadcast;
use tws_core::Universe;

/// Events emitted by a module.
#[derive(Clone, Debug, PartialEq)]
pub enum ModuleEvent {
    /// The module finished initialization.
    Initialized { module: String, restored: usize },
    /// A universe was restored from its persisted slot.
    Restored {
        module: String,
        universe: Universe,
        fields: usize,
    },
    /// `calculate_all` ran both passes.
    Recalculated { module: String, failed_passes: usize },
    /// A pass failed and published zeroed outputs.
    PassFailed {
        module: String,
        universe: Universe,
        error: String,
    },
    /// The visible universe changed.
    ModeSwitched {
        module: String,
        from: Universe,
        to: Universe,
    },
    /// The module was reset to its defaults.
    Reset { module: String },
}

impl ModuleEvent {
    pub fn module(&self) -> &str {
        match self {
            ModuleEvent::Initialized { module, .. }
            | ModuleEvent::Restored { module, .. }
            | ModuleEvent::Recalculated { module, .. }
            | ModuleEvent::PassFailed { module, .. }
            | ModuleEvent::ModeSwitched { module, .. }
            | ModuleEvent::Reset { module } => module,
        }
    }
}

/// Events emitted by an engine.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    /// A module was registered and initialized.
    Registered { module: String },
    /// An event relayed from one of the engine's modules.
    Module(ModuleEvent),
    /// Every module was recalculated.
    CalculatedEverything { modules: usize },
    /// Every module was switched to `universe`.
    SwitchedAll { universe: Universe, switched: usize },
    /// Every module was reset.
    ResetAll { modules: usize },
}

/// Fan-out for one module's events: its own channel plus the engine's.
#[derive(Clone, Debug)]
pub(crate) struct EventSink {
    module: broadcast::Sender<ModuleEvent>,
    engine: Option<broadcast::Sender<EngineEvent>>,
}

impl EventSink {
    pub(crate) fn new(capacity: usize, engine: Option<broadcast::Sender<EngineEvent>>) -> Self {
        let (module, _) = broadcast::channel(capacity.max(1));
        Self { module, engine }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ModuleEvent> {
        self.module.subscribe()
    }

    pub(crate) fn emit(&self, event: ModuleEvent) {
        if let Some(engine) = &self.engine {
            let _ = engine.send(EngineEvent::Module(event.clone()));
        }
        let _ = self.module.send(event);
    }
}
