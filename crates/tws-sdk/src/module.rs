//! Modules: a calculation plus its two universes.
//!
//! A module owns a Target and a Reference sub-store, shows one of them
//! (the visible universe), and bridges every write into the shared
//! [`ValueStore`] under a universe-qualified key.

use crate::calculation::Calculation;
use crate::config::OrchestratorConfig;
use crate::error::{ModuleError, Result};
use crate::events::{EngineEvent, EventSink, ModuleEvent};
use crate::guard::{OverrideGuard, Reentrant};
use crate::orchestrator::CalcReport;
use crate::state::{ModuleState, UniverseState};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tws_core::{FieldKey, FieldRole, Provenance, Schema, Universe, Value, WriteOutcome};
use tws_persist::PersistenceAdapter;
use tws_store::{Change, ValueStore, WriteBatch};

/// Construction options for a [`Module`].
#[derive(Clone, Debug)]
pub struct ModuleOptions {
    persistence: Option<PersistenceAdapter>,
    orchestrator: OrchestratorConfig,
    event_capacity: usize,
    engine_events: Option<broadcast::Sender<EngineEvent>>,
}

impl Default for ModuleOptions {
    fn default() -> Self {
        Self {
            persistence: None,
            orchestrator: OrchestratorConfig::default(),
            event_capacity: 100,
            engine_events: None,
        }
    }
}

impl ModuleOptions {
    /// Save user edits through `persistence`; without it nothing is saved.
    pub fn with_persistence(mut self, persistence: PersistenceAdapter) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn with_orchestrator(mut self, config: OrchestratorConfig) -> Self {
        self.orchestrator = config;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub(crate) fn with_engine_events(mut self, events: broadcast::Sender<EngineEvent>) -> Self {
        self.engine_events = Some(events);
        self
    }
}

#[derive(Default)]
pub(crate) struct ModuleCounters {
    pub(crate) calculations: AtomicU64,
    pub(crate) short_circuits: AtomicU64,
    pub(crate) failed_passes: AtomicU64,
    pub(crate) saves: AtomicU64,
    pub(crate) reruns: AtomicU64,
}

/// Activity counters for one module.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleStats {
    pub calculations: u64,
    pub short_circuits: u64,
    pub failed_passes: u64,
    pub saves: u64,
    /// Extra rounds run because an upstream value moved mid-recalculation.
    pub reruns: u64,
}

/// One computation unit with dual-universe state.
pub struct Module {
    pub(crate) id: String,
    pub(crate) calculation: Arc<dyn Calculation>,
    pub(crate) schema: Schema,
    /// Fields read from other modules.
    pub(crate) external: Vec<String>,
    pub(crate) store: ValueStore,
    pub(crate) persistence: Option<PersistenceAdapter>,
    pub(crate) config: OrchestratorConfig,
    pub(crate) state: RwLock<ModuleState>,
    visible: RwLock<Universe>,
    pub(crate) pass_universe: Mutex<Option<Universe>>,
    pub(crate) guard: Reentrant<CalcReport>,
    /// Set when an external dependency changes while the guard is active.
    pub(crate) upstream_moved: AtomicBool,
    pub(crate) events: EventSink,
    pub(crate) counters: ModuleCounters,
    initialized: AtomicBool,
    self_ref: Weak<Module>,
}

impl Module {
    /// Build a module around `calculation`. Nothing is published until
    /// [`Module::initialize`].
    pub fn new(
        calculation: impl Calculation + 'static,
        store: ValueStore,
        options: ModuleOptions,
    ) -> Result<Arc<Self>> {
        Self::from_shared(Arc::new(calculation), store, options)
    }

    pub fn from_shared(
        calculation: Arc<dyn Calculation>,
        store: ValueStore,
        options: ModuleOptions,
    ) -> Result<Arc<Self>> {
        let id = calculation.id().to_string();
        let schema = Schema::new(calculation.schema()).map_err(|source| ModuleError::Schema {
            module: id.clone(),
            source,
        })?;
        let state = ModuleState::seeded(&schema);
        let external = schema.external_dependencies().into_iter().collect();
        let events = EventSink::new(options.event_capacity, options.engine_events);

        Ok(Arc::new_cyclic(|self_ref| Module {
            id,
            calculation,
            schema,
            external,
            store,
            persistence: options.persistence,
            config: options.orchestrator,
            state: RwLock::new(state),
            visible: RwLock::new(Universe::Target),
            pass_universe: Mutex::new(None),
            guard: Reentrant::new(),
            upstream_moved: AtomicBool::new(false),
            events,
            counters: ModuleCounters::default(),
            initialized: AtomicBool::new(false),
            self_ref: self_ref.clone(),
        }))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn store(&self) -> &ValueStore {
        &self.store
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Restore persisted state, publish both universes, register listeners
    /// and dependencies, then recalculate once.
    ///
    /// Calling it again is a no-op.
    pub fn initialize(&self) -> Result<CalcReport> {
        if self.initialized.swap(true, Ordering::AcqRel) {
            debug!(module = %self.id, "Module already initialized");
            return Ok(self.guard.last().unwrap_or_else(|| CalcReport::empty(&self.id)));
        }

        let result = self.initialize_inner();
        if result.is_err() {
            self.initialized.store(false, Ordering::Release);
        }
        result
    }

    fn initialize_inner(&self) -> Result<CalcReport> {
        for decl in self.schema.fields() {
            self.store.namespace().check_field_name(&decl.name)?;
        }
        for decl in self.schema.fields() {
            for upstream in &decl.depends_on {
                self.store
                    .register_dependency(upstream, &decl.name, &self.id)
                    .map_err(|source| ModuleError::Dependency {
                        module: self.id.clone(),
                        source,
                    })?;
            }
        }

        let restored = self.restore_persisted();
        for universe in Universe::ALL {
            self.publish_all(universe);
        }
        self.register_listeners();

        let report = self.calculate_all();
        info!(module = %self.id, restored, fields = self.schema.len(), "Module initialized");
        self.events.emit(ModuleEvent::Initialized {
            module: self.id.clone(),
            restored,
        });
        Ok(report)
    }

    fn restore_persisted(&self) -> usize {
        let Some(persistence) = &self.persistence else {
            return 0;
        };
        let mut total = 0;
        for universe in Universe::ALL {
            let Some(persisted) = persistence.load(&self.id, universe) else {
                continue;
            };
            let restored = self
                .state
                .write()
                .get_mut(universe)
                .restore(&self.schema, &persisted);
            total += restored;
            self.events.emit(ModuleEvent::Restored {
                module: self.id.clone(),
                universe,
                fields: restored,
            });
        }
        total
    }

    /// Publish every field of one universe's sub-store as one batch.
    pub(crate) fn publish_all(&self, universe: Universe) {
        let batch = {
            let state = self.state.read();
            let mut batch = WriteBatch::with_capacity(self.schema.len());
            for (field, stored) in state.get(universe).fields() {
                batch.push(
                    FieldKey::new(universe, field),
                    stored.value.clone(),
                    stored.provenance,
                );
            }
            batch
        };
        self.store.apply(batch);
    }

    fn register_listeners(&self) {
        let watched = self
            .schema
            .inputs()
            .map(|decl| decl.name.clone())
            .chain(self.schema.external_dependencies());

        for field in watched {
            for universe in Universe::ALL {
                let module = self.self_ref.clone();
                self.store
                    .add_listener(FieldKey::new(universe, &field), &self.id, move |change| {
                        if let Some(module) = module.upgrade() {
                            module.on_change(change);
                        }
                    });
            }
        }
    }

    fn on_change(&self, change: &Change) {
        let field = change.key.field();
        let universe = change.key.universe();

        // Writes that bypassed `set` (e.g. namespace imports) still land in
        // the sub-store.
        if let Some(decl) = self.schema.get(field) {
            if decl.role == FieldRole::Input {
                let value = decl.coerce_or_fallback(&change.value);
                let mut state = self.state.write();
                let sub = state.get_mut(universe);
                if sub.value(field) != Some(&value) {
                    sub.set(field, value, change.provenance);
                }
            }
        }

        if self.guard.is_active() && !self.schema.contains(field) {
            self.upstream_moved.store(true, Ordering::Release);
        }

        debug!(module = %self.id, key = %change.key, "Upstream change");
        self.calculate_all();
    }

    // === Universe selection ===

    /// The universe shown to the user.
    pub fn visible_universe(&self) -> Universe {
        *self.visible.read()
    }

    /// The pass universe while a pass runs, otherwise the visible one.
    pub fn active_universe(&self) -> Universe {
        self.pass_universe
            .lock()
            .unwrap_or_else(|| self.visible_universe())
    }

    /// Temporarily route plain `get`/`set` calls to `universe`.
    pub(crate) fn override_active(&self, universe: Universe) -> OverrideGuard<'_, Universe> {
        OverrideGuard::install(&self.pass_universe, universe)
    }

    /// Change the visible universe.
    ///
    /// Never recalculates and never writes a stored value in either
    /// universe. Returns whether the mode changed.
    pub fn switch_mode(&self, to: Universe) -> bool {
        let from = {
            let mut visible = self.visible.write();
            if *visible == to {
                return false;
            }
            std::mem::replace(&mut *visible, to)
        };

        debug!(module = %self.id, %from, %to, "Switched visible universe");
        self.events.emit(ModuleEvent::ModeSwitched {
            module: self.id.clone(),
            from,
            to,
        });
        true
    }

    // === Field access ===

    /// Value of `field` in the active universe.
    pub fn get(&self, field: &str) -> Option<Value> {
        self.get_in(self.active_universe(), field)
    }

    pub fn get_in(&self, universe: Universe, field: &str) -> Option<Value> {
        self.state.read().get(universe).value(field).cloned()
    }

    /// Write `field` in the active universe.
    pub fn set(&self, field: &str, value: Value, provenance: Provenance) -> Result<WriteOutcome> {
        self.set_in(self.active_universe(), field, value, provenance)
    }

    /// Write `field` in an explicit universe.
    ///
    /// Values that cannot be read as the field's kind are replaced by the
    /// field's fallback. User edits save the sub-store; the value is
    /// published even when saving fails, and the save error is returned
    /// afterwards.
    pub fn set_in(
        &self,
        universe: Universe,
        field: &str,
        value: Value,
        provenance: Provenance,
    ) -> Result<WriteOutcome> {
        let decl = self
            .schema
            .get(field)
            .ok_or_else(|| ModuleError::UnknownField {
                module: self.id.clone(),
                field: field.to_string(),
            })?;

        let coerced = match decl.kind.coerce(&value) {
            Some(coerced) => coerced,
            None => {
                let fallback = decl.fallback_value();
                debug!(module = %self.id, field, %value, %fallback, "Substituted fallback");
                fallback
            }
        };

        let outcome = self
            .state
            .write()
            .get_mut(universe)
            .set(field, coerced.clone(), provenance);
        if !outcome.is_stored() {
            return Ok(outcome);
        }

        let saved = if provenance == Provenance::User {
            self.save(universe)
        } else {
            Ok(())
        };

        self.store
            .set(FieldKey::new(universe, field), coerced, provenance);
        saved.map(|()| outcome)
    }

    fn save(&self, universe: Universe) -> Result<()> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };
        let snapshot = self.state.read().get(universe).to_state_map();
        persistence
            .save(&self.id, universe, &snapshot)
            .map_err(|source| {
                warn!(module = %self.id, %universe, error = %source, "Failed to save universe");
                ModuleError::Persist {
                    module: self.id.clone(),
                    source,
                }
            })?;
        self.state.write().get_mut(universe).dirty = false;
        self.counters.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Copy of the active universe's sub-store.
    pub fn current_state(&self) -> UniverseState {
        self.state_of(self.active_universe())
    }

    pub fn state_of(&self, universe: Universe) -> UniverseState {
        self.state.read().get(universe).clone()
    }

    /// Copy of both sub-stores.
    pub fn module_state(&self) -> ModuleState {
        self.state.read().clone()
    }

    /// Pure view of the visible universe.
    pub fn render(&self) -> ModuleView {
        let universe = self.visible_universe();
        let state = self.state.read();
        let sub = state.get(universe);
        let fields = self
            .schema
            .fields()
            .iter()
            .filter_map(|decl| {
                sub.get(&decl.name).map(|stored| FieldView {
                    name: decl.name.clone(),
                    value: stored.value.clone(),
                    provenance: stored.provenance,
                    role: decl.role,
                    description: decl.description.clone(),
                })
            })
            .collect();

        ModuleView {
            module: self.id.clone(),
            universe,
            fields,
        }
    }

    // === Reset ===

    /// Discard persisted and in-memory state of both universes, reseed
    /// defaults, republish, and recalculate exactly once.
    pub fn reset_to_defaults(&self) -> Result<CalcReport> {
        if let Some(persistence) = &self.persistence {
            persistence
                .clear(&self.id)
                .map_err(|source| ModuleError::Persist {
                    module: self.id.clone(),
                    source,
                })?;
        }

        // Listener-triggered recalculations during republishing hit the
        // guard and return the cached report.
        let report = self
            .guard
            .run(|| {
                *self.state.write() = ModuleState::seeded(&self.schema);
                for universe in Universe::ALL {
                    self.publish_all(universe);
                }
                self.run_until_settled()
            })
            .into_value()
            .unwrap_or_else(|| CalcReport::empty(&self.id));

        info!(module = %self.id, "Module reset to defaults");
        self.events.emit(ModuleEvent::Reset {
            module: self.id.clone(),
        });
        Ok(report)
    }

    // === Observation ===

    pub fn subscribe(&self) -> broadcast::Receiver<ModuleEvent> {
        self.events.subscribe()
    }

    pub fn stats(&self) -> ModuleStats {
        let c = &self.counters;
        ModuleStats {
            calculations: c.calculations.load(Ordering::Relaxed),
            short_circuits: c.short_circuits.load(Ordering::Relaxed),
            failed_passes: c.failed_passes.load(Ordering::Relaxed),
            saves: c.saves.load(Ordering::Relaxed),
            reruns: c.reruns.load(Ordering::Relaxed),
        }
    }
}

impl Drop for Module {
    fn drop(&mut self) {
        self.store.remove_listeners_of(&self.id);
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("visible", &self.visible_universe())
            .field("fields", &self.schema.len())
            .finish_non_exhaustive()
    }
}

/// One row of a [`ModuleView`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldView {
    pub name: String,
    pub value: Value,
    pub provenance: Provenance,
    pub role: FieldRole,
    pub description: String,
}

/// Rendered fields of a module's visible universe, in schema order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModuleView {
    pub module: String,
    pub universe: Universe,
    pub fields: Vec<FieldView>,
}

impl ModuleView {
    pub fn get(&self, field: &str) -> Option<&FieldView> {
        self.fields.iter().find(|f| f.name == field)
    }
}

impl fmt::Display for ModuleView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[{}] {}", self.module, self.universe)?;
        for field in &self.fields {
            let marker = match field.role {
                FieldRole::Input => ' ',
                FieldRole::Derived => '=',
            };
            writeln!(
                f,
                "  {marker} {:<28} {:>14}  ({})",
                field.name,
                field.value.to_plain_string(),
                field.provenance
            )?;
        }
        Ok(())
    }
}
