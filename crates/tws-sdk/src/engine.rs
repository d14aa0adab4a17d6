//! The engine: owns the shared store and persistence, registers modules,
//! and runs whole-model operations.

use crate::calculation::Calculation;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::EngineEvent;
use crate::module::{Module, ModuleOptions, ModuleStats};
use crate::orchestrator::CalcReport;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use tws_core::{Provenance, Schema, Universe, Value, WriteOutcome};
use tws_graph::{DependencyGraph, GraphStats};
use tws_persist::PersistenceAdapter;
use tws_store::{KeyNamespace, StoreStats, ValueStore};

#[derive(Default)]
struct Registry {
    /// Registration order.
    modules: Vec<Arc<Module>>,
    /// Field name to the module that declares it.
    publishers: HashMap<String, String>,
}

/// Coordinator for a set of modules sharing one store.
///
/// # Example
///
/// ```rust
/// use tws_core::{FieldDecl, Provenance, Universe, Value};
/// use tws_sdk::{Engine, EngineConfig, FnCalculation};
///
/// let engine = Engine::new(EngineConfig::default());
/// let occupancy = engine
///     .register(FnCalculation::new(
///         "occupancy",
///         vec![
///             FieldDecl::number("dailyHours", 12.0).reference_default(8.0),
///             FieldDecl::number("annualOccupiedHours", 0.0)
///                 .derived()
///                 .depends_on(["dailyHours"]),
///         ],
///         |ctx| {
///             let hours = ctx.number("dailyHours");
///             ctx.set_output("annualOccupiedHours", hours * 365.0)
///         },
///     ))
///     .unwrap();
///
/// occupancy.set("dailyHours", Value::Number(10.0), Provenance::User).unwrap();
///
/// let exported = engine.export_namespace();
/// assert_eq!(exported["annualOccupiedHours"], "3650");
/// assert_eq!(exported["ref_annualOccupiedHours"], "2920");
/// ```
pub struct Engine {
    config: EngineConfig,
    store: ValueStore,
    persistence: PersistenceAdapter,
    registry: RwLock<Registry>,
    /// Serializes registrations.
    registering: Mutex<()>,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl Engine {
    /// Engine with in-memory persistence.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_persistence(config, PersistenceAdapter::in_memory())
    }

    pub fn with_persistence(config: EngineConfig, persistence: PersistenceAdapter) -> Self {
        let store = ValueStore::with_namespace(KeyNamespace::new(config.reference_prefix.clone()));
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            store,
            persistence,
            registry: RwLock::new(Registry::default()),
            registering: Mutex::new(()),
            event_tx,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &ValueStore {
        &self.store
    }

    pub fn persistence(&self) -> &PersistenceAdapter {
        &self.persistence
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    // === Registration ===

    /// Validate, construct and initialize a module.
    ///
    /// Rejected before anything is published: duplicate module ids, fields
    /// already declared by another module, field names that clash with the
    /// reference prefix, and dependencies that would close a cycle.
    pub fn register(
        &self,
        calculation: impl Calculation + 'static,
    ) -> Result<Arc<Module>, EngineError> {
        let _registering = self.registering.lock();

        // Checked before construction: dropping a module detaches every
        // listener registered under its id.
        if self.module(calculation.id()).is_some() {
            return Err(EngineError::DuplicateModule(calculation.id().to_string()));
        }

        let mut options = ModuleOptions::default()
            .with_orchestrator(self.config.orchestrator.clone())
            .with_event_capacity(self.config.event_capacity)
            .with_engine_events(self.event_tx.clone());
        if self.config.persist_user_edits {
            options = options.with_persistence(self.persistence.clone());
        }
        let module = Module::new(calculation, self.store.clone(), options)?;

        {
            let registry = self.registry.read();
            self.check_module(&registry, &module)?;
        }

        module.initialize()?;

        {
            let mut registry = self.registry.write();
            for decl in module.schema().fields() {
                registry
                    .publishers
                    .insert(decl.name.clone(), module.id().to_string());
            }
            registry.modules.push(Arc::clone(&module));
        }

        info!(module = %module.id(), "Registered module");
        let _ = self.event_tx.send(EngineEvent::Registered {
            module: module.id().to_string(),
        });
        Ok(module)
    }

    fn check_module(&self, registry: &Registry, module: &Module) -> Result<(), EngineError> {
        let id = module.id();
        let schema = module.schema();
        for decl in schema.fields() {
            if let Some(existing) = registry.publishers.get(&decl.name) {
                return Err(EngineError::DuplicatePublisher {
                    field: decl.name.clone(),
                    existing: existing.clone(),
                    incoming: id.to_string(),
                });
            }
            self.store.namespace().check_field_name(&decl.name)?;
        }

        // Dry run against a copy so a rejected module leaves no edges behind.
        let mut graph = self.store.dependency_graph();
        add_schema_edges(&mut graph, schema, id)?;
        Ok(())
    }

    pub fn module(&self, id: &str) -> Option<Arc<Module>> {
        self.registry
            .read()
            .modules
            .iter()
            .find(|m| m.id() == id)
            .cloned()
    }

    pub fn require(&self, id: &str) -> Result<Arc<Module>, EngineError> {
        self.module(id)
            .ok_or_else(|| EngineError::UnknownModule(id.to_string()))
    }

    /// Modules in registration order.
    pub fn modules(&self) -> Vec<Arc<Module>> {
        self.registry.read().modules.clone()
    }

    pub fn module_ids(&self) -> Vec<String> {
        self.registry
            .read()
            .modules
            .iter()
            .map(|m| m.id().to_string())
            .collect()
    }

    // === Whole-model operations ===

    /// Modules ordered so that publishers come before their consumers.
    ///
    /// Ties keep registration order; modules caught in a module-level loop
    /// (possible without any field-level cycle) follow in registration
    /// order.
    pub fn evaluation_order(&self) -> Vec<Arc<Module>> {
        let registry = self.registry.read();
        let modules = &registry.modules;
        let position: HashMap<&str, usize> = modules
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id(), i))
            .collect();

        let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); modules.len()];
        let mut pending: Vec<usize> = vec![0; modules.len()];
        for (i, module) in modules.iter().enumerate() {
            let mut producers: Vec<usize> = module
                .schema()
                .external_dependencies()
                .iter()
                .filter_map(|field| registry.publishers.get(field))
                .filter_map(|publisher| position.get(publisher.as_str()).copied())
                .filter(|&p| p != i)
                .collect();
            producers.sort_unstable();
            producers.dedup();
            pending[i] = producers.len();
            for p in producers {
                consumers[p].push(i);
            }
        }

        let mut ready: VecDeque<usize> = (0..modules.len()).filter(|&i| pending[i] == 0).collect();
        let mut order = Vec::with_capacity(modules.len());
        let mut placed = vec![false; modules.len()];
        while let Some(i) = ready.pop_front() {
            order.push(i);
            placed[i] = true;
            for &c in &consumers[i] {
                pending[c] -= 1;
                if pending[c] == 0 {
                    ready.push_back(c);
                }
            }
        }
        order.extend((0..modules.len()).filter(|&i| !placed[i]));

        order.into_iter().map(|i| Arc::clone(&modules[i])).collect()
    }

    /// Recalculate every module in evaluation order.
    pub fn calculate_everything(&self) -> Vec<CalcReport> {
        let reports: Vec<CalcReport> = self
            .evaluation_order()
            .iter()
            .map(|m| m.calculate_all())
            .collect();
        debug!(modules = reports.len(), "Calculated everything");
        let _ = self.event_tx.send(EngineEvent::CalculatedEverything {
            modules: reports.len(),
        });
        reports
    }

    /// Switch every module's visible universe. Returns how many changed.
    pub fn switch_all(&self, universe: Universe) -> usize {
        let switched = self
            .modules()
            .iter()
            .filter(|m| m.switch_mode(universe))
            .count();
        let _ = self
            .event_tx
            .send(EngineEvent::SwitchedAll { universe, switched });
        switched
    }

    /// Reset every module to its defaults, in evaluation order.
    pub fn reset_all(&self) -> Result<Vec<CalcReport>, EngineError> {
        let mut reports = Vec::new();
        for module in self.evaluation_order() {
            reports.push(module.reset_to_defaults()?);
        }
        info!(modules = reports.len(), "Reset all modules");
        let _ = self.event_tx.send(EngineEvent::ResetAll {
            modules: reports.len(),
        });
        Ok(reports)
    }

    // === Namespace ===

    /// Every stored value under its namespaced key.
    pub fn export_namespace(&self) -> BTreeMap<String, String> {
        self.store.export_namespace()
    }

    pub fn get_namespaced(&self, name: &str) -> Option<Value> {
        self.store.get_namespaced(name)
    }

    /// Write a value arriving from an external collaborator.
    ///
    /// Fields declared by a module go through that module (coercion,
    /// persistence); anything else is written to the store directly.
    pub fn import_namespaced(
        &self,
        name: &str,
        value: Value,
        provenance: Provenance,
    ) -> Result<WriteOutcome, EngineError> {
        let key = self.store.namespace().parse(name);
        let owner = self.registry.read().publishers.get(key.field()).cloned();
        match owner.and_then(|id| self.module(&id)) {
            Some(module) => Ok(module.set_in(key.universe(), key.field(), value, provenance)?),
            None => Ok(self.store.import_namespaced(name, value, provenance)?),
        }
    }

    // === Diagnostics ===

    pub fn dependency_graph(&self) -> DependencyGraph {
        self.store.dependency_graph()
    }

    pub fn stats(&self) -> EngineStats {
        let modules = self
            .modules()
            .iter()
            .map(|m| (m.id().to_string(), m.stats()))
            .collect();
        EngineStats {
            modules,
            store: self.store.stats(),
            graph: self.store.dependency_graph().stats(),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("modules", &self.module_ids())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn add_schema_edges(
    graph: &mut DependencyGraph,
    schema: &Schema,
    note: &str,
) -> Result<(), EngineError> {
    for decl in schema.fields() {
        for upstream in &decl.depends_on {
            graph.add_edge(upstream, &decl.name, note)?;
        }
    }
    Ok(())
}

/// Snapshot of engine activity.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineStats {
    pub modules: BTreeMap<String, ModuleStats>,
    pub store: StoreStats,
    pub graph: GraphStats,
}
