//! Per-module, per-universe sub-stores.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use tws_core::{Provenance, Schema, StoredValue, Universe, Value, WriteOutcome};
use tws_persist::StateMap;

/// One universe's field values inside a module.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UniverseState {
    universe: Universe,
    fields: BTreeMap<String, StoredValue>,
    /// Seeded from the schema at least once.
    pub initialized: bool,
    /// Changed since the last save.
    pub dirty: bool,
}

impl UniverseState {
    pub fn new(universe: Universe) -> Self {
        Self {
            universe,
            fields: BTreeMap::new(),
            initialized: false,
            dirty: false,
        }
    }

    /// A state seeded from `schema` for `universe`.
    pub fn seeded(schema: &Schema, universe: Universe) -> Self {
        let mut state = Self::new(universe);
        state.seed_defaults(schema);
        state
    }

    /// Replace every field with its declared default for this universe.
    pub fn seed_defaults(&mut self, schema: &Schema) {
        self.fields = schema
            .fields()
            .iter()
            .map(|decl| {
                let value = decl.default_for(self.universe).clone();
                (decl.name.clone(), StoredValue::new(value, Provenance::Default))
            })
            .collect();
        self.initialized = true;
        self.dirty = false;
    }

    pub fn universe(&self) -> Universe {
        self.universe
    }

    pub fn get(&self, field: &str) -> Option<&StoredValue> {
        self.fields.get(field)
    }

    pub fn value(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).map(|s| &s.value)
    }

    pub fn number(&self, field: &str, fallback: f64) -> f64 {
        self.value(field).map_or(fallback, |v| v.number_or(fallback))
    }

    /// Write a field under the store's overwrite rule.
    pub fn set(&mut self, field: &str, value: Value, provenance: Provenance) -> WriteOutcome {
        let outcome = match self.fields.get_mut(field) {
            Some(existing) if !existing.accepts_write(provenance) => WriteOutcome::Rejected,
            Some(existing) => {
                existing.value = value;
                existing.provenance = provenance;
                WriteOutcome::Updated
            }
            None => {
                self.fields
                    .insert(field.to_string(), StoredValue::new(value, provenance));
                WriteOutcome::Inserted
            }
        };
        if outcome.is_stored() {
            self.dirty = true;
        }
        outcome
    }

    /// Overlay persisted fields onto the current (seeded) state.
    ///
    /// Fields the schema does not declare are ignored; values that cannot be
    /// read as the declared kind keep the seeded default. Returns how many
    /// fields were taken from `persisted`.
    pub fn restore(&mut self, schema: &Schema, persisted: &StateMap) -> usize {
        let mut restored = 0;
        for (name, stored) in persisted {
            let Some(decl) = schema.get(name) else {
                debug!(field = %name, universe = %self.universe, "Ignoring unknown persisted field");
                continue;
            };
            let Some(value) = decl.kind.coerce(&stored.value) else {
                debug!(field = %name, universe = %self.universe, "Persisted value has wrong kind, keeping default");
                continue;
            };
            self.fields
                .insert(name.clone(), StoredValue::new(value, stored.provenance));
            restored += 1;
        }
        self.dirty = false;
        restored
    }

    /// Fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &StoredValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copy for persistence.
    pub fn to_state_map(&self) -> StateMap {
        self.fields.clone()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Both universes of one module.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    pub target: UniverseState,
    pub reference: UniverseState,
}

impl ModuleState {
    pub fn seeded(schema: &Schema) -> Self {
        Self {
            target: UniverseState::seeded(schema, Universe::Target),
            reference: UniverseState::seeded(schema, Universe::Reference),
        }
    }

    pub fn get(&self, universe: Universe) -> &UniverseState {
        match universe {
            Universe::Target => &self.target,
            Universe::Reference => &self.reference,
        }
    }

    pub fn get_mut(&mut self, universe: Universe) -> &mut UniverseState {
        match universe {
            Universe::Target => &mut self.target,
            Universe::Reference => &mut self.reference,
        }
    }
}
