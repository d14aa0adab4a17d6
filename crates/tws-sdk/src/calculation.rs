//! The computation plugged into a module, and the context it runs in.

use crate::error::CalcError;
use crate::state::UniverseState;
use std::collections::BTreeMap;
use std::fmt;
use tws_core::{FieldDecl, FieldKey, Schema, Universe, Value};
use tws_store::ValueStore;

/// A module's field declarations and its per-universe computation.
///
/// `calculate` is called once per universe per recomputation and must
/// only read through the [`PassContext`] it is given.
pub trait Calculation: Send + Sync {
    /// Module identifier; also the persistence slot and listener owner.
    fn id(&self) -> &str;

    /// Field declarations, inputs and derived results alike.
    fn schema(&self) -> Vec<FieldDecl>;

    /// Compute derived fields for `ctx.universe()`.
    fn calculate(&self, ctx: &mut PassContext<'_>) -> Result<(), CalcError>;
}

/// Read/write view bound to a single universe for one pass.
///
/// Reads of the module's own fields come from its sub-store for the pass
/// universe (outputs already set in this pass win). Every other field is
/// read from the shared store under the same universe; there is no fallback
/// to the other universe.
pub struct PassContext<'a> {
    module: &'a str,
    universe: Universe,
    schema: &'a Schema,
    state: &'a UniverseState,
    store: &'a ValueStore,
    outputs: BTreeMap<String, Value>,
}

impl<'a> PassContext<'a> {
    pub(crate) fn new(
        module: &'a str,
        universe: Universe,
        schema: &'a Schema,
        state: &'a UniverseState,
        store: &'a ValueStore,
    ) -> Self {
        Self {
            module,
            universe,
            schema,
            state,
            store,
            outputs: BTreeMap::new(),
        }
    }

    pub fn module(&self) -> &str {
        self.module
    }

    pub fn universe(&self) -> Universe {
        self.universe
    }

    /// Current value of `field` in the pass universe.
    pub fn get(&self, field: &str) -> Option<Value> {
        if let Some(value) = self.outputs.get(field) {
            return Some(value.clone());
        }
        if self.schema.contains(field) {
            return self.state.value(field).cloned();
        }
        self.upstream(field)
    }

    /// Numeric reading of `field`.
    ///
    /// Missing or unparsable values yield the field's declared fallback, or
    /// zero for fields other modules publish.
    pub fn number(&self, field: &str) -> f64 {
        let fallback = self
            .schema
            .get(field)
            .map_or(0.0, |decl| decl.fallback_value().number_or(0.0));
        self.number_or(field, fallback)
    }

    pub fn number_or(&self, field: &str, fallback: f64) -> f64 {
        self.get(field).map_or(fallback, |v| v.number_or(fallback))
    }

    /// String reading of `field`; empty when absent.
    pub fn text(&self, field: &str) -> String {
        self.get(field)
            .map(|v| v.to_plain_string())
            .unwrap_or_default()
    }

    /// Value another module published under `field` in the pass universe.
    pub fn upstream(&self, field: &str) -> Option<Value> {
        self.store.get(&FieldKey::new(self.universe, field))
    }

    pub fn upstream_number(&self, field: &str, fallback: f64) -> f64 {
        self.store
            .number(&FieldKey::new(self.universe, field), fallback)
    }

    /// Buffer a derived output. Values are coerced to the declared kind.
    pub fn set_output(&mut self, field: &str, value: impl Into<Value>) -> Result<(), CalcError> {
        let decl = self
            .schema
            .get(field)
            .ok_or_else(|| CalcError::UnknownOutput(field.to_string()))?;
        if !decl.is_derived() {
            return Err(CalcError::NotDerived(field.to_string()));
        }
        let value = decl.coerce_or_fallback(&value.into());
        self.outputs.insert(field.to_string(), value);
        Ok(())
    }

    pub fn outputs(&self) -> &BTreeMap<String, Value> {
        &self.outputs
    }

    pub(crate) fn into_outputs(self) -> BTreeMap<String, Value> {
        self.outputs
    }
}

impl fmt::Debug for PassContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassContext")
            .field("module", &self.module)
            .field("universe", &self.universe)
            .field("outputs", &self.outputs)
            .finish()
    }
}

/// A [`Calculation`] assembled from a field list and a closure.
pub struct FnCalculation<F> {
    id: String,
    fields: Vec<FieldDecl>,
    func: F,
}

impl<F> FnCalculation<F>
where
    F: Fn(&mut PassContext<'_>) -> Result<(), CalcError> + Send + Sync,
{
    pub fn new(id: impl Into<String>, fields: Vec<FieldDecl>, func: F) -> Self {
        Self {
            id: id.into(),
            fields,
            func,
        }
    }
}

impl<F> Calculation for FnCalculation<F>
where
    F: Fn(&mut PassContext<'_>) -> Result<(), CalcError> + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn schema(&self) -> Vec<FieldDecl> {
        self.fields.clone()
    }

    fn calculate(&self, ctx: &mut PassContext<'_>) -> Result<(), CalcError> {
        (self.func)(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tws_core::Provenance;

    fn schema() -> Schema {
        Schema::new(vec![
            FieldDecl::number("dailyHours", 12.0).reference_default(8.0),
            FieldDecl::number("cop", 3.0).fallback(1.0),
            FieldDecl::number("annualOccupiedHours", 0.0)
                .derived()
                .depends_on(["dailyHours"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_reads_are_bound_to_pass_universe() {
        let schema = schema();
        let store = ValueStore::new();
        store.set(FieldKey::target("climateHdd"), Value::Number(4000.0), Provenance::Computed);

        let state = UniverseState::seeded(&schema, Universe::Reference);
        let ctx = PassContext::new("occupancy", Universe::Reference, &schema, &state, &store);

        assert_eq!(ctx.number("dailyHours"), 8.0);
        // Published only in Target: no cross-universe fallback.
        assert_eq!(ctx.upstream("climateHdd"), None);
        assert_eq!(ctx.upstream_number("climateHdd", -1.0), -1.0);
    }

    #[test]
    fn test_declared_fallback_for_unparsable_input() {
        let schema = schema();
        let store = ValueStore::new();
        let mut state = UniverseState::seeded(&schema, Universe::Target);
        state.set("cop", Value::text("n/a"), Provenance::User);

        let ctx = PassContext::new("m", Universe::Target, &schema, &state, &store);
        assert_eq!(ctx.number("cop"), 1.0);
        assert_eq!(ctx.number("notPublishedYet"), 0.0);
    }

    #[test]
    fn test_outputs_shadow_state_and_are_validated() {
        let schema = schema();
        let store = ValueStore::new();
        let state = UniverseState::seeded(&schema, Universe::Target);
        let mut ctx = PassContext::new("m", Universe::Target, &schema, &state, &store);

        ctx.set_output("annualOccupiedHours", 4380.0).unwrap();
        assert_eq!(ctx.number("annualOccupiedHours"), 4380.0);
        assert_eq!(
            ctx.set_output("dailyHours", 1.0),
            Err(CalcError::NotDerived("dailyHours".into()))
        );
        assert_eq!(
            ctx.set_output("bogus", 1.0),
            Err(CalcError::UnknownOutput("bogus".into()))
        );
        assert_eq!(ctx.outputs().len(), 1);
    }
}
