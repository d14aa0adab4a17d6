//! Dual-universe recalculation.
//!
//! `calculate_all` runs a Target pass and then a Reference pass for one
//! module. Each pass is bound to its universe through a [`PassContext`],
//! buffers its outputs, writes them to the module's sub-store and publishes
//! them to the shared store as one [`WriteBatch`].

use crate::calculation::PassContext;
use crate::error::CalcError;
use crate::events::ModuleEvent;
use crate::module::Module;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use tracing::{debug, debug_span, warn};
use tws_core::{FieldKey, Provenance, Universe, Value};
use tws_store::WriteBatch;

/// How a pass ended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PassOutcome {
    Completed,
    /// The calculation failed; zeroed outputs were published.
    Failed(String),
}

/// Result of one recomputation pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PassReport {
    pub universe: Universe,
    pub outcome: PassOutcome,
    /// Outputs as published.
    pub outputs: BTreeMap<String, Value>,
    /// Outputs the store refused under the overwrite rule.
    pub rejected: usize,
}

impl PassReport {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, PassOutcome::Failed(_))
    }
}

/// Result of one `calculate_all`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalcReport {
    pub module: String,
    /// Target pass first, then Reference.
    pub passes: Vec<PassReport>,
    /// Reference outputs re-applied as computed-persistent.
    pub reasserted: usize,
    /// Returned from the re-entrancy guard without running.
    pub cached: bool,
}

impl CalcReport {
    pub(crate) fn empty(module: &str) -> Self {
        Self {
            module: module.to_string(),
            passes: Vec::new(),
            reasserted: 0,
            cached: false,
        }
    }

    pub fn pass(&self, universe: Universe) -> Option<&PassReport> {
        self.passes.iter().find(|p| p.universe == universe)
    }

    /// Output of `field` in `universe`, if that pass produced it.
    pub fn output(&self, universe: Universe, field: &str) -> Option<&Value> {
        self.pass(universe).and_then(|p| p.outputs.get(field))
    }

    pub fn failed_passes(&self) -> usize {
        self.passes.iter().filter(|p| p.is_failed()).count()
    }
}

impl Module {
    /// Recalculate both universes.
    ///
    /// Re-entering this while it runs for the same module returns the last
    /// completed report (flagged `cached`) instead of recursing. If such a
    /// re-entry came from an external dependency that moved, both passes run
    /// again once the current round finishes.
    pub fn calculate_all(&self) -> CalcReport {
        let entry = self.guard.run(|| self.run_until_settled());
        if !entry.is_cached() {
            return entry.into_value().unwrap_or_else(|| CalcReport::empty(&self.id));
        }

        self.counters.short_circuits.fetch_add(1, Ordering::Relaxed);
        debug!(module = %self.id, "Recalculation already running, returning cached outputs");
        let mut report = entry
            .into_value()
            .unwrap_or_else(|| CalcReport::empty(&self.id));
        report.cached = true;
        report
    }

    /// Last completed report.
    pub fn last_report(&self) -> Option<CalcReport> {
        self.guard.last()
    }

    /// Run both passes, repeating while external dependencies change under
    /// them, up to `max_reruns` extra rounds. Must run inside the guard.
    pub(crate) fn run_until_settled(&self) -> CalcReport {
        let mut reruns = 0;
        loop {
            self.upstream_moved.store(false, Ordering::Release);
            let before = self.external_values();
            let report = self.run_passes();

            if !self.upstream_moved.load(Ordering::Acquire) || self.external_values() == before {
                return report;
            }
            if reruns == self.config.max_reruns {
                warn!(module = %self.id, reruns, "Upstream values still moving, keeping last round");
                return report;
            }
            reruns += 1;
            self.counters.reruns.fetch_add(1, Ordering::Relaxed);
            debug!(module = %self.id, reruns, "Upstream moved during recalculation, running again");
        }
    }

    fn external_values(&self) -> Vec<Option<Value>> {
        let mut values = Vec::with_capacity(self.external.len() * 2);
        for universe in Universe::ALL {
            for field in &self.external {
                values.push(self.store.get(&FieldKey::new(universe, field)));
            }
        }
        values
    }

    fn run_passes(&self) -> CalcReport {
        let span = debug_span!("calculate_all", module = %self.id);
        let _enter = span.enter();

        let mut report = CalcReport::empty(&self.id);
        for universe in Universe::ALL {
            report.passes.push(self.run_pass(universe));
        }

        if self.config.reassert_reference && self.visible_universe() == Universe::Reference {
            if let Some(reference) = report.pass(Universe::Reference) {
                report.reasserted = self.reassert(&reference.outputs);
            }
        }

        self.counters.calculations.fetch_add(1, Ordering::Relaxed);
        let failed_passes = report.failed_passes();
        debug!(failed_passes, reasserted = report.reasserted, "Recalculated");
        self.events.emit(ModuleEvent::Recalculated {
            module: self.id.clone(),
            failed_passes,
        });
        report
    }

    fn run_pass(&self, universe: Universe) -> PassReport {
        let span = debug_span!("pass", module = %self.id, %universe);
        let _enter = span.enter();
        let _active = self.override_active(universe);

        let snapshot = self.state.read().get(universe).clone();
        let mut ctx = PassContext::new(&self.id, universe, &self.schema, &snapshot, &self.store);

        let result = if self.config.catch_panics {
            catch_unwind(AssertUnwindSafe(|| self.calculation.calculate(&mut ctx)))
                .unwrap_or_else(|payload| Err(CalcError::Panicked(panic_message(payload))))
        } else {
            self.calculation.calculate(&mut ctx)
        };

        let (outputs, outcome) = match result {
            Ok(()) => (ctx.into_outputs(), PassOutcome::Completed),
            Err(error) => {
                warn!(module = %self.id, %universe, %error, "Pass failed, publishing zeroed outputs");
                self.counters.failed_passes.fetch_add(1, Ordering::Relaxed);
                self.events.emit(ModuleEvent::PassFailed {
                    module: self.id.clone(),
                    universe,
                    error: error.to_string(),
                });
                (self.zeroed_outputs(), PassOutcome::Failed(error.to_string()))
            }
        };

        let rejected = self.publish_outputs(universe, &outputs, Provenance::Computed);
        PassReport {
            universe,
            outcome,
            outputs,
            rejected,
        }
    }

    fn zeroed_outputs(&self) -> BTreeMap<String, Value> {
        self.schema
            .derived()
            .map(|decl| (decl.name.clone(), decl.zero_value()))
            .collect()
    }

    /// Write outputs to the sub-store, then publish them as one batch.
    /// Returns how many the store refused.
    fn publish_outputs(
        &self,
        universe: Universe,
        outputs: &BTreeMap<String, Value>,
        provenance: Provenance,
    ) -> usize {
        if outputs.is_empty() {
            return 0;
        }

        let mut batch = WriteBatch::with_capacity(outputs.len());
        {
            let mut state = self.state.write();
            let sub = state.get_mut(universe);
            for (field, value) in outputs {
                sub.set(field, value.clone(), provenance);
                batch.push(FieldKey::new(universe, field), value.clone(), provenance);
            }
        }

        let report = self.store.apply(batch);
        report.rejected.len()
    }

    fn reassert(&self, outputs: &BTreeMap<String, Value>) -> usize {
        let rejected =
            self.publish_outputs(Universe::Reference, outputs, Provenance::ComputedPersistent);
        outputs.len() - rejected
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
