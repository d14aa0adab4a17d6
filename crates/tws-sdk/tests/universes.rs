//! Integration tests for dual-universe behavior of engine-hosted modules.
//!
//! Tests cover:
//! - Target edits never change Reference values
//! - Switching modes writes nothing
//! - Recalculating twice changes nothing
//! - Reset matches a fresh initialization
//! - Explicit Reference writes publish only under the prefixed key

use proptest::prelude::*;
use std::sync::Arc;
use tws_core::{FieldDecl, Provenance, Universe, Value};
use tws_sdk::{CalcError, Engine, EngineConfig, FnCalculation, Module, PassContext};

fn occupancy_fields() -> Vec<FieldDecl> {
    vec![
        FieldDecl::number("occupants", 100.0),
        FieldDecl::number("dailyHours", 8.0).reference_default(8.0),
        FieldDecl::choice("usage", ["Office", "School", "Residential"], "Office")
            .reference_default("Residential"),
        FieldDecl::number("annualOccupiedHours", 0.0)
            .derived()
            .depends_on(["dailyHours"]),
    ]
}

fn occupancy(ctx: &mut PassContext<'_>) -> Result<(), CalcError> {
    let hours = ctx.number("dailyHours");
    ctx.set_output("annualOccupiedHours", hours * 365.0)
}

fn gains(ctx: &mut PassContext<'_>) -> Result<(), CalcError> {
    let per_person = if ctx.text("usage") == "Office" { 0.08 } else { 0.07 };
    let kwh = ctx.number("occupants") * ctx.number("annualOccupiedHours") * per_person;
    ctx.set_output("occupantGains", kwh)
}

fn model() -> (Engine, Arc<Module>, Arc<Module>) {
    let engine = Engine::new(EngineConfig::default());
    let occ = engine
        .register(FnCalculation::new("occupancy", occupancy_fields(), occupancy))
        .unwrap();
    let gain = engine
        .register(FnCalculation::new(
            "gains",
            vec![FieldDecl::number("occupantGains", 0.0)
                .derived()
                .depends_on(["occupants", "annualOccupiedHours", "usage"])],
            gains,
        ))
        .unwrap();
    (engine, occ, gain)
}

fn input_strategy() -> impl Strategy<Value = (usize, f64)> {
    (0usize..2, 0.0f64..24.0)
}

proptest! {
    /// Any sequence of Target edits leaves the Reference universe alone.
    #[test]
    fn target_edits_never_reach_reference(edits in prop::collection::vec(input_strategy(), 1..20)) {
        let (engine, occ, _gain) = model();
        let reference_before = engine.store().universe_view(Universe::Reference);
        let reference_state = occ.state_of(Universe::Reference);

        for (field, value) in edits {
            let name = ["occupants", "dailyHours"][field];
            occ.set_in(Universe::Target, name, Value::Number(value), Provenance::User).unwrap();
        }

        prop_assert_eq!(engine.store().universe_view(Universe::Reference), reference_before);
        prop_assert_eq!(occ.state_of(Universe::Reference), reference_state);
    }
}

#[test]
fn test_target_edit_scenario() {
    let (engine, occ, gain) = model();
    occ.set("occupants", Value::Number(126.0), Provenance::User).unwrap();
    occ.set("dailyHours", Value::Number(12.0), Provenance::User).unwrap();

    assert_eq!(occ.get_in(Universe::Target, "annualOccupiedHours"), Some(Value::Number(4380.0)));
    assert_eq!(occ.get_in(Universe::Reference, "annualOccupiedHours"), Some(Value::Number(2920.0)));
    assert_eq!(
        gain.get_in(Universe::Target, "occupantGains"),
        Some(Value::Number(126.0 * 4380.0 * 0.08))
    );
    assert_eq!(
        gain.get_in(Universe::Reference, "occupantGains"),
        Some(Value::Number(100.0 * 2920.0 * 0.07))
    );
    assert_eq!(engine.get_namespaced("ref_annualOccupiedHours"), Some(Value::Number(2920.0)));
}

#[test]
fn test_reference_write_while_target_active() {
    let (engine, occ, _gain) = model();
    assert_eq!(occ.visible_universe(), Universe::Target);
    let bare_before = engine.get_namespaced("dailyHours");

    occ.set_in(Universe::Reference, "dailyHours", Value::Number(10.0), Provenance::User)
        .unwrap();

    assert_eq!(engine.get_namespaced("ref_dailyHours"), Some(Value::Number(10.0)));
    assert_eq!(engine.get_namespaced("dailyHours"), bare_before);
    assert_eq!(engine.get_namespaced("ref_annualOccupiedHours"), Some(Value::Number(3650.0)));
    assert_eq!(engine.get_namespaced("annualOccupiedHours"), Some(Value::Number(2920.0)));
}

#[test]
fn test_mode_switch_round_trip_writes_nothing() {
    let (engine, occ, gain) = model();
    occ.set("dailyHours", Value::Number(11.0), Provenance::User).unwrap();

    let store_before = engine.store().snapshot();
    let occ_before = occ.module_state();
    let gain_before = gain.module_state();
    let calcs_before = occ.stats().calculations;

    assert_eq!(engine.switch_all(Universe::Reference), 2);
    assert_eq!(occ.render().get("dailyHours").map(|f| f.value.clone()), Some(Value::Number(8.0)));
    assert_eq!(engine.switch_all(Universe::Target), 2);

    assert_eq!(engine.store().snapshot(), store_before);
    assert_eq!(occ.module_state(), occ_before);
    assert_eq!(gain.module_state(), gain_before);
    assert_eq!(occ.stats().calculations, calcs_before);
}

#[test]
fn test_switching_to_current_mode_is_noop() {
    let (_engine, occ, _gain) = model();
    let mut events = occ.subscribe();
    assert!(!occ.switch_mode(Universe::Target));
    assert!(events.try_recv().is_err());
}

#[test]
fn test_calculate_all_is_idempotent() {
    let (engine, occ, _gain) = model();
    occ.set("dailyHours", Value::Number(9.5), Provenance::User).unwrap();

    engine.calculate_everything();
    let first = engine.store().snapshot();
    let first_state = occ.module_state();

    engine.calculate_everything();
    assert_eq!(engine.store().snapshot(), first);
    assert_eq!(occ.module_state(), first_state);
}

#[test]
fn test_reset_matches_fresh_initialization() {
    let (edited, occ, _gain) = model();
    occ.set("occupants", Value::Number(40.0), Provenance::User).unwrap();
    occ.set_in(Universe::Reference, "usage", Value::choice("School"), Provenance::User)
        .unwrap();
    edited.switch_all(Universe::Reference);
    edited.switch_all(Universe::Target);
    edited.reset_all().unwrap();

    let (fresh, fresh_occ, _) = model();
    assert_eq!(edited.store().snapshot(), fresh.store().snapshot());
    assert_eq!(occ.module_state(), fresh_occ.module_state());
    assert!(edited.persistence().slots().unwrap().is_empty());
}

#[test]
fn test_reset_recalculates_once() {
    let (_engine, occ, _gain) = model();
    occ.set("dailyHours", Value::Number(10.0), Provenance::User).unwrap();
    let before = occ.stats().calculations;

    let report = occ.reset_to_defaults().unwrap();
    assert!(!report.cached);
    assert_eq!(occ.stats().calculations, before + 1);
    assert_eq!(occ.get("annualOccupiedHours"), Some(Value::Number(2920.0)));
}

#[test]
fn test_unparsable_input_takes_fallback() {
    let (_engine, occ, _gain) = model();
    occ.set("dailyHours", Value::text("all day"), Provenance::User).unwrap();
    assert_eq!(occ.get("dailyHours"), Some(Value::Number(0.0)));
    assert_eq!(occ.get("annualOccupiedHours"), Some(Value::Number(0.0)));
}

#[test]
fn test_unknown_field_is_an_error() {
    let (_engine, occ, _gain) = model();
    assert!(occ
        .set("ceilingHeight", Value::Number(3.0), Provenance::User)
        .is_err());
}
