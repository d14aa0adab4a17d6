//! The three calculator sections wired into the engine.
//!
//! ```text
//! occupancy ──annualOccupiedHours, occupants──▶ gains
//!     │                                          ▲
//!     └──annualOccupiedHours──▶ ventilation ─floorArea (from gains)
//! ```

use tws_sdk::prelude::*;

pub const OCCUPANCY: &str = "occupancy";
pub const GAINS: &str = "gains";
pub const VENTILATION: &str = "ventilation";

/// Sensible heat per occupant, in watts.
const WATTS_PER_OCCUPANT: f64 = 75.0;
/// Volumetric heat capacity of air, in Wh/(m³·K).
const AIR_HEAT_CAPACITY: f64 = 0.34;

pub fn occupancy() -> impl Calculation {
    FnCalculation::new(
        OCCUPANCY,
        vec![
            FieldDecl::number("occupants", 100.0).describe("People in the building"),
            FieldDecl::number("dailyHours", 8.0)
                .reference_default(8.0)
                .describe("Occupied hours per day"),
            FieldDecl::choice("usage", ["Office", "School", "Residential"], "Office"),
            FieldDecl::number("annualOccupiedHours", 0.0)
                .derived()
                .depends_on(["dailyHours"])
                .describe("Occupied hours per year"),
        ],
        |ctx: &mut PassContext<'_>| {
            let hours = ctx.number("dailyHours");
            ctx.set_output("annualOccupiedHours", hours * 365.0)
        },
    )
}

pub fn gains() -> impl Calculation {
    FnCalculation::new(
        GAINS,
        vec![
            FieldDecl::number("floorArea", 1500.0).describe("Conditioned floor area, m²"),
            FieldDecl::number("lightingDensity", 6.0)
                .reference_default(10.0)
                .describe("Installed lighting, W/m²"),
            FieldDecl::number("equipmentDensity", 8.0).describe("Plug loads, W/m²"),
            FieldDecl::number("occupantGains", 0.0)
                .derived()
                .depends_on(["occupants", "annualOccupiedHours"])
                .describe("kWh/yr"),
            FieldDecl::number("lightingGains", 0.0)
                .derived()
                .depends_on(["floorArea", "lightingDensity", "annualOccupiedHours"])
                .describe("kWh/yr"),
            FieldDecl::number("equipmentGains", 0.0)
                .derived()
                .depends_on(["floorArea", "equipmentDensity", "annualOccupiedHours"])
                .describe("kWh/yr"),
            FieldDecl::number("totalInternalGains", 0.0)
                .derived()
                .depends_on(["occupantGains", "lightingGains", "equipmentGains"])
                .describe("kWh/yr"),
        ],
        |ctx: &mut PassContext<'_>| {
            let hours = ctx.number("annualOccupiedHours");
            let area = ctx.number("floorArea");
            let occupants = ctx.number("occupants") * WATTS_PER_OCCUPANT * hours / 1000.0;
            let lighting = area * ctx.number("lightingDensity") * hours / 1000.0;
            let equipment = area * ctx.number("equipmentDensity") * hours / 1000.0;
            ctx.set_output("occupantGains", occupants)?;
            ctx.set_output("lightingGains", lighting)?;
            ctx.set_output("equipmentGains", equipment)?;
            ctx.set_output("totalInternalGains", occupants + lighting + equipment)
        },
    )
}

pub fn ventilation() -> impl Calculation {
    FnCalculation::new(
        VENTILATION,
        vec![
            FieldDecl::number("roomHeight", 3.0),
            FieldDecl::number("airChanges", 2.0)
                .reference_default(1.5)
                .describe("Air changes per hour"),
            FieldDecl::choice("heatRecovery", ["None", "Plate", "Wheel"], "Wheel")
                .reference_default("None"),
            FieldDecl::number("deltaT", 12.0).describe("Mean indoor-outdoor difference, K"),
            FieldDecl::number("airflow", 0.0)
                .derived()
                .depends_on(["floorArea", "roomHeight", "airChanges"])
                .describe("m³/h"),
            FieldDecl::number("ventilationLoss", 0.0)
                .derived()
                .depends_on(["airflow", "heatRecovery", "deltaT", "annualOccupiedHours"])
                .describe("kWh/yr"),
        ],
        |ctx: &mut PassContext<'_>| {
            let airflow =
                ctx.number("floorArea") * ctx.number("roomHeight") * ctx.number("airChanges");
            let recovery = match ctx.text("heatRecovery").as_str() {
                "Wheel" => 0.8,
                "Plate" => 0.6,
                _ => 0.0,
            };
            let loss = airflow
                * AIR_HEAT_CAPACITY
                * ctx.number("deltaT")
                * (1.0 - recovery)
                * ctx.number("annualOccupiedHours")
                / 1000.0;
            ctx.set_output("airflow", airflow)?;
            ctx.set_output("ventilationLoss", loss)
        },
    )
}

/// Register every section in dependency order.
pub fn register_all(engine: &Engine) -> Result<(), EngineError> {
    engine.register(occupancy())?;
    engine.register(gains())?;
    engine.register(ventilation())?;
    Ok(())
}
