//! # TwinState Calc
//!
//! A standalone CLI building calculator built on the TwinState SDK.
//! Every section computes twice: once for the user's design (Target) and
//! once for the code-minimum baseline (Reference).
//!
//! ## Namespace
//!
//! ```text
//! dailyHours        →  Target value
//! ref_dailyHours    →  Reference value   (prefix set with --prefix)
//! ```

mod logging;
mod sections;

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use colored::*;
use tracing::info;
use tws_sdk::{
    Engine, EngineConfigBuilder, FileSlotStore, Module, ModuleView, PersistenceAdapter,
    Provenance, Universe, Value,
};

// ─── CLI ───────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "twinstate-calc")]
#[command(about = "Dual-universe building calculator (TwinState SDK)")]
#[command(version)]
struct Cli {
    /// Directory for persisted section state; in-memory when omitted
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Namespace prefix for Reference values
    #[arg(long, global = true, default_value = "ref_")]
    prefix: String,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Basic demo: edit the design and watch both universes recompute
    Demo,
    /// Isolation check: Target edits never move Reference values
    Isolation,
    /// Mode switching: flip the visible universe without writing anything
    Modes,
    /// Persistence: save edits, restart the engine, restore them
    Persist,
    /// Interactive REPL for manual experimentation
    Interactive,
}

fn build_engine(cli: &Cli) -> anyhow::Result<Engine> {
    let config = EngineConfigBuilder::new()
        .reference_prefix(cli.prefix.clone())
        .build();
    let engine = match &cli.state_dir {
        Some(dir) => {
            let slots = FileSlotStore::new(dir)
                .with_context(|| format!("opening state directory {}", dir.display()))?;
            Engine::with_persistence(config, PersistenceAdapter::new(slots))
        }
        None => Engine::new(config),
    };
    sections::register_all(&engine).context("registering sections")?;
    info!(
        prefix = %cli.prefix,
        persistent = cli.state_dir.is_some(),
        sections = engine.module_ids().len(),
        "Engine ready"
    );
    Ok(engine)
}

fn section_module(engine: &Engine, id: &str) -> anyhow::Result<std::sync::Arc<Module>> {
    Ok(engine.require(id)?)
}

// ─── Pretty printing ──────────────────────────────────────────────────────

fn header(text: &str) {
    let bar = "═".repeat(60);
    println!("\n{}", bar.bright_cyan());
    println!("  {}", text.bold().bright_white());
    println!("{}", bar.bright_cyan());
}

fn section(text: &str) {
    println!("\n{} {}", "▸".bright_yellow(), text.bold());
}

fn step(text: &str) {
    println!("  {} {}", "•".bright_green(), text);
}

fn universe_label(universe: Universe) -> ColoredString {
    match universe {
        Universe::Target => "Target".bright_magenta(),
        Universe::Reference => "Reference".bright_blue(),
    }
}

fn show_view(view: &ModuleView) {
    let border = "─".repeat(56);
    println!("  ┌{}┐", border);
    let title = format!("{} [{}]", view.module, view.universe);
    println!("  │ {:^54} │", title.bright_yellow().to_string());
    println!("  ├{}┤", border);
    for field in &view.fields {
        let value = format_value(&field.value);
        let line = format!(
            "{:<22} {:>14}  {:<10} {}",
            field.name,
            value,
            field.provenance.to_string(),
            field.description
        );
        println!("  │ {:<54} │", line);
    }
    println!("  └{}┘", border);
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Number(n) if n.fract() == 0.0 => format!("{n:.0}"),
        Value::Number(n) => format!("{n:.2}"),
        other => other.to_string(),
    }
}

fn compare(engine: &Engine, field: &str) {
    let target = engine.get_namespaced(field);
    let reference = engine.get_namespaced(&format!("{}{}", engine.config().reference_prefix, field));
    let show = |v: Option<Value>| v.as_ref().map_or("-".to_string(), format_value);
    println!(
        "  {:<22} {} {:>14}   {} {:>14}",
        field,
        universe_label(Universe::Target),
        show(target),
        universe_label(Universe::Reference),
        show(reference)
    );
}

fn check_result(ok: bool, pass: &str, fail: &str) {
    if ok {
        println!("\n  {} {}", "✓".bright_green().bold(), pass.bright_green().bold());
    } else {
        println!("\n  {} {}", "✗".bright_red().bold(), fail.bright_red().bold());
    }
}

// ─── Demo ──────────────────────────────────────────────────────────────────

fn run_demo(engine: &Engine) -> anyhow::Result<()> {
    header("DEMO — One Edit, Two Universes");

    section("Phase 1: Defaults after registration");
    for field in ["annualOccupiedHours", "totalInternalGains", "ventilationLoss"] {
        compare(engine, field);
    }

    section("Phase 2: Edit the design");
    let occupancy = section_module(engine, sections::OCCUPANCY)?;
    occupancy.set("occupants", Value::Number(126.0), Provenance::User)?;
    step("occupancy: occupants = 126");
    occupancy.set("dailyHours", Value::Number(12.0), Provenance::User)?;
    step("occupancy: dailyHours = 12");

    section("Phase 3: Downstream sections recomputed");
    for field in [
        "annualOccupiedHours",
        "occupantGains",
        "totalInternalGains",
        "ventilationLoss",
    ] {
        compare(engine, field);
    }

    section("Occupancy (visible universe)");
    show_view(&occupancy.render());
    Ok(())
}

// ─── Isolation ─────────────────────────────────────────────────────────────

fn run_isolation(engine: &Engine) -> anyhow::Result<()> {
    header("ISOLATION — Target Edits Never Reach Reference");

    let before = engine.store().universe_view(Universe::Reference);
    step(&format!("Reference universe holds {} values", before.len()));

    section("Phase 1: A burst of Target edits");
    let gains = section_module(engine, sections::GAINS)?;
    let ventilation = section_module(engine, sections::VENTILATION)?;
    for (i, area) in [800.0, 1200.0, 2500.0].into_iter().enumerate() {
        gains.set("floorArea", Value::Number(area), Provenance::User)?;
        ventilation.set("airChanges", Value::Number(1.0 + i as f64), Provenance::User)?;
        step(&format!("floorArea = {area}, airChanges = {}", 1.0 + i as f64));
    }

    section("Phase 2: An explicit Reference edit");
    gains.set_in(
        Universe::Reference,
        "lightingDensity",
        Value::Number(9.0),
        Provenance::User,
    )?;
    step("gains: ref lightingDensity = 9 (Target stays visible)");
    compare(engine, "lightingDensity");

    let after = engine.store().universe_view(Universe::Reference);
    let changed: Vec<&String> = after
        .iter()
        .filter(|(field, stored)| before.get(*field) != Some(*stored))
        .map(|(field, _)| field)
        .collect();
    step(&format!("Reference values changed: {changed:?}"));

    let expected = ["lightingDensity", "lightingGains", "totalInternalGains"];
    check_result(
        changed.iter().all(|f| expected.contains(&f.as_str())),
        "REFERENCE ISOLATED — only the explicit edit and its dependents moved",
        "LEAK DETECTED — a Target edit changed a Reference value",
    );
    Ok(())
}

// ─── Modes ─────────────────────────────────────────────────────────────────

fn run_modes(engine: &Engine) -> anyhow::Result<()> {
    header("MODES — Switching The Visible Universe");

    let occupancy = section_module(engine, sections::OCCUPANCY)?;
    occupancy.set("dailyHours", Value::Number(10.0), Provenance::User)?;
    let snapshot = engine.store().snapshot();

    for universe in [Universe::Reference, Universe::Target] {
        section(&format!("Switch to {}", universe_label(universe)));
        let switched = engine.switch_all(universe);
        step(&format!("{switched} sections switched"));
        show_view(&occupancy.render());
    }

    check_result(
        engine.store().snapshot() == snapshot,
        "PURE SWITCH — no stored value changed",
        "SWITCH WROTE VALUES — store differs after round trip",
    );
    Ok(())
}

// ─── Persist ───────────────────────────────────────────────────────────────

fn run_persist(cli: &Cli) -> anyhow::Result<()> {
    header("PERSIST — Edits Survive A Restart");

    let dir = cli.state_dir.clone().unwrap_or_else(|| {
        std::env::temp_dir().join(format!("twinstate-calc-{}", std::process::id()))
    });
    let open = || -> anyhow::Result<Engine> {
        let config = EngineConfigBuilder::new()
            .reference_prefix(cli.prefix.clone())
            .build();
        let slots = FileSlotStore::new(&dir)?;
        let engine = Engine::with_persistence(config, PersistenceAdapter::new(slots));
        sections::register_all(&engine)?;
        Ok(engine)
    };

    section("Phase 1: First session");
    {
        let engine = open()?;
        let ventilation = section_module(&engine, sections::VENTILATION)?;
        ventilation.set("heatRecovery", Value::choice("Plate"), Provenance::User)?;
        ventilation.set_in(
            Universe::Reference,
            "airChanges",
            Value::Number(1.2),
            Provenance::User,
        )?;
        step("ventilation: heatRecovery = Plate, ref airChanges = 1.2");
        for slot in engine.persistence().slots()? {
            step(&format!("saved slot {}", slot.to_string().bright_white()));
        }
    }

    section("Phase 2: Second session restores");
    let engine = open()?;
    let ventilation = section_module(&engine, sections::VENTILATION)?;
    compare(&engine, "heatRecovery");
    compare(&engine, "airChanges");
    compare(&engine, "ventilationLoss");
    let ok = ventilation.get("heatRecovery") == Some(Value::choice("Plate"))
        && ventilation.get_in(Universe::Reference, "airChanges") == Some(Value::Number(1.2));
    check_result(ok, "RESTORED — both universes came back", "RESTORE FAILED");

    section("Phase 3: Reset discards persisted state");
    engine.reset_all()?;
    step(&format!(
        "{} slots left after reset",
        engine.persistence().slots()?.len()
    ));
    if cli.state_dir.is_none() {
        std::fs::remove_dir_all(&dir).ok();
    }
    Ok(())
}

// ─── Interactive ───────────────────────────────────────────────────────────

fn run_interactive(engine: &Engine) -> anyhow::Result<()> {
    header("INTERACTIVE — TwinState REPL");
    println!("  Type 'help' for commands.\n");

    loop {
        print!("{}", "twinstate> ".bright_cyan().bold());
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() || input.is_empty() {
            break;
        }
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        if let Err(error) = interactive_command(engine, &parts) {
            println!("  {} {}", "!".bright_red(), error);
        }
        if matches!(parts[0], "quit" | "exit" | "q") {
            println!("  {}", "Goodbye!".dimmed());
            break;
        }
    }
    Ok(())
}

fn interactive_command(engine: &Engine, parts: &[&str]) -> anyhow::Result<()> {
    match parts[0] {
        "set" => {
            let [_, name, value] = parts else {
                bail!("Usage: set <field|ref_field> <value>");
            };
            let outcome = engine.import_namespaced(name, Value::text(*value), Provenance::User)?;
            step(&format!("{name} = {value} ({outcome:?})"));
        }
        "get" => {
            let [_, name] = parts else {
                bail!("Usage: get <field|ref_field>");
            };
            match engine.get_namespaced(name) {
                Some(value) => step(&format!("{name} = {}", format_value(&value))),
                None => println!("  {} '{}' is not published", "?".bright_yellow(), name),
            }
        }
        "compare" | "c" => {
            let [_, field] = parts else {
                bail!("Usage: compare <field>");
            };
            compare(engine, field);
        }
        "show" | "s" => {
            let [_, id] = parts else {
                bail!("Usage: show <section>");
            };
            show_view(&section_module(engine, id)?.render());
        }
        "mode" => {
            let universe = match parts.get(1).copied() {
                Some("target") | Some("t") => Universe::Target,
                Some("reference") | Some("ref") | Some("r") => Universe::Reference,
                _ => bail!("Usage: mode <target|reference>"),
            };
            let switched = engine.switch_all(universe);
            step(&format!("{} sections now show {}", switched, universe_label(universe)));
        }
        "recalc" => {
            let reports = engine.calculate_everything();
            let failed: usize = reports.iter().map(|r| r.failed_passes()).sum();
            step(&format!("{} sections recalculated, {} failed passes", reports.len(), failed));
        }
        "reset" => {
            engine.reset_all()?;
            step("All sections reset to defaults");
        }
        "list" | "ls" => {
            for id in engine.module_ids() {
                step(&id);
            }
        }
        "export" => {
            for (name, value) in engine.export_namespace() {
                println!("    {:<28} {}", name, value);
            }
        }
        "stats" => {
            let stats = engine.stats();
            step(&format!(
                "store: {} target, {} reference, {} writes, {} notifications",
                stats.store.target_keys,
                stats.store.reference_keys,
                stats.store.writes,
                stats.store.notifications
            ));
            step(&format!(
                "graph: {} fields, {} edges, depth {}",
                stats.graph.total_fields, stats.graph.total_edges, stats.graph.max_depth
            ));
            for (id, module) in &stats.modules {
                step(&format!(
                    "{id}: {} calculations, {} short-circuits, {} reruns, {} failed passes, {} saves",
                    module.calculations,
                    module.short_circuits,
                    module.reruns,
                    module.failed_passes,
                    module.saves
                ));
            }
        }
        "quit" | "exit" | "q" => {}
        "help" | "h" | "?" => {
            println!("  set <name> <value> | get <name> | compare <field> | show <section>");
            println!("  mode <target|reference> | recalc | reset | list | export | stats | quit");
        }
        other => {
            println!(
                "  {} Unknown command '{}' — type 'help'",
                "?".bright_yellow(),
                other
            );
        }
    }
    Ok(())
}

// ─── Entry point ───────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    match cli.command {
        Commands::Demo => run_demo(&build_engine(&cli)?),
        Commands::Isolation => run_isolation(&build_engine(&cli)?),
        Commands::Modes => run_modes(&build_engine(&cli)?),
        Commands::Persist => run_persist(&cli),
        Commands::Interactive => run_interactive(&build_engine(&cli)?),
    }
}
