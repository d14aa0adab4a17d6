//! Logging setup using `tracing` and `tracing-subscriber`.
//!
//! Library crates only emit events; this binary decides where they go.
//!
//! # Log Levels
//!
//! - `warn`: failed passes, discarded persistence slots (default)
//! - `info`: module initialization and reset (`-v`)
//! - `debug`: recomputation passes, short-circuits, mode switches (`-vv`)
//! - `trace`: individual store writes (`-vvv`)

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Map a `-v` count to a level.
pub fn level_from_verbosity(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the verbosity flag.
pub fn init_logging(verbosity: u8) {
    let level = level_from_verbosity(verbosity).as_str().to_lowercase();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,twinstate_calc={level},tws_sdk={level},tws_store={level},\
             tws_persist={level},tws_graph={level}"
        ))
    });

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbosity > 1)
        .without_time();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init();
}
