use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use ember_sim::{Scenario, DEFAULT_DURATION_S};

/// Ember heater controller simulator
///
/// Example:
///   ember-sim --scenario ember-sim/scenarios/parking.toml --duration 600
#[derive(Debug, Parser)]
#[command(name = "ember-sim", about = "Run the Ember controller against a simulated burner")]
struct Cli {
    /// Scenario file (TOML); without one the heater sits idle
    #[arg(short = 's', long = "scenario")]
    scenario: Option<PathBuf>,

    /// Simulated time in seconds, overriding the scenario's
    #[arg(short = 'd', long = "duration")]
    duration: Option<u32>,

    /// Log filter when RUST_LOG is unset
    #[arg(short = 'l', long = "log-level", default_value = "info")]
    log_level: String,
}

fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over the command line
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .init();

    if let Err(e) = run(&cli) {
        error!("{e:#}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let scenario = match &cli.scenario {
        Some(path) => {
            info!("Loading scenario from: {}", path.display());
            Scenario::load(path)?
        }
        None => Scenario::default(),
    };

    let duration = cli
        .duration
        .or(scenario.duration_s)
        .unwrap_or(DEFAULT_DURATION_S);

    let summary = ember_sim::run(&scenario, duration)?;

    println!("final status: {:?}", summary.status);
    for event in &summary.events {
        let error = event
            .error
            .map(|code| format!("  error {code:?}"))
            .unwrap_or_default();
        println!(
            "{:>8.1} s  {:?} -> {:?}  ({:?}){error}",
            event.at_s, event.from, event.to, event.cause
        );
    }
    for record in summary.errors.records() {
        println!(
            "logged {:?} x{} in {:?} (sensor {})",
            record.code, record.counter, record.status, record.sensor
        );
    }
    println!(
        "starts {}, strokes {}, peak heat exchanger {:.1} °C, persist failures {}",
        summary.persistent.start_counter,
        summary.strokes,
        summary.peak_exchanger_c,
        summary.persist_failures
    );

    Ok(())
}
