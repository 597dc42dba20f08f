#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that runs a Sankey flow headlessly and prints the arrival report.

mod config;
mod driver;
mod terminal;

use std::{io, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use sankey_flow_core::{Category, DistributionTable};
use sankey_flow_rendering::SceneStyle;
use sankey_flow_session::{query, Session};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{
    config::FlowFile,
    driver::{drive, RunSettings},
    terminal::{write_report, ReportFormat, TerminalAdapter},
};

/// Command-line arguments accepted by the `sankey-flow` binary.
#[derive(Debug, Parser)]
#[command(name = "sankey-flow")]
#[command(about = "Simulate particles flowing through a Sankey diagram and report arrivals")]
struct Args {
    /// Path to the TOML flow file.
    #[arg(long)]
    config: PathBuf,

    /// Comma separated categories to simulate; defaults to every declared category.
    #[arg(long, value_delimiter = ',')]
    categories: Vec<String>,

    /// Seed for the random source.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Simulated milliseconds per tick.
    #[arg(long, default_value_t = 16, value_parser = clap::value_parser!(u64).range(1..))]
    tick_ms: u64,

    /// Upper bound on ticks before the run is stopped.
    #[arg(long, default_value_t = 100_000)]
    max_ticks: u64,

    /// Override the population cap from the flow file.
    #[arg(long)]
    population_cap: Option<usize>,

    /// Override the number of particles spawned per tick.
    #[arg(long)]
    increment: Option<usize>,

    /// Log progress every N frames.
    #[arg(long, default_value_t = 60)]
    report_every: u64,

    /// Layout of the final report.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    format: ReportFormat,
}

/// Entry point for the Sankey flow command-line interface.
fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let file = FlowFile::load(&args.config)?;
    let table = file
        .table()
        .with_context(|| format!("invalid flow file {}", args.config.display()))?;
    let mut engine = file.engine();
    if let Some(cap) = args.population_cap {
        engine.population_cap = cap;
    }
    if let Some(increment) = args.increment {
        engine.spawn_increment = increment;
    }

    let categories = resolve_categories(&table, &args.categories)?;
    info!(
        config = %args.config.display(),
        seed = args.seed,
        population_cap = engine.population_cap,
        ?categories,
        "starting flow"
    );

    let mut session = Session::with_default_layout(table, engine, args.seed)
        .context("failed to configure the flow session")?;
    let settings = RunSettings {
        categories,
        tick: Duration::from_millis(args.tick_ms),
        max_ticks: args.max_ticks,
    };
    let mut adapter = TerminalAdapter::new(args.report_every);
    let outcome = drive(&mut session, &settings, &SceneStyle::default(), &mut adapter)?;
    info!(ticks = outcome.ticks, phase = ?outcome.phase, "flow finished");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_report(&mut out, &file, query::snapshot(&session), args.format)
}

/// Selected categories, or every declared one, checked for full distribution coverage.
fn resolve_categories(table: &DistributionTable, requested: &[String]) -> Result<Vec<Category>> {
    let categories: Vec<Category> = if requested.is_empty() {
        table.categories().to_vec()
    } else {
        requested
            .iter()
            .map(|label| Category::from(label.trim()))
            .collect()
    };
    table
        .ensure_coverage(&categories)
        .context("selected categories are not fully covered by the flow file")?;
    Ok(categories)
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}
