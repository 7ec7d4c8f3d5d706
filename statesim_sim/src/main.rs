//! StateSim population simulator CLI
//!
//! Loads a directory of module graphs, simulates a population and prints the
//! transition metrics report.

use clap::Parser;
use statesim_core::time::{days, years};
use statesim_core::ModuleRegistry;
use statesim_sim::{
    FailurePolicy, JsonLinesSink, Lifecycle, PopulationConfig, PopulationSummary, Scheduler, SimError,
    UniformAgeDemographics,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// StateSim population simulator
#[derive(Parser, Debug)]
#[command(name = "statesim")]
#[command(about = "Simulate a population through declarative state machine modules", long_about = None)]
struct Args {
    /// Directory of module JSON files
    #[arg(short, long)]
    modules: PathBuf,

    /// Number of people to simulate
    #[arg(short, long, default_value = "100")]
    population: usize,

    /// Master seed for determinism
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Simulated years; also the oldest age at the stop time
    #[arg(short, long, default_value = "90")]
    years: i64,

    /// Days between ticks
    #[arg(long, default_value = "7")]
    timestep_days: i64,

    /// Worker threads
    #[arg(short, long, default_value = "8")]
    workers: usize,

    /// Regenerate people who die before the stop time
    #[arg(long)]
    only_alive: bool,

    /// Disable age-based natural mortality
    #[arg(long)]
    no_natural_death: bool,

    /// Attempts per person in only-alive mode
    #[arg(long, default_value = "10")]
    max_tries: usize,

    /// What to do when a person fails (abort, skip)
    #[arg(long, default_value = "abort")]
    on_error: FailurePolicy,

    /// Write one JSON record per person to this file
    #[arg(long)]
    export: Option<PathBuf>,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn run(args: &Args) -> Result<(), SimError> {
    let registry = Arc::new(ModuleRegistry::load_dir(&args.modules)?);

    let config = PopulationConfig::new(args.population, args.seed)
        .with_stop(years(args.years))
        .with_timestep(days(args.timestep_days))
        .with_workers(args.workers)
        .with_only_alive(args.only_alive)
        .with_max_tries(args.max_tries)
        .with_failure_policy(args.on_error);

    let demographics = UniformAgeDemographics::default().with_age_range(0, args.years);
    let lifecycle = if args.no_natural_death { Lifecycle::without_mortality() } else { Lifecycle::default() };
    let mut scheduler = Scheduler::new(config, Arc::clone(&registry))
        .with_demographics(Arc::new(demographics))
        .with_lifecycle(lifecycle);

    if let Some(path) = &args.export {
        info!("Exporting records to {}", path.display());
        scheduler = scheduler.with_sink(Arc::new(JsonLinesSink::create(path)?));
    }

    let summary = scheduler.run()?;
    let report = scheduler.metrics().report(&registry, summary.kept() as u64);

    if args.json {
        let output = serde_json::json!({
            "summary": summary,
            "metrics": report,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print!("{}", report);
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &PopulationSummary) {
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        "Kept {} people ({} alive, {} dead), discarded {}, in {:.2?}",
        summary.kept(),
        summary.alive,
        summary.dead,
        summary.discarded,
        summary.elapsed
    );
    if !summary.failed.is_empty() {
        error!("{} people failed: {:?}", summary.failed.len(), summary.failed);
    }
}

fn main() {
    let args = Args::parse();

    // Initialize logging; RUST_LOG overrides --verbose
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if !args.json {
        info!("StateSim v{}", env!("CARGO_PKG_VERSION"));
    }

    if let Err(e) = run(&args) {
        error!("{}", e);
        std::process::exit(1);
    }
}
