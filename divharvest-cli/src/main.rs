//! Divharvest CLI: collection runs, checkpoint management, config scaffolding.
//!
//! Commands:
//! - `collect`: list the universe, collect records, write the JSON report
//! - `checkpoint status`: report age and counts of a pending checkpoint
//! - `checkpoint clear`: discard a pending checkpoint
//! - `config init`: write a default `divharvest.toml`

mod logging;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;

use divharvest_core::pipeline::FallbackPolicy;
use divharvest_runner::{
    select_entities, write_records_csv, write_report, BatchOrchestrator, CheckpointStore,
    CollectionReport, HarvestConfig, RunOutcome, DEFAULT_CONFIG_FILE,
};

#[derive(Parser)]
#[command(
    name = "divharvest",
    about = "Resumable dividend data collection for listed equities"
)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect records for the listed universe and write a report.
    Collect {
        /// Path to a TOML config file. Defaults to ./divharvest.toml if present.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Report output path.
        #[arg(long, default_value = "report.json")]
        output: PathBuf,

        /// Also export records as CSV to this path.
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Checkpoint directory (overrides config).
        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,

        /// Entities processed per group (overrides config). 1 is sequential.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Keep only the first N listed entities.
        #[arg(long)]
        limit: Option<usize>,

        /// Suspend after N entities in this segment; rerun to resume.
        #[arg(long)]
        max_entities: Option<usize>,

        /// Restrict to these symbols (comma-separated).
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,

        /// Profile fallback: listing or blank.
        #[arg(long)]
        fallback: Option<String>,

        /// Ignore and discard any existing checkpoint.
        #[arg(long, default_value_t = false)]
        fresh: bool,
    },
    /// Checkpoint management commands.
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
    /// Config file commands.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// Report whether a checkpoint exists, its age and counts.
    Status {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,
    },
    /// Remove the checkpoint documents.
    Clear {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a config file with every default spelled out.
    Init {
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

struct CollectArgs {
    config: Option<PathBuf>,
    output: PathBuf,
    csv: Option<PathBuf>,
    checkpoint_dir: Option<PathBuf>,
    concurrency: Option<usize>,
    limit: Option<usize>,
    max_entities: Option<usize>,
    symbols: Vec<String>,
    fallback: Option<String>,
    fresh: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });

    match cli.command {
        Commands::Collect {
            config,
            output,
            csv,
            checkpoint_dir,
            concurrency,
            limit,
            max_entities,
            symbols,
            fallback,
            fresh,
        } => run_collect(CollectArgs {
            config,
            output,
            csv,
            checkpoint_dir,
            concurrency,
            limit,
            max_entities,
            symbols,
            fallback,
            fresh,
        }),
        Commands::Checkpoint { action } => match action {
            CheckpointAction::Status {
                config,
                checkpoint_dir,
            } => run_checkpoint_status(config.as_deref(), checkpoint_dir),
            CheckpointAction::Clear {
                config,
                checkpoint_dir,
            } => run_checkpoint_clear(config.as_deref(), checkpoint_dir),
        },
        Commands::Config { action } => match action {
            ConfigAction::Init { path, force } => run_config_init(&path, force),
        },
    }
}

/// Explicit path, else `./divharvest.toml` when present, else defaults.
fn load_config(path: Option<&Path>) -> Result<HarvestConfig> {
    match path {
        Some(p) => HarvestConfig::from_file(p).with_context(|| format!("loading {}", p.display())),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => HarvestConfig::from_file(DEFAULT_CONFIG_FILE)
            .with_context(|| format!("loading {DEFAULT_CONFIG_FILE}")),
        None => Ok(HarvestConfig::default()),
    }
}

fn parse_fallback(name: &str) -> Result<FallbackPolicy> {
    match name {
        "listing" => Ok(FallbackPolicy::Listing),
        "blank" => Ok(FallbackPolicy::Blank),
        _ => bail!("unknown fallback '{name}'. Valid: listing, blank"),
    }
}

fn run_collect(args: CollectArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(dir) = args.checkpoint_dir {
        config.checkpoint.dir = dir;
    }
    if let Some(n) = args.concurrency {
        config.concurrency = n;
    }
    if args.limit.is_some() {
        config.limit = args.limit;
    }
    if args.max_entities.is_some() {
        config.max_entities = args.max_entities;
    }
    if !args.symbols.is_empty() {
        config.symbols = args.symbols;
    }
    if let Some(name) = args.fallback.as_deref() {
        config.fallback = parse_fallback(name)?;
    }
    config.validate()?;

    let as_of = chrono::Local::now().date_naive();
    let orchestrator = BatchOrchestrator::from_config(&config, as_of)?.with_resume(!args.fresh);
    let entities = select_entities(orchestrator.list_entities()?, &config.symbols, config.limit);
    if entities.is_empty() {
        bail!("no entities to collect");
    }

    match orchestrator.run(&entities, config.concurrency)? {
        RunOutcome::Complete(report) => {
            write_report(&report, &args.output)?;
            if let Some(csv_path) = &args.csv {
                write_records_csv(&report.records, csv_path)?;
            }
            print_summary(&report);
            println!("Report saved to: {}", args.output.display());
        }
        RunOutcome::Suspended {
            processed,
            remaining,
        } => {
            println!(
                "Suspended after {processed} entities; {remaining} remaining. Rerun to resume from {}.",
                config.checkpoint.dir.display()
            );
        }
    }
    Ok(())
}

fn print_summary(report: &CollectionReport) {
    let m = &report.metadata;
    let s = &report.statistics;
    println!();
    println!("=== Collection Summary ===");
    println!("Entities:        {}", m.total_entities);
    println!("Recorded:        {}", m.recorded);
    println!("Skipped:         {}", m.skipped);
    println!("Failed:          {}", m.failed);
    println!("Segments:        {}", m.segments);
    println!("Elapsed:         {:.1}s", m.elapsed_secs);
    println!(
        "Requests:        {} ({:.1}% success, {} rate limited, {} blocked)",
        m.requests.total,
        m.request_success_rate * 100.0,
        m.requests.rate_limited,
        m.requests.blocked
    );
    if let Some(y) = s.average_yield {
        println!("Average yield:   {y:.2}%");
    }
    println!();
    println!("Yield distribution:");
    for b in &s.yield_buckets {
        println!("  {:>6}%  {}", b.label, b.count);
    }
    if !s.top_by_yield.is_empty() {
        println!();
        println!("Top by yield:");
        for e in s.top_by_yield.iter().take(10) {
            println!(
                "  {:>2}. {:<8} {:>6.2}%  {}",
                e.rank,
                e.symbol,
                e.value,
                e.name.as_deref().unwrap_or("")
            );
        }
    }
}

fn checkpoint_store(config_path: Option<&Path>, dir: Option<PathBuf>) -> Result<(CheckpointStore, PathBuf)> {
    let config = load_config(config_path)?;
    let dir = dir.unwrap_or(config.checkpoint.dir.clone());
    Ok((
        CheckpointStore::in_dir(&dir, config.checkpoint.staleness()),
        dir,
    ))
}

fn run_checkpoint_status(config_path: Option<&Path>, dir: Option<PathBuf>) -> Result<()> {
    let (store, dir) = checkpoint_store(config_path, dir)?;
    match store.status()? {
        None => println!("No checkpoint in {}", dir.display()),
        Some(status) => {
            println!("Checkpoint:  {}", dir.display());
            println!("Saved at:    {}", status.saved_at);
            println!(
                "Age:         {}h {}m{}",
                status.age.num_hours(),
                status.age.num_minutes() % 60,
                if status.stale { " (stale, will be ignored)" } else { "" }
            );
            println!("Processed:   {}", status.processed);
            println!("Recorded:    {}", status.recorded);
            println!("Segments:    {}", status.segments);
        }
    }
    Ok(())
}

fn run_checkpoint_clear(config_path: Option<&Path>, dir: Option<PathBuf>) -> Result<()> {
    let (store, dir) = checkpoint_store(config_path, dir)?;
    store.clear()?;
    println!("Checkpoint cleared: {}", dir.display());
    Ok(())
}

fn run_config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let toml_str = HarvestConfig::default().to_toml()?;
    std::fs::write(path, toml_str).with_context(|| format!("writing {}", path.display()))?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
