// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! tidyfs: AI-planned directory reorganizer
//!
//! Asks a planning service how to reorganize a directory, shows the
//! proposals, and applies the chosen one without overwriting anything.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

use tidyfs::config::AppConfig;
use tidyfs::engine::{DriftPolicy, Engine, StrategySelection};
use tidyfs::executor::CancelSignal;
use tidyfs::history::{History, UndoOutcome};
use tidyfs::planner::{LlmPlanner, Planner, PlannerSettings, StaticPlanner};
use tidyfs::render;
use tidyfs::report::Report;
use tidyfs::snapshot::ScanDepth;

/// tidyfs CLI - AI-planned directory reorganizer
#[derive(Parser, Debug)]
#[command(name = "tidyfs")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Reorganize a directory with an AI-proposed plan, safely", long_about = None)]
#[command(propagate_version = true)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Directory to organize (shorthand for `tidyfs organize <ROOT>`)
    root: Option<PathBuf>,

    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "tidyfs.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Output format for results
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json", "jsonl"])]
    format: String,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Plan and apply a reorganization of a directory
    Organize(OrganizeArgs),

    /// History and undo operations
    History {
        #[command(subcommand)]
        action: HistoryCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show planning service status
    Status,
}

#[derive(Args, Debug, Default)]
struct OrganizeArgs {
    /// Directory to organize
    root: PathBuf,

    /// Strategy to apply: 1-based number or name (skips the prompt)
    #[arg(short, long)]
    strategy: Option<String>,

    /// Do not ask for confirmation; applies the first strategy unless
    /// --strategy is given
    #[arg(short, long)]
    yes: bool,

    /// Dry run mode (validate and report without moving anything)
    #[arg(long)]
    dry_run: bool,

    /// Read the plan from a JSON file instead of asking the planning service
    #[arg(long)]
    plan_file: Option<PathBuf>,

    /// Scan depth (overrides config)
    #[arg(long, value_enum)]
    depth: Option<DepthArg>,

    /// What to do if the directory changed since planning (overrides config)
    #[arg(long, value_enum)]
    on_drift: Option<DriftArg>,

    /// Planner model (overrides config)
    #[arg(long)]
    model: Option<String>,

    /// Also write the full report as JSON to this file
    #[arg(long)]
    report_file: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DepthArg {
    Immediate,
    Recursive,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DriftArg {
    Report,
    Abort,
    Replan,
}

#[derive(Subcommand, Debug)]
enum HistoryCommands {
    /// List recent history entries
    List {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,
    },

    /// Undo recent moves
    Undo {
        /// Number of moves to undo
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        /// Dry run (show what would be undone)
        #[arg(long)]
        dry_run: bool,
    },

    /// Clear all history
    Clear {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "tidyfs.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Planner credentials may live in a .env file
    dotenv::dotenv().ok();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {:?}", cli.config))?;

    match cli.command {
        Some(Commands::Organize(args)) => run_organize(config, args, &cli.format).await,
        Some(Commands::History { action }) => run_history_command(&config, action),
        Some(Commands::Config { action }) => run_config_command(&config, action, &cli.config),
        Some(Commands::Status) => run_status(&config).await,
        None => match cli.root {
            Some(root) => {
                let args = OrganizeArgs {
                    root,
                    ..Default::default()
                };
                run_organize(config, args, &cli.format).await
            }
            None => bail!("No directory given. Try: tidyfs <ROOT> or tidyfs --help"),
        },
    }
}

/// Plan, choose, apply and report
async fn run_organize(
    mut config: AppConfig,
    args: OrganizeArgs,
    format: &str,
) -> anyhow::Result<()> {
    if let Some(depth) = args.depth {
        config.scan.depth = match depth {
            DepthArg::Immediate => ScanDepth::Immediate,
            DepthArg::Recursive => ScanDepth::Recursive,
        };
    }
    if let Some(policy) = args.on_drift {
        config.policy.on_drift = match policy {
            DriftArg::Report => DriftPolicy::Report,
            DriftArg::Abort => DriftPolicy::Abort,
            DriftArg::Replan => DriftPolicy::Replan,
        };
    }
    if let Some(ref model) = args.model {
        config.planner.model = model.clone();
    }

    let text = format == "text";
    let planner = build_planner(&config, args.plan_file.as_deref())?;

    let mut options = config.engine_options();
    options.executor.dry_run = args.dry_run;
    if args.dry_run {
        warn!("DRY RUN MODE - nothing will be moved");
    }

    let engine = Engine::new(options, planner);

    info!("Starting organizer under path: {:?}", args.root);
    let round = engine
        .plan(&args.root)
        .await
        .with_context(|| format!("Failed to plan reorganization of {:?}", args.root))?;

    if text {
        println!("Current structure:");
        print!("{}", render::render_snapshot(&round.snapshot));
        println!("\nProposed strategies:");
        print!("{}", render::render_strategies(&round.snapshot, &round.strategies));
    }

    let selection = match (&args.strategy, args.yes || !text) {
        (Some(s), _) => StrategySelection::parse(s),
        (None, true) => StrategySelection::First,
        (None, false) => prompt_strategy(round.strategies.len())?,
    };

    if text && !args.yes {
        let chosen = match &selection {
            StrategySelection::Index(i) => round.strategies.get(*i),
            StrategySelection::Name(n) => round.strategies.iter().find(|p| &p.strategy == n),
            StrategySelection::First => round.strategies.first(),
        };
        if let Some(plan) = chosen {
            println!("\nResult of '{}':", plan.strategy);
            print!("{}", render::render_proposed(&round.snapshot, plan));
            if !prompt_confirm(&format!("Apply strategy '{}'?", plan.strategy), Some(false))? {
                println!("Aborted, nothing was changed.");
                return Ok(());
            }
        }
    }

    // Ctrl-C stops the run between moves, never during one
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, finishing the current move...");
            let _ = cancel_tx.send(true);
        }
    });

    let report = engine
        .apply(round, &selection, CancelSignal::new(cancel_rx))
        .await
        .context("Failed to apply reorganization")?;

    print_report(&report, format)?;

    if let Some(ref path) = args.report_file {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("Failed to write report to {:?}", path))?;
    }

    if config.history.enabled && !report.dry_run {
        let history = History::new(PathBuf::from(&config.history.path));
        match history.record_report(&report) {
            Ok(n) if n > 0 => info!("Recorded {} moves in {:?}", n, history.path()),
            Ok(_) => {}
            Err(e) => warn!("Failed to write history: {}", e),
        }
    }

    let summary = report.summary();
    if summary.failed > 0 {
        bail!("{} of {} operations failed", summary.failed, summary.total);
    }

    Ok(())
}

fn build_planner(config: &AppConfig, plan_file: Option<&Path>) -> anyhow::Result<Arc<dyn Planner>> {
    if let Some(path) = plan_file {
        info!("Using plan file {:?}", path);
        return Ok(Arc::new(StaticPlanner::from_file(path)?));
    }

    let settings = PlannerSettings::from_config(&config.planner)?;
    Ok(Arc::new(LlmPlanner::new(settings)?))
}

fn print_report(report: &Report, format: &str) -> anyhow::Result<()> {
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        "jsonl" => {
            for record in &report.records {
                println!("{}", serde_json::to_string(record)?);
            }
            let summary = serde_json::json!({
                "run_id": report.run_id,
                "summary": report.summary(),
                "drift": report.drift,
                "unplanned_arrivals": report.unplanned_arrivals,
            });
            println!("{}", serde_json::to_string(&summary)?);
        }
        _ => {
            println!();
            print!("{}", render::render_report(report));
        }
    }
    Ok(())
}

/// Ask for a strategy number until a valid one is given
fn prompt_strategy(count: usize) -> io::Result<StrategySelection> {
    let mut input = String::new();

    loop {
        input.clear();
        print!("Select a strategy [1-{}]: ", count);
        io::stdout().flush()?;

        if io::stdin().read_line(&mut input)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "no strategy selected"));
        }

        match input.trim().parse::<usize>() {
            Ok(n) if (1..=count).contains(&n) => return Ok(StrategySelection::Index(n - 1)),
            _ => println!("Enter a number between 1 and {}.", count),
        }
    }
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(default.unwrap_or(false));
        }

        match input.trim().to_uppercase().as_str() {
            "Y" | "YES" => return Ok(true),
            "N" | "NO" => return Ok(false),
            "" => {
                if let Some(default) = default {
                    return Ok(default);
                }
            }
            _ => {}
        }
    }
}

/// Run history commands
fn run_history_command(config: &AppConfig, action: HistoryCommands) -> anyhow::Result<()> {
    let history = History::new(PathBuf::from(&config.history.path));

    match action {
        HistoryCommands::List { count } => {
            let entries = history.get_recent(count)?;
            println!("Recent history ({} entries):", entries.len());
            for entry in entries {
                let status = if entry.undone { "[UNDONE]" } else { "" };
                println!(
                    "  {} {}: {} -> {} {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M"),
                    entry.root.display(),
                    entry.source,
                    entry.destination,
                    status
                );
            }
        }
        HistoryCommands::Undo { count, dry_run } => {
            let outcomes = history.undo(count, dry_run)?;
            if outcomes.is_empty() {
                println!("No moves to undo");
                return Ok(());
            }

            let mut failed = 0;
            for (entry, outcome) in outcomes {
                match outcome {
                    UndoOutcome::WouldRestore => {
                        println!("Would undo: {} -> {}", entry.destination, entry.source)
                    }
                    UndoOutcome::Restored => {
                        println!("Undone: {} -> {}", entry.destination, entry.source)
                    }
                    UndoOutcome::Failed(reason) => {
                        failed += 1;
                        warn!(
                            "Could not undo {} -> {}: {}",
                            entry.destination, entry.source, reason
                        );
                    }
                }
            }
            if failed > 0 {
                bail!("{} move(s) could not be undone", failed);
            }
        }
        HistoryCommands::Clear { force } => {
            if !force {
                eprintln!("Use --force to confirm clearing history");
                return Ok(());
            }
            history.clear()?;
            println!("History cleared");
        }
    }

    Ok(())
}

/// Run config commands
fn run_config_command(
    config: &AppConfig,
    action: ConfigCommands,
    config_path: &Path,
) -> anyhow::Result<()> {
    match action {
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(config)?;
            println!("{}", json);
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            config.validate()?;
            println!("Configuration at {:?} is valid", config_path);
            println!("  Planner: {} ({})", config.planner.model, config.planner.url);
            println!("  Scan depth: {:?}", config.scan.depth);
            println!("  On drift: {:?}", config.policy.on_drift);
        }
    }

    Ok(())
}

/// Run status check
async fn run_status(config: &AppConfig) -> anyhow::Result<()> {
    println!("tidyfs v{} Status", env!("CARGO_PKG_VERSION"));
    println!("==================");
    println!("Planner endpoint: {}", config.planner.url);
    println!("Model: {}", config.planner.model);

    let settings = match PlannerSettings::from_config(&config.planner) {
        Ok(s) => {
            println!("Credential: {} is set", config.planner.api_key_env);
            s
        }
        Err(e) => {
            println!("Credential: Error - {}", e);
            return Ok(());
        }
    };

    let planner = LlmPlanner::new(settings)?;
    match planner.health_check().await {
        Ok(()) => println!("Planning service: Reachable"),
        Err(e) => println!("Planning service: Error - {}", e),
    }

    Ok(())
}
