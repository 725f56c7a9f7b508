// Copyright 2026 Roadwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Roadwatch command-line entry point.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tokio::sync::broadcast::error::RecvError;

use roadwatch::config::resolve_config_path;
use roadwatch::progress::{self, ProgressReceiver};
use roadwatch::renderer::chromium::{find_chromium, CHROMIUM_ENV};
use roadwatch::{orchestrator, AcquireConfig, AcquisitionReport, ArtifactStore, Orchestrator};

#[derive(Parser)]
#[command(
    name = "roadwatch",
    about = "Roadwatch — acquire the Hauts-de-Seine road-safety datasets",
    version,
    after_help = "Run 'roadwatch <command> --help' for details on each command.\nRun 'roadwatch' with no command to acquire every missing dataset."
)]
struct Cli {
    /// Path to a JSON config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Override the artifact directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override the number of concurrent workers
    #[arg(long, short, global = true)]
    workers: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Suppress progress output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, crawl, and reduce every dataset that is not on disk yet
    Acquire {
        /// Exit with status 1 when any dataset failed
        #[arg(long)]
        strict: bool,
    },
    /// Show which datasets are present and whether Chromium is available
    Status,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

fn init_logging(cli: &Cli) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(cli: &Cli) -> Result<AcquireConfig> {
    match resolve_config_path(cli.config.as_deref()) {
        Some(path) => tracing::info!("using config {}", path.display()),
        None => tracing::info!("no config file found, using defaults"),
    }
    let mut config = AcquireConfig::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    Ok(config)
}

/// Print progress events until the sending side goes away.
async fn print_progress(mut rx: ProgressReceiver) {
    loop {
        match rx.recv().await {
            Ok(event) => eprintln!("  [{}] {}", event.seq, event.event),
            Err(RecvError::Lagged(n)) => eprintln!("  ({n} progress events dropped)"),
            Err(RecvError::Closed) => break,
        }
    }
}

async fn run_acquire(cli: &Cli, strict: bool) -> Result<()> {
    let config = load_config(cli)?;
    let mut orchestrator = Orchestrator::from_config(&config)
        .with_context(|| format!("cannot open data dir {}", config.data_dir.display()))?;

    let printer = if cli.quiet || cli.json {
        None
    } else {
        let (tx, rx) = progress::channel();
        orchestrator = orchestrator.with_progress(tx);
        Some(tokio::spawn(print_progress(rx)))
    };

    let report = orchestrator.acquire_all(&config.datasets).await;

    // Dropping the orchestrator closes the progress channel.
    drop(orchestrator);
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    tracing::info!(
        fetched = report.fetched_count(),
        failed = report.failed().count(),
        total = report.entries.len(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "acquisition finished"
    );
    print_report(cli, &report)?;

    if strict && !report.all_satisfied() {
        bail!(
            "{} of {} dataset(s) failed",
            report.failed().count(),
            report.entries.len()
        );
    }
    Ok(())
}

fn print_report(cli: &Cli, report: &AcquisitionReport) -> Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Elapsed: {:.2}s", report.elapsed.as_secs_f64());
    for entry in &report.entries {
        println!(
            "  {:<32} {} ({}ms)",
            entry.id,
            entry.outcome,
            entry.elapsed.as_millis()
        );
    }
    Ok(())
}

fn run_status(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    // Status only looks; a missing data dir is reported, not created.
    let store = ArtifactStore::at(&config.data_dir);
    let status = orchestrator::status(&store, &config.datasets);
    let chromium = find_chromium(config.browser.executable.as_deref());

    if cli.json {
        let value = serde_json::json!({
            "data_dir": store.root(),
            "workers": config.effective_workers(),
            "chromium": chromium,
            "datasets": status,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Data dir: {}", store.root().display());
    println!("Workers:  {}", config.effective_workers());
    match &chromium {
        Some(path) => println!("Chromium: {}", path.display()),
        None => println!("Chromium: not found (set {CHROMIUM_ENV})"),
    }
    for entry in &status {
        if entry.satisfied {
            println!("  {:<32} present", entry.id);
        } else {
            let missing: Vec<String> = entry
                .missing
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            println!("  {:<32} missing {}", entry.id, missing.join(", "));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "roadwatch", &mut std::io::stdout());
        return Ok(());
    }

    init_logging(&cli);

    let result = match &cli.command {
        None => run_acquire(&cli, false).await,
        Some(Commands::Acquire { strict }) => run_acquire(&cli, *strict).await,
        Some(Commands::Status) => run_status(&cli),
        Some(Commands::Completions { .. }) => Ok(()),
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if cli.json {
            println!(
                "{}",
                serde_json::json!({
                    "error": true,
                    "message": format!("{e:#}"),
                })
            );
        } else if !cli.quiet {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}
