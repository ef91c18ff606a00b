//! qlfleet - fan a CodeQL query pack out across many repositories
//!
//! A commander sorts a session's repositories by eligibility, queues one
//! analysis job per eligible repository and a pool of workers runs the
//! query pack against each repository's prebuilt database.
//!
//! Exit codes:
//!   0 - Every analyzed repository succeeded
//!   1 - Runtime or configuration error
//!   2 - At least one repository's analysis ended in an error

mod cli;
mod codeql;
mod commander;
mod config;
mod error;
mod models;
mod queue;
mod report;
mod storage;
mod worker;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use codeql::{CodeqlAnalyzer, CodeqlCli, QueryRunner};
use commander::{InMemoryStatusStore, LocalEligibility, Session, SessionManager, SessionManifest};
use config::{Config, DEFAULT_CONFIG_FILE};
use indicatif::{ProgressBar, ProgressStyle};
use queue::{InMemoryQueue, JobQueue};
use report::SessionReport;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use storage::{LocalArchiveStore, LocalQueryPackStore};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use worker::WorkerPool;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("qlfleet v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run_session(args).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Session failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .qlfleet.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", DEFAULT_CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to set the engine path, storage directories and pool size.");
    Ok(())
}

/// Initialize logging. `RUST_LOG` wins over the verbosity flags.
fn init_logging(args: &Args) {
    let installed = if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .compact()
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(args.log_level())
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    };

    if let Err(e) = installed {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run one session end to end. Returns the exit code (0 or 2).
async fn run_session(args: Args) -> Result<i32> {
    let start_time = Instant::now();
    let started_at = Utc::now();

    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate()?;

    let session_path = args
        .session
        .clone()
        .context("A session manifest is required (--session)")?;
    let manifest = SessionManifest::load(&session_path)?;

    // The engine must be usable before any job is created.
    let codeql_path = if args.dry_run {
        None
    } else {
        Some(config.engine.resolve_codeql_path()?)
    };

    let queue: Arc<dyn JobQueue> = Arc::new(InMemoryQueue::new(
        config.queue.capacity,
        config.queue.submit_policy,
    ));
    let manager = SessionManager::new(
        Arc::clone(&queue),
        Arc::new(InMemoryStatusStore::new()),
        Arc::new(LocalEligibility::new(
            config.storage.databases_dir.clone(),
            config.server.max_repositories,
        )),
        config.storage.starting_session_id,
    );

    let session = manager.create_session(manifest).await?;
    print_session_overview(&session);

    let Some(codeql_path) = codeql_path else {
        return handle_dry_run(&session);
    };

    let cli = CodeqlCli::new(codeql_path);
    info!("Using engine at {}", cli.path().display());
    let analyzer = CodeqlAnalyzer::new(
        QueryRunner::new(cli, config.engine.ram_mb, config.server.url.clone()),
        Arc::new(LocalQueryPackStore::new(config.storage.query_packs_dir.clone())),
        Arc::new(LocalArchiveStore::new(config.storage.results_dir.clone())),
        std::env::temp_dir(),
    );

    println!(
        "\n🔬 Analyzing {} repositories with {} workers...",
        session.analysis_repos.len(),
        config.workers.count
    );

    let pool = WorkerPool::start(Arc::clone(&queue), Arc::new(analyzer), config.workers.count);
    let consumer = manager.spawn_consumer();
    let jobs = manager.plan_jobs(&session);

    let bar = progress_bar(jobs.len() as u64, args.quiet);
    let bar_task = {
        let bar = bar.clone();
        let mut progress = manager.progress();
        tokio::spawn(async move {
            while progress.changed().await.is_ok() {
                let done = *progress.borrow();
                bar.set_position(done as u64);
            }
        })
    };

    let interrupted = tokio::select! {
        _ = async {
            manager.submit(&jobs).await;
            manager.wait_for_completion(&session).await;
        } => false,
        _ = tokio::signal::ctrl_c() => true,
    };

    if interrupted {
        warn!("Interrupted, cancelling running jobs");
        pool.cancel();
        pool.join().await;
        manager.cancel_pending(&jobs).await;
        manager.wait_for_completion(&session).await;
    } else {
        let grace = Duration::from_secs(config.workers.grace_period_seconds);
        if !pool.shutdown(grace).await {
            warn!("Some workers had to be cancelled during shutdown");
        }
    }
    manager.finish(consumer).await;
    bar_task.abort();
    bar.finish_and_clear();

    let statuses = manager.status_store().session(session.id).await;
    let report = SessionReport::new(
        &session,
        statuses,
        started_at,
        start_time.elapsed().as_secs_f64(),
    );

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };
    let output_path = Path::new(&config.general.output);
    std::fs::write(output_path, &output)
        .with_context(|| format!("Failed to write report to {}", output_path.display()))?;

    println!("\n📊 Session Summary:");
    println!(
        "   Analyzed: {} | ✅ Succeeded: {} | ❌ Failed: {}",
        report.summary.analyzed, report.summary.succeeded, report.summary.failed
    );
    println!("   Total results: {}", report.summary.total_results);
    println!("   Duration: {:.1}s", report.metadata.duration_seconds);
    println!("\n✅ Report saved to: {}", output_path.display());

    if report.has_failures() {
        eprintln!("\n⛔ Some analyses failed (exit code 2).");
        return Ok(2);
    }
    Ok(0)
}

fn progress_bar(len: u64, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

fn print_session_overview(session: &Session) {
    println!("📋 Session {} ({} / {})", session.id, session.owner, session.query_pack);
    println!("   Requested: {}", session.repositories.len());
    println!("   Eligible: {}", session.analysis_repos.len());
    if session.rejected_count() > 0 {
        println!(
            "   Rejected: {} (access mismatch {}, not found {}, no database {}, over limit {})",
            session.rejected_count(),
            session.access_mismatch_repos.len(),
            session.not_found_repos.len(),
            session.no_database_repos.len(),
            session.over_limit_repos.len()
        );
    }
}

/// Handle --dry-run: show which repositories would be analyzed, exit.
fn handle_dry_run(session: &Session) -> Result<i32> {
    println!("\n🔍 Dry run: no queries will be run.\n");

    if session.analysis_repos.is_empty() {
        println!("   No repository is eligible for analysis.");
    } else {
        println!("   {} repositories would be analyzed:\n", session.analysis_repos.len());
        for (repo, database) in &session.analysis_repos {
            println!("     📦 {} ({})", repo, database);
        }
    }

    println!("\n✅ Dry run complete.");
    Ok(0)
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
