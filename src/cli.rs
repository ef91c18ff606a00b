//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// qlfleet - run a CodeQL query pack across many repositories
///
/// Reads a session manifest, sorts its repositories into analyzable and
/// rejected, runs the query pack against every analyzable repository's
/// database on a pool of workers and writes a session report.
///
/// Examples:
///   qlfleet --session session.toml
///   qlfleet --session session.toml --workers 8 --queue-capacity 16
///   qlfleet --session session.toml --format json --output report.json
///   qlfleet --session session.toml --dry-run
///   qlfleet --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Session manifest (TOML) listing the query pack and repositories
    #[arg(short, long, value_name = "FILE", required_unless_present = "init_config")]
    pub session: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .qlfleet.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of concurrent workers
    #[arg(short, long, value_name = "NUM")]
    pub workers: Option<usize>,

    /// Jobs buffered between the commander and the workers
    #[arg(long, value_name = "NUM")]
    pub queue_capacity: Option<usize>,

    /// Fail a submission instead of waiting when the queue is full
    #[arg(long)]
    pub fail_fast: bool,

    /// Path to the codeql executable
    #[arg(long, value_name = "PATH", env = "CODEQL_CLI_PATH")]
    pub codeql_path: Option<PathBuf>,

    /// Base URL recorded as the repository location in SARIF output
    #[arg(long, value_name = "URL", env = "GITHUB_SERVER_URL")]
    pub server_url: Option<String>,

    /// Deployment mode (only standalone is available)
    #[arg(long, value_name = "MODE")]
    pub mode: Option<String>,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Dry run: classify the session's repositories without running queries
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .qlfleet.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if let Some(ref session) = self.session {
            if !session.is_file() {
                return Err(format!(
                    "Session manifest does not exist: {}",
                    session.display()
                ));
            }
        }

        if self.workers == Some(0) {
            return Err("Workers must be at least 1".to_string());
        }

        if self.queue_capacity == Some(0) {
            return Err("Queue capacity must be at least 1".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref url) = self.server_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Server URL must start with 'http://' or 'https://'".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
