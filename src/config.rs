//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.qlfleet.toml` files.

use crate::error::ConfigError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".qlfleet.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Job queue settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Worker pool settings.
    #[serde(default)]
    pub workers: WorkerConfig,

    /// Query engine settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Storage locations.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Server identity settings.
    #[serde(default)]
    pub server: ServerConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Deployment mode. Only `standalone` is backed in this build.
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Default report path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            output: default_output(),
            verbose: false,
        }
    }
}

fn default_mode() -> String {
    "standalone".to_string()
}

fn default_output() -> String {
    "qlfleet_report.md".to_string()
}

/// What `enqueue` does when the queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmitPolicy {
    /// Wait for a free slot.
    #[default]
    Block,
    /// Report `QueueError::Full` immediately.
    FailFast,
}

/// Job queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of jobs (and results) buffered in each direction.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Behaviour of submissions against a full queue.
    #[serde(default)]
    pub submit_policy: SubmitPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            submit_policy: SubmitPolicy::default(),
        }
    }
}

fn default_capacity() -> usize {
    2
}

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent workers.
    #[serde(default = "default_worker_count")]
    pub count: usize,

    /// How long a shutdown waits for workers before cancelling them.
    #[serde(default = "default_grace_period")]
    pub grace_period_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            grace_period_seconds: default_grace_period(),
        }
    }
}

fn default_worker_count() -> usize {
    2
}

fn default_grace_period() -> u64 {
    30
}

/// Query engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to the `codeql` executable. Falls back to `CODEQL_CLI_PATH`.
    #[serde(default)]
    pub codeql_path: Option<PathBuf>,

    /// Memory budget handed to `run-queries`, in MB.
    #[serde(default = "default_ram")]
    pub ram_mb: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            codeql_path: None,
            ram_mb: default_ram(),
        }
    }
}

fn default_ram() -> u32 {
    2048
}

impl EngineConfig {
    /// Resolve the engine location, failing if it is unset or missing.
    pub fn resolve_codeql_path(&self) -> std::result::Result<PathBuf, ConfigError> {
        let path = self
            .codeql_path
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(ConfigError::EngineLocationUnset)?;

        if !path.is_file() {
            return Err(ConfigError::EngineNotFound(path.display().to_string()));
        }

        Ok(path)
    }
}

/// Storage locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root of `<owner>/<name>.zip` database packages.
    #[serde(default = "default_databases_dir")]
    pub databases_dir: PathBuf,

    /// Root of unpacked query packs.
    #[serde(default = "default_query_packs_dir")]
    pub query_packs_dir: PathBuf,

    /// Where finished result archives are stored.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    /// First session id handed out.
    #[serde(default = "default_starting_id")]
    pub starting_session_id: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            databases_dir: default_databases_dir(),
            query_packs_dir: default_query_packs_dir(),
            results_dir: default_results_dir(),
            starting_session_id: default_starting_id(),
        }
    }
}

fn default_databases_dir() -> PathBuf {
    PathBuf::from("databases")
}

fn default_query_packs_dir() -> PathBuf {
    PathBuf::from("query-packs")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_starting_id() -> u32 {
    1
}

/// Server identity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL stamped into SARIF provenance (`<url>/<owner>/<name>`).
    #[serde(default = "default_server_url")]
    pub url: String,

    /// Repositories beyond this many in one session are rejected.
    #[serde(default = "default_max_repositories")]
    pub max_repositories: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            max_repositories: default_max_repositories(),
        }
    }
}

fn default_server_url() -> String {
    "https://github.com".to_string()
}

fn default_max_repositories() -> usize {
    1000
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were actually given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(workers) = args.workers {
            self.workers.count = workers;
        }
        if let Some(capacity) = args.queue_capacity {
            self.queue.capacity = capacity;
        }
        if args.fail_fast {
            self.queue.submit_policy = SubmitPolicy::FailFast;
        }
        if let Some(ref path) = args.codeql_path {
            self.engine.codeql_path = Some(path.clone());
        }
        if let Some(ref url) = args.server_url {
            self.server.url = url.clone();
        }
        if let Some(ref mode) = args.mode {
            self.general.mode = mode.clone();
        }
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.general.mode != "standalone" {
            return Err(ConfigError::UnsupportedMode(self.general.mode.clone()));
        }
        if self.queue.capacity == 0 {
            return Err(ConfigError::Invalid("queue.capacity must be at least 1".into()));
        }
        if self.workers.count == 0 {
            return Err(ConfigError::Invalid("workers.count must be at least 1".into()));
        }
        if self.engine.ram_mb == 0 {
            return Err(ConfigError::Invalid("engine.ram_mb must be positive".into()));
        }
        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
