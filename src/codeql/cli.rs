//! Subprocess adapter for the `codeql` executable.
//!
//! Every call site returns a typed value or an `AnalysisError` tagged with
//! the command that failed. Children are killed when their future is
//! dropped, together with everything in their process group, so
//! cancelling a job also stops its query run.

use super::types::{BqrsInfo, QueryMetadata, ResolvedDatabase, ResolvedQueries};
use crate::error::AnalysisError;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, info};

/// Kills a child's process group unless disarmed once the child exited.
struct GroupGuard {
    #[cfg_attr(not(unix), allow(dead_code))]
    pgid: Option<u32>,
}

impl GroupGuard {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    fn disarm(mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            if let Err(e) = killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
                debug!(pgid, "Process group already gone: {}", e);
            }
        }
    }
}

/// Handle on one installed query tool.
#[derive(Debug, Clone)]
pub struct CodeqlCli {
    path: PathBuf,
}

fn arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl CodeqlCli {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn argv(&self, args: &[String]) -> Vec<String> {
        std::iter::once(arg(&self.path))
            .chain(args.iter().cloned())
            .collect()
    }

    /// Run to completion, failing on launch errors and non-zero exits.
    async fn exec(&self, args: Vec<String>) -> Result<Output, AnalysisError> {
        let argv = self.argv(&args);
        info!(command = ?argv, "Running command");

        let mut command = Command::new(&self.path);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // kill_on_drop only reaches the direct child; a group catches
        // whatever a wrapper script started.
        #[cfg(unix)]
        command.process_group(0);

        let child = command
            .spawn()
            .map_err(|e| AnalysisError::execution(&argv, format!("failed to launch: {}", e), b""))?;
        let group = GroupGuard::new(child.id());
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| AnalysisError::execution(&argv, format!("failed to wait: {}", e), b""))?;
        group.disarm();

        if !output.status.success() {
            let mut combined = output.stdout.clone();
            combined.extend_from_slice(&output.stderr);
            return Err(AnalysisError::execution(
                &argv,
                output.status.to_string(),
                &combined,
            ));
        }

        Ok(output)
    }

    /// Run and parse stdout as JSON.
    async fn exec_json<T: DeserializeOwned>(
        &self,
        args: Vec<String>,
        what: &str,
    ) -> Result<T, AnalysisError> {
        let output = self.exec(args).await?;
        serde_json::from_slice(&output.stdout)
            .map_err(|e| AnalysisError::Metadata(format!("unparseable {} output: {}", what, e)))
    }

    /// `database run-queries` against an unpacked database.
    pub async fn run_queries(
        &self,
        ram_mb: u32,
        database: &Path,
        query_pack: &Path,
    ) -> Result<(), AnalysisError> {
        self.exec(vec![
            "database".into(),
            "run-queries".into(),
            format!("--ram={}", ram_mb),
            "--additional-packs".into(),
            arg(query_pack),
            "--".into(),
            arg(database),
            arg(query_pack),
        ])
        .await
        .map(|_| ())
    }

    /// Every query file the pack would run.
    pub async fn resolve_queries(&self, query_pack: &Path) -> Result<Vec<PathBuf>, AnalysisError> {
        let resolved: ResolvedQueries = self
            .exec_json(
                vec![
                    "resolve".into(),
                    "queries".into(),
                    "--format=bylanguage".into(),
                    "--".into(),
                    arg(query_pack),
                ],
                "resolve queries",
            )
            .await?;

        let paths: Vec<PathBuf> = resolved.query_paths().into_iter().map(PathBuf::from).collect();
        debug!("Resolved {} queries in {}", paths.len(), query_pack.display());
        Ok(paths)
    }

    /// Result-set summary of one relational result file.
    pub async fn bqrs_info(&self, bqrs: &Path) -> Result<BqrsInfo, AnalysisError> {
        self.exec_json(
            vec![
                "bqrs".into(),
                "info".into(),
                "--format=json".into(),
                arg(bqrs),
            ],
            "bqrs info",
        )
        .await
    }

    /// Declared metadata (kind, tags) of one query.
    pub async fn resolve_metadata(&self, query: &Path) -> Result<QueryMetadata, AnalysisError> {
        self.exec_json(
            vec![
                "resolve".into(),
                "metadata".into(),
                "--format=json".into(),
                arg(query),
            ],
            "resolve metadata",
        )
        .await
    }

    /// Source location prefix recorded in the database.
    pub async fn resolve_database(&self, database: &Path) -> Result<String, AnalysisError> {
        let resolved: ResolvedDatabase = self
            .exec_json(
                vec!["resolve".into(), "database".into(), arg(database)],
                "resolve database",
            )
            .await?;
        Ok(resolved.source_location_prefix)
    }

    /// Write a SARIF document for the pack's results to `output`.
    pub async fn interpret_results(
        &self,
        database: &Path,
        query_pack: &Path,
        output: &Path,
    ) -> Result<(), AnalysisError> {
        self.exec(vec![
            "database".into(),
            "interpret-results".into(),
            "--format=sarif-latest".into(),
            format!("--output={}", arg(output)),
            "--sarif-add-snippets".into(),
            "--no-group-results".into(),
            arg(database),
            arg(query_pack),
        ])
        .await
        .map(|_| ())
    }
}
