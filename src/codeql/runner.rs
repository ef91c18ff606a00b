//! Runs one query pack against one database package.
//!
//! Unpack, run, inspect every query's relational output, then either
//! interpret the whole pack as SARIF or count rows from the relational
//! files, and finally lay the files out for the archive.

use super::archive::{unzip_database, DATABASE_METADATA_FILE};
use super::cli::CodeqlCli;
use super::results::{adjust_bqrs_files, BqrsFilePaths, QueryPackRunResults, QueryRun};
use super::sarif::{repository_uri, stamp_sarif_file, SARIF_FILE_NAME};
use super::types::{DatabaseMetadata, QlPack};
use crate::error::AnalysisError;
use crate::models::OwnerRepo;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const QLPACK_FILE: &str = "qlpack.yml";

/// Outcome of a successful run, ready for packaging.
#[derive(Debug, Clone)]
pub struct RunQueryResult {
    pub result_count: usize,
    /// Empty when the database did not record one.
    pub database_sha: String,
    pub source_location_prefix: String,
    pub bqrs_file_paths: BqrsFilePaths,
    pub sarif_file_path: Option<PathBuf>,
}

/// Drives the query tool for single jobs.
#[derive(Debug, Clone)]
pub struct QueryRunner {
    cli: CodeqlCli,
    ram_mb: u32,
    server_url: String,
}

impl QueryRunner {
    pub fn new(cli: CodeqlCli, ram_mb: u32, server_url: impl Into<String>) -> Self {
        Self {
            cli,
            ram_mb,
            server_url: server_url.into(),
        }
    }

    /// Run `query_pack` against the database in `database_zip`.
    ///
    /// Everything is written below `scratch`. Blocking file work stops
    /// early once `cancel` fires.
    pub async fn run_query(
        &self,
        database_zip: &Path,
        repository: &OwnerRepo,
        query_pack: &Path,
        scratch: &Arc<TempDir>,
        cancel: &CancellationToken,
    ) -> Result<RunQueryResult, AnalysisError> {
        let results_dir = scratch.path().join("results");
        tokio::fs::create_dir_all(&results_dir).await.map_err(|e| {
            AnalysisError::Extraction(format!("create {}: {}", results_dir.display(), e))
        })?;

        let query_pack = tokio::fs::canonicalize(query_pack).await.map_err(|e| {
            AnalysisError::Metadata(format!("query pack {}: {}", query_pack.display(), e))
        })?;

        let database = {
            let package = database_zip.to_path_buf();
            let dest = scratch.path().join("db");
            let cancel = cancel.clone();
            in_scratch(scratch, AnalysisError::Extraction, move || {
                unzip_database(&package, &dest, &cancel)
            })
            .await?
        };

        let metadata = read_database_metadata(&database).await?;
        let database_sha = match metadata.revision() {
            Some(sha) => sha,
            None => {
                warn!(
                    repository = %repository,
                    "No revision recorded in {}; provenance will carry an empty revision",
                    DATABASE_METADATA_FILE
                );
                String::new()
            }
        };
        debug!(
            language = ?metadata.primary_language,
            cli_version = ?metadata.creation_metadata.as_ref().and_then(|c| c.cli_version.as_deref()),
            "Unpacked database for {}",
            repository
        );

        self.cli
            .run_queries(self.ram_mb, &database, &query_pack)
            .await?;

        let run_results = self.collect_query_runs(&database, &query_pack).await?;
        let source_location_prefix = self.cli.resolve_database(&database).await?;

        let (result_count, sarif_file_path) = if run_results.supports_sarif() {
            let sarif_path = results_dir.join(SARIF_FILE_NAME);
            self.cli
                .interpret_results(&database, &query_pack, &sarif_path)
                .await?;

            let count = {
                let path = sarif_path.clone();
                let uri = repository_uri(&self.server_url, repository);
                let revision = database_sha.clone();
                in_scratch(scratch, AnalysisError::Packaging, move || {
                    stamp_sarif_file(&path, &uri, &revision)
                })
                .await?
            };
            (count, Some(sarif_path))
        } else {
            debug!("Pack is not SARIF compatible, counting relational results");
            (run_results.total_results_count()?, None)
        };

        let bqrs_file_paths = {
            let results_dir = results_dir.clone();
            in_scratch(scratch, AnalysisError::Packaging, move || {
                adjust_bqrs_files(&run_results, &results_dir)
            })
            .await?
        };

        info!(
            repository = %repository,
            result_count,
            sarif = sarif_file_path.is_some(),
            "Query run finished"
        );

        Ok(RunQueryResult {
            result_count,
            database_sha,
            source_location_prefix,
            bqrs_file_paths,
            sarif_file_path,
        })
    }

    /// Locate and describe every query's relational output.
    async fn collect_query_runs(
        &self,
        database: &Path,
        query_pack: &Path,
    ) -> Result<QueryPackRunResults, AnalysisError> {
        let pack_name = read_qlpack_name(query_pack).await?;
        let results_base_path = database.join("results");

        let query_paths = self.cli.resolve_queries(query_pack).await?;
        if query_paths.is_empty() {
            return Err(AnalysisError::Metadata(format!(
                "query pack {} resolves to no queries",
                query_pack.display()
            )));
        }

        let mut queries = Vec::with_capacity(query_paths.len());
        for query_path in query_paths {
            let relative_query = relative_query_path(query_pack, &query_path).await?;
            let relative_bqrs_path = Path::new(&pack_name).join(relative_query.with_extension("bqrs"));
            let bqrs_path = results_base_path.join(&relative_bqrs_path);

            if !tokio::fs::try_exists(&bqrs_path).await.unwrap_or(false) {
                return Err(AnalysisError::Metadata(format!(
                    "expected relational result {} for query {} is missing",
                    bqrs_path.display(),
                    query_path.display()
                )));
            }

            let bqrs_info = self.cli.bqrs_info(&bqrs_path).await?;
            let metadata = self.cli.resolve_metadata(&query_path).await?;
            debug!(
                query = %query_path.display(),
                id = ?metadata.id,
                kind = ?metadata.kind,
                tags = ?metadata.tags(),
                "Inspected query output"
            );

            queries.push(QueryRun {
                query_path,
                metadata,
                relative_bqrs_path,
                bqrs_info,
            });
        }

        Ok(QueryPackRunResults::new(queries, results_base_path))
    }
}

/// Run blocking file work for a job on the blocking pool.
///
/// The closure holds its own handle on `scratch`, so an aborted job cannot
/// remove the directory while the work is still writing into it. `failed`
/// tags a task that panicked.
pub(super) async fn in_scratch<T, F>(
    scratch: &Arc<TempDir>,
    failed: fn(String) -> AnalysisError,
    work: F,
) -> Result<T, AnalysisError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, AnalysisError> + Send + 'static,
{
    let scratch = Arc::clone(scratch);
    tokio::task::spawn_blocking(move || {
        let result = work();
        drop(scratch);
        result
    })
    .await
    .map_err(|e| failed(format!("blocking task failed: {}", e)))?
}

async fn read_database_metadata(database: &Path) -> Result<DatabaseMetadata, AnalysisError> {
    let path = database.join(DATABASE_METADATA_FILE);
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| AnalysisError::Metadata(format!("read {}: {}", path.display(), e)))?;
    serde_yaml::from_str(&content)
        .map_err(|e| AnalysisError::Metadata(format!("parse {}: {}", path.display(), e)))
}

async fn read_qlpack_name(query_pack: &Path) -> Result<String, AnalysisError> {
    let path = query_pack.join(QLPACK_FILE);
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| AnalysisError::Metadata(format!("read {}: {}", path.display(), e)))?;
    let pack: QlPack = serde_yaml::from_str(&content)
        .map_err(|e| AnalysisError::Metadata(format!("parse {}: {}", path.display(), e)))?;
    Ok(pack.name)
}

/// Query path relative to the pack root. The tool may report canonical
/// paths, so fall back to canonicalizing the query before giving up.
async fn relative_query_path(query_pack: &Path, query: &Path) -> Result<PathBuf, AnalysisError> {
    if let Ok(relative) = query.strip_prefix(query_pack) {
        return Ok(relative.to_path_buf());
    }
    let canonical = tokio::fs::canonicalize(query).await.map_err(|e| {
        AnalysisError::Metadata(format!("resolve query {}: {}", query.display(), e))
    })?;
    canonical
        .strip_prefix(query_pack)
        .map(Path::to_path_buf)
        .map_err(|_| {
            AnalysisError::Metadata(format!(
                "query {} lies outside pack {}",
                query.display(),
                query_pack.display()
            ))
        })
}
