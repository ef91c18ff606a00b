//! `Analyzer` backed by the query tool and the storage collaborators.

use super::archive::write_results_archive;
use super::runner::{in_scratch, QueryRunner};
use crate::error::AnalysisError;
use crate::models::AnalyzeJob;
use crate::storage::{ArchiveStore, QueryPackStore};
use crate::worker::{AnalysisOutcome, Analyzer};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const RESULTS_ARCHIVE_NAME: &str = "results.zip";

pub struct CodeqlAnalyzer {
    runner: QueryRunner,
    query_packs: Arc<dyn QueryPackStore>,
    archives: Arc<dyn ArchiveStore>,
    scratch_root: PathBuf,
}

impl CodeqlAnalyzer {
    pub fn new(
        runner: QueryRunner,
        query_packs: Arc<dyn QueryPackStore>,
        archives: Arc<dyn ArchiveStore>,
        scratch_root: PathBuf,
    ) -> Self {
        Self {
            runner,
            query_packs,
            archives,
            scratch_root,
        }
    }
}

#[async_trait]
impl Analyzer for CodeqlAnalyzer {
    async fn analyze(&self, job: &AnalyzeJob) -> Result<AnalysisOutcome, AnalysisError> {
        let query_pack = self.query_packs.resolve(&job.query_pack).await?;

        // Fires when this future is dropped, i.e. when the job is aborted,
        // so blocking file work stops instead of writing on.
        let cancel = CancellationToken::new();
        let _cancel_on_drop = cancel.clone().drop_guard();

        // Removed once the last handle is gone. Blocking tasks hold their
        // own handle.
        let scratch = Arc::new(
            tempfile::Builder::new()
                .prefix("qlfleet-job-")
                .tempdir_in(&self.scratch_root)
                .map_err(|e| {
                    AnalysisError::Extraction(format!(
                        "create scratch directory in {}: {}",
                        self.scratch_root.display(),
                        e
                    ))
                })?,
        );
        debug!(
            request_id = job.request_id,
            "Scratch directory {}",
            scratch.path().display()
        );

        let run = self
            .runner
            .run_query(
                &job.database.0,
                &job.repository,
                &query_pack,
                &scratch,
                &cancel,
            )
            .await?;
        debug!(
            request_id = job.request_id,
            revision = %run.database_sha,
            source_root = %run.source_location_prefix,
            "Packaging results"
        );

        let archive_path = scratch.path().join(RESULTS_ARCHIVE_NAME);
        {
            let archive_path = archive_path.clone();
            let sarif = run.sarif_file_path.clone();
            let bqrs = run.bqrs_file_paths.clone();
            let cancel = cancel.clone();
            in_scratch(&scratch, AnalysisError::Packaging, move || {
                write_results_archive(&archive_path, sarif.as_deref(), &bqrs, &cancel)
            })
            .await?;
        }

        let archive_location = self.archives.store(job, &archive_path).await?;

        Ok(AnalysisOutcome {
            result_count: run.result_count,
            archive_location,
        })
    }
}
