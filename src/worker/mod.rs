//! Worker pool that pulls jobs off the queue and runs them.

mod pool;

pub use pool::WorkerPool;

use crate::error::AnalysisError;
use crate::models::AnalyzeJob;
use async_trait::async_trait;

/// What a successful analysis hands back to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisOutcome {
    pub result_count: usize,
    pub archive_location: String,
}

/// Runs one job end to end.
///
/// Implementations own their scratch space and must release it on every
/// exit path, including when the returned future is dropped.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, job: &AnalyzeJob) -> Result<AnalysisOutcome, AnalysisError>;
}
