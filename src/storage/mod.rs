//! Where query packs come from and where finished archives go.
//!
//! The engine only sees the two traits; the local directory backings are
//! what standalone mode wires in.

use crate::error::AnalysisError;
use crate::models::AnalyzeJob;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Resolves a query-pack reference to a directory the query tool can read.
#[async_trait]
pub trait QueryPackStore: Send + Sync {
    async fn resolve(&self, reference: &str) -> Result<PathBuf, AnalysisError>;
}

/// Persists a finished result archive and says where it ended up.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    async fn store(&self, job: &AnalyzeJob, archive: &Path) -> Result<String, AnalysisError>;
}

/// Reject references that would leave the store root.
fn confined(root: &Path, reference: &str) -> Result<PathBuf, AnalysisError> {
    let relative = Path::new(reference);
    let plain = !reference.is_empty()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !plain {
        return Err(AnalysisError::Storage(format!(
            "invalid query pack reference '{}'",
            reference
        )));
    }
    Ok(root.join(relative))
}

/// Query packs stored as unpacked directories under one root.
#[derive(Debug, Clone)]
pub struct LocalQueryPackStore {
    root: PathBuf,
}

impl LocalQueryPackStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl QueryPackStore for LocalQueryPackStore {
    async fn resolve(&self, reference: &str) -> Result<PathBuf, AnalysisError> {
        let path = confined(&self.root, reference)?;
        let is_dir = tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(AnalysisError::Storage(format!(
                "query pack '{}' not found under {}",
                reference,
                self.root.display()
            )));
        }
        Ok(path)
    }
}

/// Archives copied into one results directory.
#[derive(Debug, Clone)]
pub struct LocalArchiveStore {
    root: PathBuf,
}

impl LocalArchiveStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<session>-<owner>-<name>.zip`
    pub fn file_name(job: &AnalyzeJob) -> String {
        format!(
            "{}-{}-{}.zip",
            job.session_id, job.repository.owner, job.repository.name
        )
    }
}

#[async_trait]
impl ArchiveStore for LocalArchiveStore {
    async fn store(&self, job: &AnalyzeJob, archive: &Path) -> Result<String, AnalysisError> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            AnalysisError::Storage(format!("create {}: {}", self.root.display(), e))
        })?;

        let dest = self.root.join(Self::file_name(job));
        tokio::fs::copy(archive, &dest).await.map_err(|e| {
            AnalysisError::Storage(format!(
                "copy {} to {}: {}",
                archive.display(),
                dest.display(),
                e
            ))
        })?;

        debug!("Stored archive for {} at {}", job.repository, dest.display());
        Ok(dest.display().to_string())
    }
}
