//! Per-repository status table.
//!
//! One writer (the result consumer) and any number of readers. Every write
//! goes through the status state machine, so a terminal entry never
//! changes again.

use crate::error::StatusError;
use crate::models::{AnalyzeResult, OwnerRepo, Status};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// What is known about one repository of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoStatus {
    pub status: Status,
    pub result_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RepoStatus {
    fn queued() -> Self {
        Self {
            status: Status::Queued,
            result_count: 0,
            archive_location: None,
            error: None,
        }
    }
}

#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Start tracking a repository as `Queued`.
    async fn register(&self, session_id: u32, repository: &OwnerRepo);

    async fn set_status(
        &self,
        session_id: u32,
        repository: &OwnerRepo,
        status: Status,
    ) -> Result<(), StatusError>;

    /// Apply a worker report: status plus, for terminal reports, the
    /// count, archive location and error.
    async fn set_result(&self, result: &AnalyzeResult) -> Result<(), StatusError>;

    async fn get(&self, session_id: u32, repository: &OwnerRepo) -> Option<RepoStatus>;

    /// Every tracked repository of a session, sorted by name.
    async fn session(&self, session_id: u32) -> Vec<(OwnerRepo, RepoStatus)>;
}

type Key = (u32, OwnerRepo);

/// Status table kept in process memory.
#[derive(Default)]
pub struct InMemoryStatusStore {
    entries: RwLock<HashMap<Key, RepoStatus>>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_transition(
    repository: &OwnerRepo,
    current: &RepoStatus,
    next: Status,
) -> Result<(), StatusError> {
    if current.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(StatusError::IllegalTransition {
            repo: repository.to_string(),
            from: current.status,
            to: next,
        })
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn register(&self, session_id: u32, repository: &OwnerRepo) {
        self.entries
            .write()
            .await
            .insert((session_id, repository.clone()), RepoStatus::queued());
    }

    async fn set_status(
        &self,
        session_id: u32,
        repository: &OwnerRepo,
        status: Status,
    ) -> Result<(), StatusError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(&(session_id, repository.clone()))
            .ok_or_else(|| StatusError::Unknown(repository.to_string()))?;
        check_transition(repository, entry, status)?;
        entry.status = status;
        Ok(())
    }

    async fn set_result(&self, result: &AnalyzeResult) -> Result<(), StatusError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(&(result.session_id, result.repository.clone()))
            .ok_or_else(|| StatusError::Unknown(result.repository.to_string()))?;
        check_transition(&result.repository, entry, result.status)?;

        entry.status = result.status;
        if result.status.is_terminal() {
            entry.result_count = result.result_count;
            entry.archive_location = result.archive_location.clone();
            entry.error = result.error.clone();
        }
        Ok(())
    }

    async fn get(&self, session_id: u32, repository: &OwnerRepo) -> Option<RepoStatus> {
        self.entries
            .read()
            .await
            .get(&(session_id, repository.clone()))
            .cloned()
    }

    async fn session(&self, session_id: u32) -> Vec<(OwnerRepo, RepoStatus)> {
        let entries = self.entries.read().await;
        let mut repos: Vec<(OwnerRepo, RepoStatus)> = entries
            .iter()
            .filter(|((id, _), _)| *id == session_id)
            .map(|((_, repo), status)| (repo.clone(), status.clone()))
            .collect();
        repos.sort_by(|a, b| a.0.cmp(&b.0));
        repos
    }
}
