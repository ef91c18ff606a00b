//! Sorting a session's repositories into analyzable and rejected.

use super::session::{RepoOutcome, SessionManifest};
use crate::models::{DbLocation, OwnerRepo};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

/// Classifies every repository of a manifest into exactly one outcome.
#[async_trait]
pub trait EligibilityCheck: Send + Sync {
    async fn classify(&self, manifest: &SessionManifest) -> Vec<(OwnerRepo, RepoOutcome)>;
}

/// Database packages laid out as `<root>/<owner>/<name>.zip`.
///
/// Repositories past `max_repositories` are over the limit, an unknown
/// owner directory means not found, and a missing package means no
/// database. Access checks belong to the hosting service and are not
/// made here.
#[derive(Debug, Clone)]
pub struct LocalEligibility {
    databases_dir: PathBuf,
    max_repositories: usize,
}

impl LocalEligibility {
    pub fn new(databases_dir: impl Into<PathBuf>, max_repositories: usize) -> Self {
        Self {
            databases_dir: databases_dir.into(),
            max_repositories,
        }
    }

    pub fn database_path(&self, repo: &OwnerRepo) -> PathBuf {
        self.databases_dir
            .join(&repo.owner)
            .join(format!("{}.zip", repo.name))
    }

    async fn classify_one(&self, repo: &OwnerRepo) -> RepoOutcome {
        let owner_dir = self.databases_dir.join(&repo.owner);
        if !tokio::fs::try_exists(&owner_dir).await.unwrap_or(false) {
            return RepoOutcome::NotFound;
        }

        let package = self.database_path(repo);
        match tokio::fs::metadata(&package).await {
            Ok(meta) if meta.is_file() => RepoOutcome::Eligible(DbLocation(package)),
            _ => RepoOutcome::NoDatabase,
        }
    }
}

#[async_trait]
impl EligibilityCheck for LocalEligibility {
    async fn classify(&self, manifest: &SessionManifest) -> Vec<(OwnerRepo, RepoOutcome)> {
        let mut outcomes = Vec::with_capacity(manifest.repositories.len());
        for (index, repo) in manifest.repositories.iter().enumerate() {
            let outcome = if index >= self.max_repositories {
                RepoOutcome::OverLimit
            } else {
                self.classify_one(repo).await
            };
            debug!("{} -> {:?}", repo, outcome);
            outcomes.push((repo.clone(), outcome));
        }
        outcomes
    }
}
