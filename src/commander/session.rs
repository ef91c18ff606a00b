//! Analysis sessions and their repository partition.

use crate::error::SessionError;
use crate::models::{DbLocation, OwnerRepo};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Session request as read from a manifest file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionManifest {
    pub owner: String,
    pub controller_repo: String,
    pub query_pack: String,
    pub language: String,
    pub repositories: Vec<OwnerRepo>,
}

impl SessionManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session manifest: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse session manifest: {}", path.display()))
    }
}

/// Where eligibility put a single repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoOutcome {
    Eligible(DbLocation),
    AccessMismatch,
    NotFound,
    NoDatabase,
    OverLimit,
}

/// One batch request. Apart from statuses, immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: u32,
    pub owner: String,
    pub controller_repo: String,
    pub query_pack: String,
    pub language: String,
    pub repositories: Vec<OwnerRepo>,
    pub analysis_repos: BTreeMap<OwnerRepo, DbLocation>,
    pub access_mismatch_repos: Vec<OwnerRepo>,
    pub not_found_repos: Vec<OwnerRepo>,
    pub no_database_repos: Vec<OwnerRepo>,
    pub over_limit_repos: Vec<OwnerRepo>,
}

impl Session {
    /// Build a session whose outcome sets partition `manifest.repositories`.
    ///
    /// Every repository needs exactly one outcome, and every outcome must
    /// belong to a listed repository.
    pub fn partition(
        id: u32,
        manifest: SessionManifest,
        outcomes: Vec<(OwnerRepo, RepoOutcome)>,
    ) -> Result<Self, SessionError> {
        let mut listed = HashSet::new();
        for repo in &manifest.repositories {
            if !listed.insert(repo) {
                return Err(SessionError::Duplicate(repo.to_string()));
            }
        }

        let mut session = Session {
            id,
            owner: manifest.owner,
            controller_repo: manifest.controller_repo,
            query_pack: manifest.query_pack,
            language: manifest.language,
            repositories: Vec::new(),
            analysis_repos: BTreeMap::new(),
            access_mismatch_repos: Vec::new(),
            not_found_repos: Vec::new(),
            no_database_repos: Vec::new(),
            over_limit_repos: Vec::new(),
        };

        let mut classified = HashSet::new();
        for (repo, outcome) in outcomes {
            if !listed.contains(&repo) {
                return Err(SessionError::UnknownRepository(repo.to_string()));
            }
            if !classified.insert(repo.clone()) {
                return Err(SessionError::Duplicate(repo.to_string()));
            }

            match outcome {
                RepoOutcome::Eligible(location) => {
                    session.analysis_repos.insert(repo, location);
                }
                RepoOutcome::AccessMismatch => session.access_mismatch_repos.push(repo),
                RepoOutcome::NotFound => session.not_found_repos.push(repo),
                RepoOutcome::NoDatabase => session.no_database_repos.push(repo),
                RepoOutcome::OverLimit => session.over_limit_repos.push(repo),
            }
        }

        if let Some(missing) = manifest
            .repositories
            .iter()
            .find(|repo| !classified.contains(*repo))
        {
            return Err(SessionError::Unclassified(missing.to_string()));
        }

        session.repositories = manifest.repositories;
        Ok(session)
    }

    /// Number of repositories rejected before analysis.
    pub fn rejected_count(&self) -> usize {
        self.access_mismatch_repos.len()
            + self.not_found_repos.len()
            + self.no_database_repos.len()
            + self.over_limit_repos.len()
    }
}
