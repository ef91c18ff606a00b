//! End-of-session report.

mod generator;

pub use generator::{generate_json_report, generate_markdown_report};

use crate::commander::{RepoStatus, Session};
use crate::models::{OwnerRepo, Status};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Header facts about the run.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub session_id: u32,
    pub owner: String,
    pub controller_repo: String,
    pub query_pack: String,
    pub language: String,
    pub analysis_date: DateTime<Utc>,
    pub duration_seconds: f64,
}

/// Final state of one analyzed repository.
#[derive(Debug, Clone, Serialize)]
pub struct RepoReport {
    pub repository: OwnerRepo,
    #[serde(flatten)]
    pub status: RepoStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub requested: usize,
    pub analyzed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_results: usize,
}

/// Rejected repositories, one list per reason.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Skipped {
    pub access_mismatch: Vec<OwnerRepo>,
    pub not_found: Vec<OwnerRepo>,
    pub no_database: Vec<OwnerRepo>,
    pub over_limit: Vec<OwnerRepo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub metadata: ReportMetadata,
    pub summary: ReportSummary,
    pub repositories: Vec<RepoReport>,
    pub skipped: Skipped,
}

impl SessionReport {
    pub fn new(
        session: &Session,
        statuses: Vec<(OwnerRepo, RepoStatus)>,
        analysis_date: DateTime<Utc>,
        duration_seconds: f64,
    ) -> Self {
        let summary = ReportSummary {
            requested: session.repositories.len(),
            analyzed: statuses.len(),
            succeeded: statuses
                .iter()
                .filter(|(_, s)| s.status == Status::Success)
                .count(),
            failed: statuses
                .iter()
                .filter(|(_, s)| s.status == Status::Error)
                .count(),
            total_results: statuses.iter().map(|(_, s)| s.result_count).sum(),
        };

        Self {
            metadata: ReportMetadata {
                session_id: session.id,
                owner: session.owner.clone(),
                controller_repo: session.controller_repo.clone(),
                query_pack: session.query_pack.clone(),
                language: session.language.clone(),
                analysis_date,
                duration_seconds,
            },
            summary,
            repositories: statuses
                .into_iter()
                .map(|(repository, status)| RepoReport { repository, status })
                .collect(),
            skipped: Skipped {
                access_mismatch: session.access_mismatch_repos.clone(),
                not_found: session.not_found_repos.clone(),
                no_database: session.no_database_repos.clone(),
                over_limit: session.over_limit_repos.clone(),
            },
        }
    }

    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }
}
