//! Data models shared by the commander, the queue and the workers.
//!
//! Jobs and results are plain values: once a job is handed to the queue
//! nobody mutates it, and a result is produced exactly once per job by the
//! worker that ran it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Identifies one target repository as `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerRepo {
    pub owner: String,
    pub name: String,
}

impl OwnerRepo {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for OwnerRepo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for OwnerRepo {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (owner, name) = s
            .split_once('/')
            .ok_or_else(|| format!("Expected owner/name, got '{}'", s))?;

        let valid = |part: &str| {
            !part.is_empty()
                && part != "."
                && part != ".."
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };

        if !valid(owner) || !valid(name) {
            return Err(format!("Invalid repository name: '{}'", s));
        }

        Ok(Self::new(owner, name))
    }
}

impl TryFrom<String> for OwnerRepo {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OwnerRepo> for String {
    fn from(value: OwnerRepo) -> Self {
        value.to_string()
    }
}

/// Location of a prebuilt database package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DbLocation(pub PathBuf);

impl fmt::Display for DbLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Processing status of one repository within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Queued,
    Running,
    Success,
    Error,
}

impl Status {
    /// Success and Error are final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Success | Status::Error)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// `Queued` may jump straight to a terminal state: a job cancelled
    /// before it started never reports `Running`.
    pub fn can_transition_to(&self, next: Status) -> bool {
        match (self, next) {
            (Status::Queued, Status::Running) => true,
            (Status::Queued | Status::Running, Status::Success | Status::Error) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Queued => write!(f, "Queued"),
            Status::Running => write!(f, "Running"),
            Status::Success => write!(f, "Success"),
            Status::Error => write!(f, "Error"),
        }
    }
}

impl Status {
    /// Returns an emoji representation of the status.
    pub fn emoji(&self) -> &'static str {
        match self {
            Status::Queued => "⏳",
            Status::Running => "🔄",
            Status::Success => "✅",
            Status::Error => "❌",
        }
    }
}

/// One unit of work: run a query pack against one repository's database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeJob {
    /// Unique per job across the process.
    pub request_id: u64,
    /// Session this job belongs to.
    pub session_id: u32,
    /// Reference to the query pack, resolved by the query-pack store.
    pub query_pack: String,
    /// Target repository.
    pub repository: OwnerRepo,
    /// Where the repository's database package lives.
    pub database: DbLocation,
}

/// Report published by a worker about one job.
///
/// A worker publishes at most one `Running` report and exactly one
/// terminal report per job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeResult {
    pub request_id: u64,
    pub session_id: u32,
    pub repository: OwnerRepo,
    /// Number of results found; always 0 unless `status` is `Success`.
    pub result_count: usize,
    /// Location of the stored result archive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_location: Option<String>,
    pub status: Status,
    /// Diagnostic message for failed jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalyzeResult {
    fn for_job(job: &AnalyzeJob, status: Status) -> Self {
        Self {
            request_id: job.request_id,
            session_id: job.session_id,
            repository: job.repository.clone(),
            result_count: 0,
            archive_location: None,
            status,
            error: None,
        }
    }

    /// Progress report sent when a worker picks the job up.
    pub fn running(job: &AnalyzeJob) -> Self {
        Self::for_job(job, Status::Running)
    }

    pub fn success(job: &AnalyzeJob, result_count: usize, archive_location: String) -> Self {
        Self {
            result_count,
            archive_location: Some(archive_location),
            ..Self::for_job(job, Status::Success)
        }
    }

    /// Failed jobs always carry a zero count and no archive.
    pub fn failed(job: &AnalyzeJob, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::for_job(job, Status::Error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> AnalyzeJob {
        AnalyzeJob {
            request_id: 7,
            session_id: 1,
            query_pack: "pack".to_string(),
            repository: OwnerRepo::new("google", "flatbuffers"),
            database: DbLocation(PathBuf::from("/dbs/google/flatbuffers.zip")),
        }
    }

    #[test]
    fn test_owner_repo_parse() {
        let repo: OwnerRepo = "rust-lang/rust".parse().unwrap();
        assert_eq!(repo.owner, "rust-lang");
        assert_eq!(repo.name, "rust");
        assert_eq!(repo.to_string(), "rust-lang/rust");
    }

    #[test]
    fn test_owner_repo_parse_invalid() {
        assert!("no-slash".parse::<OwnerRepo>().is_err());
        assert!("/name".parse::<OwnerRepo>().is_err());
        assert!("owner/".parse::<OwnerRepo>().is_err());
        assert!("owner/../etc".parse::<OwnerRepo>().is_err());
        assert!("owner/..".parse::<OwnerRepo>().is_err());
    }

    #[test]
    fn test_owner_repo_serde_as_string() {
        let repo = OwnerRepo::new("octo", "cat");
        let json = serde_json::to_string(&repo).unwrap();
        assert_eq!(json, "\"octo/cat\"");
        let back: OwnerRepo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, repo);
    }

    #[test]
    fn test_status_transitions() {
        assert!(Status::Queued.can_transition_to(Status::Running));
        assert!(Status::Running.can_transition_to(Status::Success));
        assert!(Status::Running.can_transition_to(Status::Error));
        assert!(Status::Queued.can_transition_to(Status::Error));

        assert!(!Status::Running.can_transition_to(Status::Queued));
        assert!(!Status::Running.can_transition_to(Status::Running));
        for terminal in [Status::Success, Status::Error] {
            assert!(terminal.is_terminal());
            for next in [Status::Queued, Status::Running, Status::Success, Status::Error] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_failed_result_has_zero_count() {
        let result = AnalyzeResult::failed(&job(), "boom");
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.result_count, 0);
        assert!(result.archive_location.is_none());
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert_eq!(result.request_id, 7);
    }

    #[test]
    fn test_success_result() {
        let result = AnalyzeResult::success(&job(), 12, "/results/a.zip".to_string());
        assert_eq!(result.status, Status::Success);
        assert_eq!(result.result_count, 12);
        assert_eq!(result.archive_location.as_deref(), Some("/results/a.zip"));
        assert!(result.error.is_none());
    }
}
