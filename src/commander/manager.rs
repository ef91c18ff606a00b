//! Turns sessions into jobs and folds worker reports into the status table.

use super::eligibility::EligibilityCheck;
use super::session::{Session, SessionManifest};
use super::status::StatusStore;
use crate::error::SessionError;
use crate::models::{AnalyzeJob, AnalyzeResult, Status};
use crate::queue::JobQueue;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct SessionManager {
    queue: Arc<dyn JobQueue>,
    status: Arc<dyn StatusStore>,
    eligibility: Arc<dyn EligibilityCheck>,
    next_session_id: AtomicU32,
    next_request_id: AtomicU64,
    /// Count of terminal reports applied so far.
    progress: Arc<watch::Sender<usize>>,
}

impl SessionManager {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        status: Arc<dyn StatusStore>,
        eligibility: Arc<dyn EligibilityCheck>,
        starting_session_id: u32,
    ) -> Self {
        let (progress, _) = watch::channel(0);
        Self {
            queue,
            status,
            eligibility,
            next_session_id: AtomicU32::new(starting_session_id),
            next_request_id: AtomicU64::new(1),
            progress: Arc::new(progress),
        }
    }

    pub fn status_store(&self) -> &Arc<dyn StatusStore> {
        &self.status
    }

    /// Receiver that changes every time a job reaches a terminal status.
    pub fn progress(&self) -> watch::Receiver<usize> {
        self.progress.subscribe()
    }

    /// Classify the manifest's repositories and start tracking the
    /// analyzable ones as `Queued`.
    pub async fn create_session(&self, manifest: SessionManifest) -> Result<Session, SessionError> {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let outcomes = self.eligibility.classify(&manifest).await;
        let session = Session::partition(id, manifest, outcomes)?;

        for repo in session.analysis_repos.keys() {
            self.status.register(session.id, repo).await;
        }

        info!(
            session = session.id,
            eligible = session.analysis_repos.len(),
            rejected = session.rejected_count(),
            "Created session"
        );
        Ok(session)
    }

    /// One job per analyzable repository, in repository order.
    pub fn plan_jobs(&self, session: &Session) -> Vec<AnalyzeJob> {
        session
            .analysis_repos
            .iter()
            .map(|(repo, database)| AnalyzeJob {
                request_id: self.next_request_id.fetch_add(1, Ordering::Relaxed),
                session_id: session.id,
                query_pack: session.query_pack.clone(),
                repository: repo.clone(),
                database: database.clone(),
            })
            .collect()
    }

    /// Submit jobs in order. A job the queue refuses is reported as failed
    /// so it still reaches a terminal status. Returns how many were queued.
    pub async fn submit(&self, jobs: &[AnalyzeJob]) -> usize {
        let mut submitted = 0;
        for job in jobs {
            match self.queue.enqueue(job.clone()).await {
                Ok(()) => {
                    debug!(request_id = job.request_id, repository = %job.repository, "Queued job");
                    submitted += 1;
                }
                Err(e) => {
                    warn!(repository = %job.repository, "Job not submitted: {}", e);
                    self.publish(AnalyzeResult::failed(job, format!("not submitted: {}", e)))
                        .await;
                }
            }
        }
        submitted
    }

    /// Fail every job that never started. Call once the workers have
    /// stopped. Returns how many jobs were cancelled this way.
    pub async fn cancel_pending(&self, jobs: &[AnalyzeJob]) -> usize {
        self.queue.close();
        let drained = self.queue.drain().await;
        debug!("Drained {} queued jobs", drained.len());

        let mut cancelled = 0;
        for job in jobs {
            let status = self.status.get(job.session_id, &job.repository).await;
            if status.map(|s| s.status) == Some(Status::Queued) {
                self.publish(AnalyzeResult::failed(job, "cancelled before start"))
                    .await;
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            warn!("Cancelled {} jobs before they started", cancelled);
        }
        cancelled
    }

    async fn publish(&self, result: AnalyzeResult) {
        if let Err(e) = self.queue.enqueue_result(result).await {
            warn!("Could not publish result: {}", e);
        }
    }

    /// Start the task that applies worker reports to the status table.
    pub fn spawn_consumer(&self) -> JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let status = Arc::clone(&self.status);
        let progress = Arc::clone(&self.progress);

        tokio::spawn(async move {
            while let Some(result) = queue.dequeue_result().await {
                match status.set_result(&result).await {
                    Ok(()) if result.status.is_terminal() => {
                        debug!(
                            request_id = result.request_id,
                            status = %result.status,
                            "Recorded result"
                        );
                        progress.send_modify(|done| *done += 1);
                    }
                    Ok(()) => {}
                    Err(e) => warn!(request_id = result.request_id, "Rejected report: {}", e),
                }
            }
            debug!("Result consumer finished");
        })
    }

    /// Wait until every analyzable repository of the session is terminal.
    pub async fn wait_for_completion(&self, session: &Session) {
        let mut progress = self.progress.subscribe();
        loop {
            let statuses = self.status.session(session.id).await;
            if statuses.iter().all(|(_, s)| s.status.is_terminal()) {
                return;
            }
            if progress.changed().await.is_err() {
                return;
            }
        }
    }

    /// Stop the consumer once every report has been applied.
    pub async fn finish(&self, consumer: JoinHandle<()>) {
        self.queue.close_results();
        if let Err(e) = consumer.await {
            warn!("Result consumer failed: {}", e);
        }
    }
}
