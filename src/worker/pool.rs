//! Concurrent workers, each running one job at a time.
//!
//! A worker races three things while idle: the next job, its own stop
//! token and the pool-wide cancellation token. Stop lets the current job
//! finish; cancellation aborts it, which kills any running query process.

use super::Analyzer;
use crate::error::AnalysisError;
use crate::models::{AnalyzeJob, AnalyzeResult};
use crate::queue::JobQueue;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

struct Worker {
    id: usize,
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

/// Elastic set of workers sharing one queue and one analyzer.
pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    analyzer: Arc<dyn Analyzer>,
    cancel: CancellationToken,
    active: Vec<Worker>,
    retired: Vec<JoinHandle<()>>,
    next_id: usize,
}

impl WorkerPool {
    /// Spawn `count` workers on the current runtime.
    pub fn start(queue: Arc<dyn JobQueue>, analyzer: Arc<dyn Analyzer>, count: usize) -> Self {
        let mut pool = Self {
            queue,
            analyzer,
            cancel: CancellationToken::new(),
            active: Vec::new(),
            retired: Vec::new(),
            next_id: 0,
        };
        pool.scale_to(count);
        pool
    }

    /// Number of workers still taking jobs.
    pub fn size(&self) -> usize {
        self.active.len()
    }

    /// Grow or shrink to `count` workers.
    ///
    /// Retired workers finish the job they hold; queued jobs stay for the
    /// remaining workers.
    pub fn scale_to(&mut self, count: usize) {
        while self.active.len() < count {
            self.spawn_worker();
        }
        while self.active.len() > count {
            if let Some(worker) = self.active.pop() {
                info!(worker = worker.id, "Retiring worker");
                worker.stop.cancel();
                self.retired.push(worker.handle);
            }
        }
    }

    fn spawn_worker(&mut self) {
        let id = self.next_id;
        self.next_id += 1;

        let stop = CancellationToken::new();
        let handle = tokio::spawn(run_worker(
            id,
            Arc::clone(&self.queue),
            Arc::clone(&self.analyzer),
            stop.clone(),
            self.cancel.clone(),
        ));
        debug!(worker = id, "Spawned worker");
        self.active.push(Worker { id, stop, handle });
    }

    /// Abort every worker now. In-flight jobs report an error.
    pub fn cancel(&self) {
        warn!("Cancelling all workers");
        self.cancel.cancel();
    }

    /// Wait for every worker, active or retired, to exit.
    pub async fn join(self) {
        let handles = self.into_handles();
        log_join_failures(join_all(handles).await);
    }

    /// Close the queue and let the workers drain it.
    ///
    /// Workers that are still busy after `grace` are cancelled. Returns
    /// `false` if that happened.
    pub async fn shutdown(self, grace: Duration) -> bool {
        info!("Shutting down worker pool ({}s grace)", grace.as_secs());
        self.queue.close();

        let cancel = self.cancel.clone();
        let mut all = Box::pin(join_all(self.into_handles()));

        match tokio::time::timeout(grace, all.as_mut()).await {
            Ok(joined) => {
                log_join_failures(joined);
                true
            }
            Err(_) => {
                warn!("Grace period expired, cancelling remaining jobs");
                cancel.cancel();
                log_join_failures(all.await);
                false
            }
        }
    }

    fn into_handles(self) -> Vec<JoinHandle<()>> {
        self.active
            .into_iter()
            .map(|w| w.handle)
            .chain(self.retired)
            .collect()
    }
}

fn log_join_failures(joined: Vec<Result<(), tokio::task::JoinError>>) {
    for result in joined {
        if let Err(e) = result {
            error!("Worker task failed: {}", e);
        }
    }
}

async fn run_worker(
    id: usize,
    queue: Arc<dyn JobQueue>,
    analyzer: Arc<dyn Analyzer>,
    stop: CancellationToken,
    cancel: CancellationToken,
) {
    debug!(worker = id, "Worker started");

    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = stop.cancelled() => break,
            job = queue.dequeue() => match job {
                Some(job) => job,
                None => {
                    debug!(worker = id, "Queue closed and drained");
                    break;
                }
            },
        };

        process_job(id, queue.as_ref(), &analyzer, &cancel, job).await;
    }

    debug!(worker = id, "Worker exited");
}

/// Run one job and publish exactly one terminal report for it.
async fn process_job(
    id: usize,
    queue: &dyn JobQueue,
    analyzer: &Arc<dyn Analyzer>,
    cancel: &CancellationToken,
    job: AnalyzeJob,
) {
    info!(
        worker = id,
        request_id = job.request_id,
        repository = %job.repository,
        "Picked up job"
    );

    if let Err(e) = queue.enqueue_result(AnalyzeResult::running(&job)).await {
        warn!(request_id = job.request_id, "Could not publish progress: {}", e);
    }

    // Own task so a panic becomes an error report instead of killing the worker.
    let task = {
        let analyzer = Arc::clone(analyzer);
        let job = job.clone();
        tokio::spawn(async move { analyzer.analyze(&job).await })
    };
    let abort = task.abort_handle();

    let report = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            abort.abort();
            AnalyzeResult::failed(&job, AnalysisError::Cancelled.to_string())
        }
        joined = task => match joined {
            Ok(Ok(outcome)) => {
                AnalyzeResult::success(&job, outcome.result_count, outcome.archive_location)
            }
            Ok(Err(e)) => AnalyzeResult::failed(&job, e.to_string()),
            Err(e) => AnalyzeResult::failed(&job, format!("analysis task failed: {}", e)),
        },
    };

    match &report.error {
        None => info!(
            worker = id,
            request_id = job.request_id,
            result_count = report.result_count,
            "Job succeeded"
        ),
        Some(message) => warn!(
            worker = id,
            request_id = job.request_id,
            repository = %job.repository,
            "Job failed: {}",
            message
        ),
    }

    if let Err(e) = queue.enqueue_result(report).await {
        error!(request_id = job.request_id, "Could not publish result: {}", e);
    }
}
