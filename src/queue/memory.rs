//! Single-process queue backed by bounded tokio channels.

use super::JobQueue;
use crate::config::SubmitPolicy;
use crate::error::QueueError;
use crate::models::{AnalyzeJob, AnalyzeResult};
use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One direction of the queue.
///
/// The sender lives as long as the lane, so closing is signalled through
/// `closed` rather than by dropping it.
struct Lane<T> {
    tx: mpsc::Sender<T>,
    rx: Mutex<mpsc::Receiver<T>>,
    closed: CancellationToken,
}

impl<T: Send> Lane<T> {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
            closed: CancellationToken::new(),
        }
    }

    async fn send(&self, item: T) -> Result<(), QueueError> {
        if self.closed.is_cancelled() {
            return Err(QueueError::Closed);
        }

        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(QueueError::Closed),
            sent = self.tx.send(item) => sent.map_err(|_| QueueError::Closed),
        }
    }

    fn try_send(&self, item: T) -> Result<(), QueueError> {
        if self.closed.is_cancelled() {
            return Err(QueueError::Closed);
        }

        self.tx.try_send(item).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full,
            TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    async fn recv(&self) -> Option<T> {
        let mut rx = self.rx.lock().await;

        // Buffered items win over the close signal so a closed lane drains.
        tokio::select! {
            biased;
            item = rx.recv() => item,
            _ = self.closed.cancelled() => rx.try_recv().ok(),
        }
    }

    async fn drain(&self) -> Vec<T> {
        let mut rx = self.rx.lock().await;
        let mut items = Vec::new();
        while let Ok(item) = rx.try_recv() {
            items.push(item);
        }
        items
    }
}

/// In-process `JobQueue` used by the standalone mode.
pub struct InMemoryQueue {
    jobs: Lane<AnalyzeJob>,
    results: Lane<AnalyzeResult>,
    policy: SubmitPolicy,
}

impl InMemoryQueue {
    /// Create a queue holding at most `capacity` items in each direction.
    pub fn new(capacity: usize, policy: SubmitPolicy) -> Self {
        let capacity = capacity.max(1);
        debug!("Creating in-memory queue (capacity {}, {:?})", capacity, policy);
        Self {
            jobs: Lane::new(capacity),
            results: Lane::new(capacity),
            policy,
        }
    }
}

#[async_trait]
impl JobQueue for InMemoryQueue {
    async fn enqueue(&self, job: AnalyzeJob) -> Result<(), QueueError> {
        match self.policy {
            SubmitPolicy::Block => self.jobs.send(job).await,
            SubmitPolicy::FailFast => self.jobs.try_send(job),
        }
    }

    async fn dequeue(&self) -> Option<AnalyzeJob> {
        self.jobs.recv().await
    }

    async fn enqueue_result(&self, result: AnalyzeResult) -> Result<(), QueueError> {
        self.results.send(result).await
    }

    async fn dequeue_result(&self) -> Option<AnalyzeResult> {
        self.results.recv().await
    }

    fn close(&self) {
        self.jobs.closed.cancel();
    }

    fn close_results(&self) {
        self.results.closed.cancel();
    }

    fn is_closed(&self) -> bool {
        self.jobs.closed.is_cancelled()
    }

    async fn drain(&self) -> Vec<AnalyzeJob> {
        self.jobs.drain().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DbLocation, OwnerRepo};
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    fn job(id: u64) -> AnalyzeJob {
        AnalyzeJob {
            request_id: id,
            session_id: 1,
            query_pack: "pack".to_string(),
            repository: OwnerRepo::new("owner", format!("repo{}", id)),
            database: DbLocation(PathBuf::from(format!("/db/{}.zip", id))),
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = InMemoryQueue::new(4, SubmitPolicy::Block);
        for id in 1..=3 {
            queue.enqueue(job(id)).await.unwrap();
        }
        for id in 1..=3 {
            assert_eq!(queue.dequeue().await.unwrap().request_id, id);
        }
    }

    #[tokio::test]
    async fn test_closed_queue_drains_then_signals_closure() {
        let queue = InMemoryQueue::new(4, SubmitPolicy::Block);
        queue.enqueue(job(1)).await.unwrap();
        queue.close();

        assert!(queue.is_closed());
        assert_eq!(queue.dequeue().await.unwrap().request_id, 1);
        assert!(queue.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn test_enqueue_on_closed_queue() {
        let queue = InMemoryQueue::new(4, SubmitPolicy::Block);
        queue.close();
        assert_eq!(queue.enqueue(job(1)).await, Err(QueueError::Closed));
    }

    #[tokio::test]
    async fn test_fail_fast_when_full() {
        let queue = InMemoryQueue::new(1, SubmitPolicy::FailFast);
        queue.enqueue(job(1)).await.unwrap();
        assert_eq!(queue.enqueue(job(2)).await, Err(QueueError::Full));
    }

    #[tokio::test]
    async fn test_blocking_enqueue_applies_backpressure() {
        let queue = Arc::new(InMemoryQueue::new(1, SubmitPolicy::Block));
        queue.enqueue(job(1)).await.unwrap();

        let pending = tokio::time::timeout(Duration::from_millis(50), queue.enqueue(job(2))).await;
        assert!(pending.is_err(), "second enqueue should wait for room");

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.enqueue(job(3)).await })
        };
        assert_eq!(queue.dequeue().await.unwrap().request_id, 1);
        producer.await.unwrap().unwrap();
        assert_eq!(queue.dequeue().await.unwrap().request_id, 3);
    }

    #[tokio::test]
    async fn test_blocked_enqueue_released_by_close() {
        let queue = Arc::new(InMemoryQueue::new(1, SubmitPolicy::Block));
        queue.enqueue(job(1)).await.unwrap();

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.enqueue(job(2)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        assert_eq!(producer.await.unwrap(), Err(QueueError::Closed));
    }

    #[tokio::test]
    async fn test_dequeue_waits_for_job() {
        let queue = Arc::new(InMemoryQueue::new(2, SubmitPolicy::Block));
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(job(9)).await.unwrap();
        assert_eq!(consumer.await.unwrap().unwrap().request_id, 9);
    }

    #[tokio::test]
    async fn test_results_lane() {
        let queue = InMemoryQueue::new(2, SubmitPolicy::Block);
        queue
            .enqueue_result(AnalyzeResult::failed(&job(1), "nope"))
            .await
            .unwrap();
        queue.close_results();

        let result = queue.dequeue_result().await.unwrap();
        assert_eq!(result.request_id, 1);
        assert!(queue.dequeue_result().await.is_none());
        assert_eq!(
            queue.enqueue_result(AnalyzeResult::running(&job(2))).await,
            Err(QueueError::Closed)
        );
    }

    #[tokio::test]
    async fn test_drain_returns_waiting_jobs() {
        let queue = InMemoryQueue::new(4, SubmitPolicy::Block);
        queue.enqueue(job(1)).await.unwrap();
        queue.enqueue(job(2)).await.unwrap();
        queue.close();

        let drained: Vec<u64> = queue.drain().await.iter().map(|j| j.request_id).collect();
        assert_eq!(drained, vec![1, 2]);
        assert!(queue.dequeue().await.is_none());
    }
}
