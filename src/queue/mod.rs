//! Bounded hand-off between the commander and the workers.
//!
//! Jobs flow commander → workers, reports flow workers → commander. Both
//! directions are FIFO and bounded; nothing is buffered beyond the
//! configured capacity.

mod memory;

pub use memory::InMemoryQueue;

use crate::error::QueueError;
use crate::models::{AnalyzeJob, AnalyzeResult};
use async_trait::async_trait;

/// Two-way job/result channel. Backings are chosen at startup.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Submit a job. Waits for room or fails fast, per the submit policy.
    async fn enqueue(&self, job: AnalyzeJob) -> Result<(), QueueError>;

    /// Next job, or `None` once the queue is closed and drained.
    async fn dequeue(&self) -> Option<AnalyzeJob>;

    /// Publish a worker report. Always waits for room.
    async fn enqueue_result(&self, result: AnalyzeResult) -> Result<(), QueueError>;

    /// Next report, or `None` once results are closed and drained.
    async fn dequeue_result(&self) -> Option<AnalyzeResult>;

    /// Stop accepting jobs. Already-queued jobs can still be dequeued.
    fn close(&self);

    /// Stop accepting reports. Already-queued reports can still be dequeued.
    fn close_results(&self);

    fn is_closed(&self) -> bool;

    /// Remove every job still waiting in the queue.
    async fn drain(&self) -> Vec<AnalyzeJob>;
}
