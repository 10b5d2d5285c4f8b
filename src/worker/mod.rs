//! Worker loops for the fetch/compute/submit pipeline.
//!
//! One fetcher, a pool of compute workers (in-process or process-isolated),
//! and one retry drainer, all communicating only through the shared
//! [`TaskQueue`](crate::queue::TaskQueue) and global counters.

pub mod fetcher;
pub mod prover;
pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::api::{Identity, JobSource};
use crate::queue::TaskQueue;
use crate::stats::Counters;
use crate::task::{RetryRecord, Task};

/// Sleep for `duration`, returning early with `false` when the token fires.
pub async fn sleep_with_cancel(token: &CancellationToken, duration: Duration) -> bool {
    if duration.is_zero() {
        return !token.is_cancelled();
    }
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Zero a proof's backing memory and release it. Called after a proof is
/// submitted or terminally dropped so peak memory stays bounded and the
/// artifact does not linger.
pub fn scrub_proof(proof: &mut Vec<u8>) {
    proof.iter_mut().for_each(|b| *b = 0);
    proof.clear();
    proof.shrink_to_fit();
}

/// Shared submission outcome handling for both compute worker variants.
///
/// Not-found means the task is gone upstream: the proof is scrubbed and the
/// task dropped for good. Any other failure parks a retry record (blocking
/// if the retry FIFO is full). Success scrubs the proof immediately.
pub async fn handle_submission(
    source: &dyn JobSource,
    identity: &Identity,
    queue: &Arc<TaskQueue>,
    counters: &Counters,
    task: Task,
    mut proof: Vec<u8>,
) {
    match source.submit(&task, &proof, identity).await {
        Ok(()) => {
            tracing::info!(task_id = %task.task_id, "Proof submitted");
            counters.inc_submitted();
            scrub_proof(&mut proof);
        }
        Err(e) if e.is_not_found() => {
            tracing::warn!(task_id = %task.task_id, error = %e, "Task unknown upstream, dropping proof");
            scrub_proof(&mut proof);
        }
        Err(e) => {
            tracing::warn!(task_id = %task.task_id, error = %e, "Submission failed, queuing for retry");
            queue
                .enqueue_retry(RetryRecord {
                    task,
                    proof,
                    retry_count: 1,
                })
                .await;
        }
    }
}
