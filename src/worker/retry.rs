//! Retry drainer: re-attempts failed submissions with a bounded retry count.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{scrub_proof, sleep_with_cancel};
use crate::api::{Identity, JobSource};
use crate::config::MAX_SUBMIT_RETRIES;
use crate::queue::TaskQueue;
use crate::stats::Counters;

const EMPTY_POLL: Duration = Duration::from_secs(2);

pub async fn run(
    source: Arc<dyn JobSource>,
    identity: Arc<Identity>,
    queue: Arc<TaskQueue>,
    counters: Arc<Counters>,
    draining: Arc<AtomicBool>,
    token: CancellationToken,
) {
    tracing::info!("Retry submitter started");

    loop {
        if token.is_cancelled() {
            tracing::info!("Retry submitter shutting down");
            return;
        }

        let Some(mut record) = queue.try_dequeue_retry() else {
            if draining.load(Ordering::Relaxed) {
                tracing::info!("Retry queue drained, exiting");
                return;
            }
            if !sleep_with_cancel(&token, EMPTY_POLL).await {
                tracing::info!("Retry submitter shutting down");
                return;
            }
            continue;
        };

        match source.submit(&record.task, &record.proof, &identity).await {
            Ok(()) => {
                tracing::info!(task_id = %record.task.task_id, "Retry submission succeeded");
                counters.inc_submitted();
                scrub_proof(&mut record.proof);
            }
            Err(e) if record.retry_count < MAX_SUBMIT_RETRIES => {
                tracing::warn!(
                    task_id = %record.task.task_id,
                    attempt = record.retry_count,
                    error = %e,
                    "Retry submission failed, re-queueing"
                );
                record.retry_count += 1;
                queue.enqueue_retry(record).await;
            }
            Err(e) => {
                tracing::warn!(
                    task_id = %record.task.task_id,
                    attempts = record.retry_count,
                    error = %e,
                    "Retry limit reached, dropping proof"
                );
                scrub_proof(&mut record.proof);
            }
        }
    }
}
