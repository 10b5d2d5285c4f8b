//! Compute worker loops.
//!
//! Both variants pull from the task queue, classify the compute outcome,
//! and hand successes to the shared submission path. Compute failures are
//! terminal for the task (there is no artifact to retry); only submission
//! failures enter the retry queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{handle_submission, sleep_with_cancel};
use crate::api::{Identity, JobSource};
use crate::isolation::IsolatedProver;
use crate::prover::ProofEngine;
use crate::queue::TaskQueue;
use crate::stats::Counters;
use crate::task::Task;

const EMPTY_POLL: Duration = Duration::from_secs(1);

struct WorkerCtx {
    source: Arc<dyn JobSource>,
    identity: Arc<Identity>,
    queue: Arc<TaskQueue>,
    counters: Arc<Counters>,
    draining: Arc<AtomicBool>,
    token: CancellationToken,
}

/// Poll the queue for the next task. Returns None when the worker should
/// exit: hard stop, or draining with nothing left.
async fn next_task(id: usize, ctx: &WorkerCtx) -> Option<Task> {
    loop {
        if ctx.token.is_cancelled() {
            tracing::info!(worker = id, "Shutting down");
            return None;
        }
        match ctx.queue.dequeue() {
            Some(task) => return Some(task),
            None => {
                if ctx.draining.load(Ordering::Relaxed) {
                    tracing::info!(worker = id, "Queue drained, exiting");
                    return None;
                }
                if !sleep_with_cancel(&ctx.token, EMPTY_POLL).await {
                    tracing::info!(worker = id, "Shutting down");
                    return None;
                }
            }
        }
    }
}

/// In-process compute worker. The engine call runs on the blocking pool so
/// long proofs do not stall the runtime. Successful proofs are paced by
/// `submit_wait` before submission to avoid bursting the endpoint.
#[allow(clippy::too_many_arguments)]
pub async fn run_local(
    id: usize,
    engine: Arc<dyn ProofEngine>,
    source: Arc<dyn JobSource>,
    identity: Arc<Identity>,
    queue: Arc<TaskQueue>,
    counters: Arc<Counters>,
    submit_wait: Duration,
    draining: Arc<AtomicBool>,
    token: CancellationToken,
) {
    tracing::info!(worker = id, "Compute worker started");
    let ctx = WorkerCtx {
        source,
        identity,
        queue,
        counters,
        draining,
        token,
    };

    while let Some(task) = next_task(id, &ctx).await {
        tracing::debug!(
            worker = id,
            task_id = %task.task_id,
            input_len = task.public_inputs.len(),
            "Proving"
        );

        let engine = engine.clone();
        let program_id = task.program_id.clone();
        let inputs = task.public_inputs.clone();
        let result =
            tokio::task::spawn_blocking(move || engine.prove(&program_id, &inputs)).await;

        let proof = match result {
            Ok(Ok(proof)) => proof,
            Ok(Err(e)) => {
                tracing::warn!(worker = id, task_id = %task.task_id, error = %e, "Proof failed");
                ctx.queue.mark_failed();
                continue;
            }
            Err(e) => {
                tracing::error!(worker = id, task_id = %task.task_id, error = %e, "Prove task panicked");
                ctx.queue.mark_failed();
                continue;
            }
        };

        tracing::debug!(worker = id, task_id = %task.task_id, proof_len = proof.len(), "Proved");
        ctx.counters.inc_proved();
        ctx.queue.mark_processed();

        // Pacing; an interrupted wait still submits the finished proof.
        let _ = sleep_with_cancel(&ctx.token, submit_wait).await;

        handle_submission(
            ctx.source.as_ref(),
            &ctx.identity,
            &ctx.queue,
            &ctx.counters,
            task,
            proof,
        )
        .await;
    }
}

/// Process-isolated compute worker: identical outcome handling, but each
/// proof runs in a disposable subprocess via [`IsolatedProver`].
#[allow(clippy::too_many_arguments)]
pub async fn run_isolated(
    id: usize,
    prover: Arc<IsolatedProver>,
    source: Arc<dyn JobSource>,
    identity: Arc<Identity>,
    queue: Arc<TaskQueue>,
    counters: Arc<Counters>,
    draining: Arc<AtomicBool>,
    token: CancellationToken,
) {
    tracing::info!(worker = id, "Isolated compute worker started");
    let ctx = WorkerCtx {
        source,
        identity,
        queue,
        counters,
        draining,
        token,
    };

    while let Some(task) = next_task(id, &ctx).await {
        tracing::debug!(
            worker = id,
            task_id = %task.task_id,
            input_len = task.public_inputs.len(),
            "Proving in subprocess"
        );

        let proof = match prover.prove(&task).await {
            Ok(proof) => proof,
            Err(e) => {
                tracing::warn!(worker = id, task_id = %task.task_id, error = %e, "Isolated proof failed");
                ctx.queue.mark_failed();
                continue;
            }
        };

        tracing::debug!(worker = id, task_id = %task.task_id, proof_len = proof.len(), "Proved");
        ctx.counters.inc_proved();
        ctx.queue.mark_processed();

        handle_submission(
            ctx.source.as_ref(),
            &ctx.identity,
            &ctx.queue,
            &ctx.counters,
            task,
            proof,
        )
        .await;
    }
}
