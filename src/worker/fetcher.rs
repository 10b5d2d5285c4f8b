//! Task fetcher: polls the job source on a fixed per-node cadence and
//! admits tasks into the queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::sleep_with_cancel;
use crate::api::{Identity, JobSource, SourceError, TaskSpec};
use crate::config::{BATCH_SIZE, MAX_404S_BEFORE_GIVING_UP, QUEUE_LOG_INTERVAL, TASK_FETCH_INTERVAL};
use crate::queue::TaskQueue;
use crate::stats::Counters;
use crate::task::{FetchState, Task};

/// One batch acquisition attempt for a node.
///
/// Already-assigned tasks take priority; when there are none, up to
/// `batch_size` new tasks are requested one at a time. The loop aborts on a
/// rate-limit signal and gives up after `max_404s` consecutive "no task
/// available" responses. `state.consecutive_404s` is only touched on the
/// new-task path; it resets on any successful new-task fetch.
pub async fn fetch_batch(
    source: &dyn JobSource,
    node_id: &str,
    identity: &Identity,
    state: &mut FetchState,
    batch_size: usize,
    max_404s: u32,
) -> Result<Vec<TaskSpec>, SourceError> {
    match source.fetch_existing(node_id).await {
        Ok(tasks) if !tasks.is_empty() => return Ok(tasks),
        Ok(_) => {}
        Err(e) if e.is_rate_limited() => return Err(e),
        // No existing tasks (or a transient fetch error): fall through to
        // new-task acquisition.
        Err(_) => {}
    }

    let mut tasks = Vec::new();
    for _ in 0..batch_size {
        match source.fetch_new(node_id, identity).await {
            Ok(spec) => {
                state.consecutive_404s = 0;
                tasks.push(spec);
            }
            Err(e) if e.is_rate_limited() => break,
            Err(e) if e.is_not_found() => {
                state.consecutive_404s += 1;
                if state.consecutive_404s >= max_404s {
                    break;
                }
            }
            Err(e) => return Err(e),
        }
    }
    Ok(tasks)
}

/// Fetcher loop: sweeps all nodes, enqueues what it gets, then sleeps for
/// `request_delay` (cancellable). Exits when `accepting` clears or the token
/// fires.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    source: Arc<dyn JobSource>,
    identity: Arc<Identity>,
    node_ids: Vec<String>,
    queue: Arc<TaskQueue>,
    counters: Arc<Counters>,
    request_delay: Duration,
    accepting: Arc<AtomicBool>,
    token: CancellationToken,
) {
    tracing::info!(nodes = node_ids.len(), "Fetcher started");

    // A zero delay would spin the sweep loop; the per-node cadence already
    // bounds request volume, so poll at 1s minimum.
    let request_delay = request_delay.max(Duration::from_secs(1));

    let mut states: Vec<FetchState> = node_ids
        .iter()
        .map(|_| FetchState::new(TASK_FETCH_INTERVAL, QUEUE_LOG_INTERVAL))
        .collect();

    loop {
        if token.is_cancelled() {
            tracing::info!("Fetcher shutting down");
            return;
        }
        if !accepting.load(Ordering::Relaxed) {
            tracing::info!("No longer accepting tasks, fetcher exiting");
            return;
        }

        for (node_id, state) in node_ids.iter().zip(states.iter_mut()) {
            if !state.should_fetch() {
                continue;
            }

            let specs = match fetch_batch(
                source.as_ref(),
                node_id,
                &identity,
                state,
                BATCH_SIZE,
                MAX_404S_BEFORE_GIVING_UP,
            )
            .await
            {
                Ok(specs) => specs,
                Err(e) if e.is_rate_limited() => {
                    tracing::debug!(node_id = %node_id, "Rate limited, waiting for next cadence");
                    continue;
                }
                Err(e) if e.is_not_found() => {
                    tracing::debug!(node_id = %node_id, "No tasks available");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(node_id = %node_id, error = %e, "Fetch failed");
                    continue;
                }
            };

            if specs.is_empty() {
                continue;
            }

            // Non-empty batch: the cadence timer restarts from now.
            state.mark_fetched();

            let mut added = 0usize;
            let mut dropped = 0usize;
            for spec in specs {
                counters.inc_fetched();
                let task = Task::new(
                    spec.task_id,
                    spec.program_id,
                    spec.public_inputs,
                    node_id.clone(),
                );
                if queue.enqueue(task) {
                    added += 1;
                } else {
                    dropped += 1;
                }
            }

            if state.should_log() {
                tracing::info!(
                    node_id = %node_id,
                    added,
                    dropped,
                    queue_depth = queue.len(),
                    "Fetched tasks"
                );
                state.mark_logged();
            }
        }

        if !sleep_with_cancel(&token, request_delay).await {
            tracing::info!("Fetcher shutting down");
            return;
        }
    }
}
