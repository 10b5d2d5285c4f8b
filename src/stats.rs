use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sysinfo::System;
use tokio_util::sync::CancellationToken;

use crate::queue::TaskQueue;

/// Process-wide cumulative counters. Initialized to zero at startup, never
/// reset. Each counter is incremented only by its owning component; the
/// stats reporter is a read-only consumer.
#[derive(Debug, Default)]
pub struct Counters {
    fetched: AtomicU64,
    proved: AtomicU64,
    submitted: AtomicU64,
}

/// Point-in-time view of the global counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub fetched: u64,
    pub proved: u64,
    pub submitted: u64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_fetched(&self) {
        self.fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_proved(&self) {
        self.proved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            fetched: self.fetched.load(Ordering::Relaxed),
            proved: self.proved.load(Ordering::Relaxed),
            submitted: self.submitted.load(Ordering::Relaxed),
        }
    }
}

/// Resident set size of this process in MB, or 0.0 if unavailable.
pub fn process_memory_mb() -> f64 {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0.0;
    };
    let mut sys = System::new();
    if !sys.refresh_process(pid) {
        return 0.0;
    }
    sys.process(pid)
        .map(|p| p.memory() as f64 / (1024.0 * 1024.0))
        .unwrap_or(0.0)
}

/// Periodic stats reporter. Snapshots the global counters and queue counters
/// on a fixed interval, logs deltas and per-minute rates alongside process
/// memory. Never mutates shared state.
pub async fn run_reporter(
    counters: Arc<Counters>,
    queue: Arc<TaskQueue>,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately; skip it so the first report covers a
    // full interval.
    ticker.tick().await;

    let mut last = CounterSnapshot::default();
    let minutes = interval.as_secs_f64() / 60.0;

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                tracing::debug!("stats reporter shutting down");
                return;
            }
            _ = ticker.tick() => {
                let now = counters.snapshot();
                let qs = queue.stats();

                let fetched_delta = now.fetched - last.fetched;
                let proved_delta = now.proved - last.proved;
                let submitted_delta = now.submitted - last.submitted;

                let prove_ratio = if now.fetched > 0 {
                    now.proved as f64 / now.fetched as f64 * 100.0
                } else {
                    0.0
                };
                let submit_ratio = if now.proved > 0 {
                    now.submitted as f64 / now.proved as f64 * 100.0
                } else {
                    0.0
                };

                tracing::info!(
                    fetched = now.fetched,
                    fetched_per_min = format!("{:.1}", fetched_delta as f64 / minutes),
                    proved = now.proved,
                    proved_per_min = format!("{:.1}", proved_delta as f64 / minutes),
                    submitted = now.submitted,
                    submitted_per_min = format!("{:.1}", submitted_delta as f64 / minutes),
                    queue_depth = queue.len(),
                    retry_depth = queue.retry_len(),
                    queued = qs.queued,
                    processed = qs.processed,
                    failed = qs.failed,
                    prove_success_pct = format!("{:.1}", prove_ratio),
                    submit_success_pct = format!("{:.1}", submit_ratio),
                    rss_mb = format!("{:.2}", process_memory_mb()),
                    "Periodic stats"
                );

                last = now;
            }
        }
    }
}

/// One-shot summary logged when the process exits.
pub fn log_final(counters: &Counters, queue: &TaskQueue) {
    let c = counters.snapshot();
    let q = queue.stats();
    tracing::info!(
        fetched = c.fetched,
        proved = c.proved,
        submitted = c.submitted,
        queued = q.queued,
        processed = q.processed,
        failed = q.failed,
        rss_mb = format!("{:.2}", process_memory_mb()),
        "Final stats"
    );
}
