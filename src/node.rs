use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::api::{Identity, JobSource};
use crate::config::{Config, DRAIN_GRACE, STATS_INTERVAL};
use crate::error::Result;
use crate::isolation::IsolatedProver;
use crate::prover::ProofEngine;
use crate::queue::TaskQueue;
use crate::stats::{self, Counters};
use crate::worker;

/// How proofs are computed: in-process, or one disposable subprocess per
/// task. The two modes are mutually exclusive for a given run.
pub enum ComputeMode {
    Local(Arc<dyn ProofEngine>),
    Isolated(Arc<IsolatedProver>),
}

/// Owns the shared state and runs the whole pipeline: fetcher, compute
/// worker pool, retry drainer, and stats reporter.
pub struct Runtime {
    config: Config,
    source: Arc<dyn JobSource>,
    identity: Arc<Identity>,
    queue: Arc<TaskQueue>,
    counters: Arc<Counters>,
}

impl Runtime {
    pub fn new(config: Config, source: Arc<dyn JobSource>) -> Self {
        let queue = Arc::new(TaskQueue::new(
            config.task_queue_capacity,
            config.retry_queue_capacity,
        ));
        Self {
            config,
            source,
            identity: Arc::new(Identity::generate()),
            queue,
            counters: Arc::new(Counters::new()),
        }
    }

    /// Run until `shutdown` fires, then drain.
    ///
    /// Shutdown proceeds in two phases: first the fetcher stops admitting
    /// new tasks while workers keep consuming what is queued and in flight;
    /// after the grace period any remaining work is abandoned via a hard
    /// stop.
    pub async fn run(self, mode: ComputeMode, shutdown: CancellationToken) -> Result<()> {
        tracing::info!(
            nodes = self.config.node_ids.len(),
            workers = self.config.prover_workers,
            queue_capacity = self.config.task_queue_capacity,
            retry_capacity = self.config.retry_queue_capacity,
            isolated = matches!(mode, ComputeMode::Isolated(_)),
            rss_mb = format!("{:.2}", stats::process_memory_mb()),
            "Starting pipeline"
        );

        if self.config.startup_delay > 0 {
            tracing::info!(
                seconds = self.config.startup_delay,
                "Startup delay before first fetch"
            );
            if !worker::sleep_with_cancel(
                &shutdown,
                Duration::from_secs(self.config.startup_delay),
            )
            .await
            {
                return Ok(());
            }
        }

        let accepting = Arc::new(AtomicBool::new(true));
        let draining = Arc::new(AtomicBool::new(false));
        // Hard stop for workers; the fetcher gets its own child so it can be
        // cancelled first while workers drain.
        let stop = CancellationToken::new();
        let fetch_stop = stop.child_token();

        let mut tasks = JoinSet::new();

        tasks.spawn(worker::fetcher::run(
            self.source.clone(),
            self.identity.clone(),
            self.config.node_ids.clone(),
            self.queue.clone(),
            self.counters.clone(),
            Duration::from_secs(self.config.request_delay),
            accepting.clone(),
            fetch_stop.clone(),
        ));

        match &mode {
            ComputeMode::Local(engine) => {
                for id in 0..self.config.prover_workers {
                    tasks.spawn(worker::prover::run_local(
                        id,
                        engine.clone(),
                        self.source.clone(),
                        self.identity.clone(),
                        self.queue.clone(),
                        self.counters.clone(),
                        Duration::from_secs(self.config.prover_submit_wait_second),
                        draining.clone(),
                        stop.clone(),
                    ));
                }
            }
            ComputeMode::Isolated(prover) => {
                for id in 0..self.config.prover_workers {
                    tasks.spawn(worker::prover::run_isolated(
                        id,
                        prover.clone(),
                        self.source.clone(),
                        self.identity.clone(),
                        self.queue.clone(),
                        self.counters.clone(),
                        draining.clone(),
                        stop.clone(),
                    ));
                }
            }
        }

        tasks.spawn(worker::retry::run(
            self.source.clone(),
            self.identity.clone(),
            self.queue.clone(),
            self.counters.clone(),
            draining.clone(),
            stop.clone(),
        ));

        let reporter = tokio::spawn(stats::run_reporter(
            self.counters.clone(),
            self.queue.clone(),
            STATS_INTERVAL,
            stop.clone(),
        ));

        shutdown.cancelled().await;
        tracing::info!("Shutdown signal received, draining");
        accepting.store(false, Ordering::Relaxed);
        draining.store(true, Ordering::Relaxed);
        fetch_stop.cancel();

        let drained = tokio::time::timeout(DRAIN_GRACE, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        match drained {
            Ok(()) => tracing::info!("All workers drained"),
            Err(_) => {
                tracing::warn!(grace_secs = DRAIN_GRACE.as_secs(), "Drain grace expired, forcing stop");
                stop.cancel();
                let _ = tokio::time::timeout(Duration::from_secs(10), async {
                    while tasks.join_next().await.is_some() {}
                })
                .await;
                tasks.abort_all();
            }
        }

        stop.cancel();
        let _ = reporter.await;

        stats::log_final(&self.counters, &self.queue);
        Ok(())
    }
}
