//! End-to-end pipeline flow with a scripted source: fetch -> queue ->
//! compute -> submit, including queue back-pressure drops.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{task_spec, MockSource};
use proverd::api::Identity;
use proverd::prover::LocalEngine;
use proverd::queue::TaskQueue;
use proverd::stats::Counters;
use proverd::worker;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn fetch_compute_submit_round_trip() {
    let source = Arc::new(MockSource::new());
    source.script_existing(Ok(vec![task_spec("t1"), task_spec("t2")]));
    let identity = Arc::new(Identity::generate());
    let queue = Arc::new(TaskQueue::new(10, 10));
    let counters = Arc::new(Counters::new());
    let accepting = Arc::new(AtomicBool::new(true));
    let draining = Arc::new(AtomicBool::new(false));
    let token = CancellationToken::new();

    let fetcher = tokio::spawn(worker::fetcher::run(
        source.clone(),
        identity.clone(),
        vec!["n1".to_string()],
        queue.clone(),
        counters.clone(),
        Duration::from_secs(1),
        accepting.clone(),
        token.clone(),
    ));

    let worker_handle = tokio::spawn(worker::prover::run_local(
        0,
        Arc::new(LocalEngine),
        source.clone(),
        identity.clone(),
        queue.clone(),
        counters.clone(),
        Duration::ZERO,
        draining.clone(),
        token.clone(),
    ));

    // Wait for both tasks to make it all the way through.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while counters.snapshot().submitted < 2 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // Drain: fetcher stops admitting, worker exits on the empty queue.
    accepting.store(false, Ordering::Relaxed);
    draining.store(true, Ordering::Relaxed);
    fetcher.await.unwrap();
    worker_handle.await.unwrap();

    let c = counters.snapshot();
    assert_eq!(c.fetched, 2);
    assert_eq!(c.proved, 2);
    assert_eq!(c.submitted, 2);

    let q = queue.stats();
    assert_eq!(q.queued, 2);
    assert_eq!(q.processed, 2);
    assert_eq!(q.failed, 0);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn full_queue_drops_tasks_without_stalling_the_fetcher() {
    let source = Arc::new(MockSource::new());
    source.script_existing(Ok(vec![
        task_spec("t1"),
        task_spec("t2"),
        task_spec("t3"),
    ]));
    let identity = Arc::new(Identity::generate());
    // Capacity 1: two of the three fetched tasks must be dropped.
    let queue = Arc::new(TaskQueue::new(1, 10));
    let counters = Arc::new(Counters::new());
    let accepting = Arc::new(AtomicBool::new(true));
    let token = CancellationToken::new();

    let fetcher = tokio::spawn(worker::fetcher::run(
        source.clone(),
        identity,
        vec!["n1".to_string()],
        queue.clone(),
        counters.clone(),
        Duration::from_secs(1),
        accepting.clone(),
        token.clone(),
    ));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while counters.snapshot().fetched < 3 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    token.cancel();
    fetcher.await.unwrap();

    assert_eq!(counters.snapshot().fetched, 3);
    assert_eq!(queue.stats().queued, 1);
    assert_eq!(queue.len(), 1);
}
