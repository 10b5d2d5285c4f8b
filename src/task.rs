use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// A unit of work fetched from the job source. Immutable once created;
/// ownership moves fetcher -> queue -> worker -> submitter.
#[derive(Debug, Clone)]
pub struct Task {
    pub task_id: String,
    pub program_id: String,
    pub public_inputs: Vec<u8>,
    pub node_id: String,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(task_id: String, program_id: String, public_inputs: Vec<u8>, node_id: String) -> Self {
        Self {
            task_id,
            program_id,
            public_inputs,
            node_id,
            created_at: Utc::now(),
        }
    }
}

/// A task whose proof was computed but could not be submitted, awaiting
/// re-submission. `retry_count` starts at 1 and increments on each failure.
#[derive(Debug)]
pub struct RetryRecord {
    pub task: Task,
    pub proof: Vec<u8>,
    pub retry_count: u32,
}

/// Per-node fetch cadence bookkeeping.
///
/// Two independent timers: the fetch-cadence timer is measured from the last
/// *successful* fetch, so failed attempts do not shorten the wait; the log
/// timer only throttles observability output. `consecutive_404s` is owned by
/// the batch acquisition loop and reset on any successful new-task fetch.
#[derive(Debug)]
pub struct FetchState {
    last_fetch: Option<Instant>,
    last_log: Option<Instant>,
    fetch_interval: Duration,
    log_interval: Duration,
    pub consecutive_404s: u32,
}

impl FetchState {
    pub fn new(fetch_interval: Duration, log_interval: Duration) -> Self {
        Self {
            last_fetch: None,
            last_log: None,
            fetch_interval,
            log_interval,
            consecutive_404s: 0,
        }
    }

    /// True iff at least `fetch_interval` has elapsed since the last
    /// successful fetch. Always true before the first success.
    pub fn should_fetch(&self) -> bool {
        match self.last_fetch {
            Some(t) => t.elapsed() >= self.fetch_interval,
            None => true,
        }
    }

    /// Reset the fetch-cadence timer. Call only after a successful fetch.
    pub fn mark_fetched(&mut self) {
        self.last_fetch = Some(Instant::now());
    }

    pub fn should_log(&self) -> bool {
        match self.last_log {
            Some(t) => t.elapsed() >= self.log_interval,
            None => true,
        }
    }

    pub fn mark_logged(&mut self) {
        self.last_log = Some(Instant::now());
    }
}
