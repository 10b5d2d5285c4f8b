//! Shared test doubles for the pipeline integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use proverd::api::{Identity, JobSource, SourceError, TaskSpec};
use proverd::task::Task;

/// Scripted job source: each operation pops the next scripted outcome, with
/// a quiet default (nothing assigned, no new tasks, submissions accepted).
#[derive(Default)]
pub struct MockSource {
    pub existing: Mutex<VecDeque<Result<Vec<TaskSpec>, SourceError>>>,
    pub new_tasks: Mutex<VecDeque<Result<TaskSpec, SourceError>>>,
    pub submit_results: Mutex<VecDeque<Result<(), SourceError>>>,
    pub fetch_existing_calls: AtomicUsize,
    pub fetch_new_calls: AtomicUsize,
    pub submit_calls: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_existing(&self, outcome: Result<Vec<TaskSpec>, SourceError>) {
        self.existing.lock().unwrap().push_back(outcome);
    }

    pub fn script_new(&self, outcome: Result<TaskSpec, SourceError>) {
        self.new_tasks.lock().unwrap().push_back(outcome);
    }

    pub fn script_submit(&self, outcome: Result<(), SourceError>) {
        self.submit_results.lock().unwrap().push_back(outcome);
    }
}

#[async_trait]
impl JobSource for MockSource {
    async fn fetch_existing(&self, _node_id: &str) -> Result<Vec<TaskSpec>, SourceError> {
        self.fetch_existing_calls.fetch_add(1, Ordering::SeqCst);
        self.existing
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Vec::new()))
    }

    async fn fetch_new(
        &self,
        _node_id: &str,
        _identity: &Identity,
    ) -> Result<TaskSpec, SourceError> {
        self.fetch_new_calls.fetch_add(1, Ordering::SeqCst);
        self.new_tasks
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(SourceError::NotFound("no task available".into())))
    }

    async fn submit(
        &self,
        _task: &Task,
        _proof: &[u8],
        _identity: &Identity,
    ) -> Result<(), SourceError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submit_results.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

pub fn task_spec(id: &str) -> TaskSpec {
    TaskSpec {
        task_id: id.to_string(),
        program_id: "fib_input".to_string(),
        public_inputs: 10u32.to_le_bytes().to_vec(),
    }
}

pub fn task(id: &str) -> Task {
    Task::new(
        id.to_string(),
        "fib_input".to_string(),
        10u32.to_le_bytes().to_vec(),
        "node-1".to_string(),
    )
}
