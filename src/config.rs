use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ProverError, Result};

/// Tasks fetched per node in one new-task batch.
pub const BATCH_SIZE: usize = 3;
/// Consecutive "no task available" responses before a batch gives up.
pub const MAX_404S_BEFORE_GIVING_UP: u32 = 5;
/// Fixed interval between fetch attempts per node, measured from the last
/// successful fetch.
pub const TASK_FETCH_INTERVAL: Duration = Duration::from_secs(180);
/// Throttle for per-node queue log lines.
pub const QUEUE_LOG_INTERVAL: Duration = Duration::from_secs(30);
/// Stats reporter tick.
pub const STATS_INTERVAL: Duration = Duration::from_secs(60);
/// Grace period for workers to drain during shutdown.
pub const DRAIN_GRACE: Duration = Duration::from_secs(180);
/// Maximum re-submission attempts for a failed proof.
pub const MAX_SUBMIT_RETRIES: u32 = 3;

/// Default orchestrator endpoint.
pub const DEFAULT_ORCHESTRATOR_URL: &str = "https://beta.orchestrator.nexus.xyz";

const DEFAULT_QUEUE_CAPACITY: usize = 1000;
const DEFAULT_RETRY_CAPACITY: usize = 100;

/// Runtime configuration, loaded from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Node IDs to fetch and submit tasks for.
    pub node_ids: Vec<String>,

    /// Delay between fetcher sweeps over all nodes, in seconds. May be 0.
    #[serde(default)]
    pub request_delay: u64,

    /// Number of compute workers in the pool.
    #[serde(default = "default_prover_workers")]
    pub prover_workers: usize,

    /// Pacing delay before submitting a freshly computed proof, in seconds.
    /// Only applies to in-process workers.
    #[serde(default = "default_submit_wait")]
    pub prover_submit_wait_second: u64,

    /// Capacity of the pending task queue.
    #[serde(default = "default_queue_capacity")]
    pub task_queue_capacity: usize,

    /// Capacity of the submission retry queue.
    #[serde(default = "default_retry_capacity")]
    pub retry_queue_capacity: usize,

    /// Subprocess lifetime ceiling in isolation mode, in seconds.
    #[serde(default = "default_max_lifetime")]
    pub max_lifetime: u64,

    /// Consecutive subprocess failures tolerated before refusing isolated work.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    /// Optional wait before the first fetch sweep, in seconds. Useful to
    /// space out restarts against upstream rate limiting.
    #[serde(default)]
    pub startup_delay: u64,

    /// Orchestrator base URL.
    #[serde(default = "default_orchestrator_url")]
    pub orchestrator_url: String,
}

fn default_orchestrator_url() -> String {
    DEFAULT_ORCHESTRATOR_URL.to_string()
}

fn default_prover_workers() -> usize {
    1
}

fn default_submit_wait() -> u64 {
    10
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_retry_capacity() -> usize {
    DEFAULT_RETRY_CAPACITY
}

fn default_max_lifetime() -> u64 {
    300
}

fn default_max_restarts() -> u32 {
    3
}

impl Config {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| ProverError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let cfg: Config = serde_json::from_str(&data)
            .map_err(|e| ProverError::Config(format!("cannot parse {}: {}", path.display(), e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_ids.is_empty() {
            return Err(ProverError::Config("node_ids must not be empty".into()));
        }
        if self.prover_workers == 0 {
            return Err(ProverError::Config("prover_workers must be >= 1".into()));
        }
        if self.task_queue_capacity == 0 {
            return Err(ProverError::Config(
                "task_queue_capacity must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Config {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = parse(r#"{"node_ids": ["n1"]}"#);
        assert_eq!(cfg.node_ids, vec!["n1"]);
        assert_eq!(cfg.request_delay, 0);
        assert_eq!(cfg.prover_workers, 1);
        assert_eq!(cfg.prover_submit_wait_second, 10);
        assert_eq!(cfg.task_queue_capacity, 1000);
        assert_eq!(cfg.retry_queue_capacity, 100);
        assert_eq!(cfg.max_lifetime, 300);
        assert_eq!(cfg.max_restarts, 3);
        assert_eq!(cfg.startup_delay, 0);
        assert_eq!(cfg.orchestrator_url, DEFAULT_ORCHESTRATOR_URL);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let cfg = parse(
            r#"{
                "node_ids": ["a", "b"],
                "request_delay": 5,
                "prover_workers": 4,
                "task_queue_capacity": 50
            }"#,
        );
        assert_eq!(cfg.node_ids.len(), 2);
        assert_eq!(cfg.request_delay, 5);
        assert_eq!(cfg.prover_workers, 4);
        assert_eq!(cfg.task_queue_capacity, 50);
    }

    #[test]
    fn empty_node_ids_rejected() {
        let cfg = parse(r#"{"node_ids": []}"#);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_workers_rejected() {
        let cfg = parse(r#"{"node_ids": ["n1"], "prover_workers": 0}"#);
        assert!(cfg.validate().is_err());
    }
}
