//! Process-isolated proof execution.
//!
//! Each proof runs in a fresh subprocess so the operating system reclaims
//! all memory at exit and a crashing computation cannot corrupt this
//! process. The parent and child exchange a request/response file pair in a
//! per-task temporary directory, preferably on a memory-backed filesystem.
//!
//! Consecutive subprocess failures count against a restart budget; once the
//! budget is exhausted the prover refuses further work until the process is
//! restarted. A single clean run forgives prior failures.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;

use crate::prover::ProofEngine;
use crate::task::Task;

const MIN_MEMFS_BYTES: u64 = 3 * 1024 * 1024 * 1024;
const REQUEST_FILE: &str = "request.json";
const RESPONSE_FILE: &str = "response.json";

#[derive(Error, Debug)]
pub enum IsolationError {
    /// The restart budget is exhausted; no subprocess was spawned.
    #[error("restart budget exhausted ({0} consecutive failures)")]
    RestartBudget(u32),

    #[error("subprocess timed out after {0:?}")]
    Timeout(Duration),

    #[error("subprocess failed (exit {exit:?}): {stderr}")]
    ProcessFailed {
        exit: Option<i32>,
        stderr: String,
    },

    /// The subprocess exited cleanly but reported a compute failure.
    #[error("proof failed: {0}")]
    ProofFailed(String),

    #[error("bad response file: {0}")]
    BadResponse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Request file written by the parent, read by the subprocess.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProveRequest {
    pub task_id: String,
    pub program_id: String,
    pub public_inputs: Vec<u8>,
    pub node_id: String,
}

/// Response file written by the subprocess, read by the parent after exit.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProveResponse {
    pub task_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Verify a directory is actually writable, not just labelled writable.
fn is_writable(dir: &Path) -> bool {
    let probe = dir.join(".writable_probe");
    match std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(&probe)
    {
        Ok(_) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}

fn available_bytes(path: &Path) -> Option<u64> {
    let stat = nix::sys::statvfs::statvfs(path).ok()?;
    Some(stat.blocks_available() as u64 * stat.fragment_size() as u64)
}

/// Locate a writable memory-backed mount for staging.
///
/// Scans /proc/mounts for tmpfs/ramfs mounts that pass a real write probe,
/// preferring /dev/shm when it has at least 3 GiB free, otherwise the
/// candidate with the most free space. Falls back to /dev/shm and /tmp when
/// the scan yields nothing.
pub fn find_memory_fs() -> Option<PathBuf> {
    let mut candidates: Vec<(PathBuf, u64)> = Vec::new();

    if let Ok(mounts) = std::fs::read_to_string("/proc/mounts") {
        for line in mounts.lines() {
            let mut fields = line.split_whitespace();
            let _device = fields.next();
            let (Some(mount_point), Some(fs_type)) = (fields.next(), fields.next()) else {
                continue;
            };
            if fs_type != "tmpfs" && fs_type != "ramfs" {
                continue;
            }
            let path = PathBuf::from(mount_point);
            if !is_writable(&path) {
                continue;
            }
            if let Some(avail) = available_bytes(&path) {
                candidates.push((path, avail));
            }
        }
    }

    if candidates.is_empty() {
        for fallback in ["/dev/shm", "/tmp"] {
            let path = PathBuf::from(fallback);
            if is_writable(&path) {
                if let Some(avail) = available_bytes(&path) {
                    candidates.push((path, avail));
                }
            }
        }
    }

    if let Some((path, _)) = candidates
        .iter()
        .find(|(path, avail)| path == Path::new("/dev/shm") && *avail >= MIN_MEMFS_BYTES)
    {
        return Some(path.clone());
    }

    candidates
        .into_iter()
        .filter(|(_, avail)| *avail > 0)
        .max_by_key(|(_, avail)| *avail)
        .map(|(path, _)| path)
}

/// Copy the worker executable into `dir` (created if needed) unless an
/// executable copy is already present. Returns the staged path.
pub fn stage_executable(exec_path: &Path, dir: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let name = exec_path.file_name().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "executable has no file name")
    })?;
    let staged = dir.join(name);

    if let Ok(meta) = staged.metadata() {
        if meta.is_file() && meta.permissions().mode() & 0o111 != 0 {
            return Ok(staged);
        }
    }

    std::fs::copy(exec_path, &staged)?;
    std::fs::set_permissions(&staged, std::fs::Permissions::from_mode(0o755))?;
    Ok(staged)
}

/// Runs proofs in disposable subprocesses with a restart budget.
pub struct IsolatedProver {
    exec: PathBuf,
    work_dir: PathBuf,
    max_lifetime: Duration,
    max_restarts: u32,
    restart_count: Mutex<u32>,
}

impl IsolatedProver {
    /// Stage `exec_path` on a memory-backed filesystem when one is found;
    /// otherwise run it in place with temp dirs under the system default.
    pub fn new(exec_path: PathBuf, max_lifetime: Duration, max_restarts: u32) -> Self {
        let (exec, work_dir) = match find_memory_fs() {
            Some(memfs) => {
                let stage_dir = memfs.join("proverd");
                match stage_executable(&exec_path, &stage_dir) {
                    Ok(staged) => {
                        tracing::info!(staged = %staged.display(), "Worker executable staged on memory fs");
                        (staged, stage_dir)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to stage executable, running in place");
                        (exec_path, std::env::temp_dir())
                    }
                }
            }
            None => {
                tracing::warn!("No memory-backed filesystem found, using system temp dir");
                (exec_path, std::env::temp_dir())
            }
        };
        Self::with_paths(exec, work_dir, max_lifetime, max_restarts)
    }

    /// Construct against explicit paths, skipping discovery and staging.
    pub fn with_paths(
        exec: PathBuf,
        work_dir: PathBuf,
        max_lifetime: Duration,
        max_restarts: u32,
    ) -> Self {
        Self {
            exec,
            work_dir,
            max_lifetime,
            max_restarts,
            restart_count: Mutex::new(0),
        }
    }

    pub fn restart_count(&self) -> u32 {
        *self.restart_count.lock().expect("restart count lock poisoned")
    }

    fn note_failure(&self) {
        *self.restart_count.lock().expect("restart count lock poisoned") += 1;
    }

    /// Run one proof in a fresh subprocess.
    ///
    /// The per-task temporary directory is removed on every exit path; the
    /// subprocess is killed if it outlives `max_lifetime`.
    pub async fn prove(&self, task: &Task) -> Result<Vec<u8>, IsolationError> {
        {
            let count = self.restart_count.lock().expect("restart count lock poisoned");
            if *count >= self.max_restarts {
                return Err(IsolationError::RestartBudget(*count));
            }
        }

        let temp_dir = tempfile::Builder::new()
            .prefix("prover-")
            .tempdir_in(&self.work_dir)?;

        let request_path = temp_dir.path().join(REQUEST_FILE);
        let request = ProveRequest {
            task_id: task.task_id.clone(),
            program_id: task.program_id.clone(),
            public_inputs: task.public_inputs.clone(),
            node_id: task.node_id.clone(),
        };
        let request_data = serde_json::to_vec(&request)
            .map_err(|e| IsolationError::BadResponse(format!("serialize request: {}", e)))?;
        tokio::fs::write(&request_path, request_data).await?;

        let mut cmd = Command::new(&self.exec);
        cmd.arg("--prove")
            .arg("--request")
            .arg(&request_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.max_lifetime, cmd.output()).await {
            Err(_) => {
                self.note_failure();
                return Err(IsolationError::Timeout(self.max_lifetime));
            }
            Ok(Err(e)) => {
                self.note_failure();
                return Err(IsolationError::ProcessFailed {
                    exit: None,
                    stderr: e.to_string(),
                });
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            self.note_failure();
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(IsolationError::ProcessFailed {
                exit: output.status.code(),
                stderr: stderr.chars().take(512).collect(),
            });
        }

        let response_path = temp_dir.path().join(RESPONSE_FILE);
        let response_data = tokio::fs::read(&response_path).await?;
        let response: ProveResponse = serde_json::from_slice(&response_data)
            .map_err(|e| IsolationError::BadResponse(e.to_string()))?;

        if !response.success {
            return Err(IsolationError::ProofFailed(
                response.error.unwrap_or_else(|| "unspecified".into()),
            ));
        }
        let proof = response
            .proof
            .ok_or_else(|| IsolationError::BadResponse("success without proof".into()))?;

        *self.restart_count.lock().expect("restart count lock poisoned") = 0;
        Ok(proof)
    }
}

/// Subprocess side of the isolation contract: read the request file, run the
/// engine, write the response file next to it. Invoked by the `--prove`
/// compute-mode switch before anything else starts.
pub fn run_prove_mode(engine: &dyn ProofEngine, request_path: &Path) -> std::io::Result<()> {
    let request_data = std::fs::read(request_path)?;
    let request: ProveRequest = serde_json::from_slice(&request_data)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let response = match engine.prove(&request.program_id, &request.public_inputs) {
        Ok(proof) => ProveResponse {
            task_id: request.task_id,
            success: true,
            proof: Some(proof),
            error: None,
        },
        Err(e) => ProveResponse {
            task_id: request.task_id,
            success: false,
            proof: None,
            error: Some(e.to_string()),
        },
    };

    let response_dir = request_path.parent().unwrap_or_else(|| Path::new("."));
    let response_data = serde_json::to_vec(&response)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(response_dir.join(RESPONSE_FILE), response_data)?;
    Ok(())
}
