//! HTTP implementation of the job source.
//!
//! Status codes map to typed errors: 429 is a rate-limit signal, 404 means
//! no task (fetch) or task unknown (submit). Request and response bodies are
//! JSON records; proof bytes travel hex-encoded.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Identity, JobSource, SourceError, TaskSpec};
use crate::task::Task;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpJobSource {
    client: reqwest::Client,
    tasks_url: String,
    submit_url: String,
}

#[derive(Serialize)]
struct NewTaskRequest<'a> {
    node_id: &'a str,
    node_type: &'a str,
    public_key: String,
}

#[derive(Deserialize)]
struct ExistingTasksResponse {
    #[serde(default)]
    tasks: Vec<WireTask>,
}

#[derive(Serialize, Deserialize)]
struct WireTask {
    task_id: String,
    program_id: String,
    public_inputs: String,
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    task_id: &'a str,
    node_type: &'a str,
    proof: String,
    proof_hash: String,
    public_key: String,
    signature: String,
}

impl HttpJobSource {
    pub fn new(base_url: &str) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let base = base_url.trim_end_matches('/');
        Ok(Self {
            client,
            tasks_url: format!("{}/v3/tasks", base),
            submit_url: format!("{}/v3/tasks/submit", base),
        })
    }

    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, SourceError> {
        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let body = resp.text().await.unwrap_or_default();
            return Err(SourceError::RateLimited(body));
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            let body = resp.text().await.unwrap_or_default();
            return Err(SourceError::NotFound(body));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SourceError::Other(format!("{}: {}", status, body)));
        }
        Ok(resp)
    }
}

fn decode_wire_task(wire: WireTask) -> Result<TaskSpec, SourceError> {
    let public_inputs = hex::decode(&wire.public_inputs)
        .map_err(|e| SourceError::Other(format!("bad public_inputs encoding: {}", e)))?;
    Ok(TaskSpec {
        task_id: wire.task_id,
        program_id: wire.program_id,
        public_inputs,
    })
}

#[async_trait]
impl JobSource for HttpJobSource {
    async fn fetch_existing(&self, node_id: &str) -> Result<Vec<TaskSpec>, SourceError> {
        let resp = self
            .client
            .get(&self.tasks_url)
            .query(&[("node_id", node_id)])
            .send()
            .await?;
        let resp = match Self::check_status(resp).await {
            Ok(resp) => resp,
            // Nothing assigned is a normal outcome here.
            Err(SourceError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let body: ExistingTasksResponse = resp
            .json()
            .await
            .map_err(|e| SourceError::Other(format!("bad tasks response: {}", e)))?;
        body.tasks.into_iter().map(decode_wire_task).collect()
    }

    async fn fetch_new(
        &self,
        node_id: &str,
        identity: &Identity,
    ) -> Result<TaskSpec, SourceError> {
        let resp = self
            .client
            .post(&self.tasks_url)
            .json(&NewTaskRequest {
                node_id,
                node_type: "cli-prover",
                public_key: identity.public_key_hex(),
            })
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        let wire: WireTask = resp
            .json()
            .await
            .map_err(|e| SourceError::Other(format!("bad task response: {}", e)))?;
        decode_wire_task(wire)
    }

    async fn submit(
        &self,
        task: &Task,
        proof: &[u8],
        identity: &Identity,
    ) -> Result<(), SourceError> {
        let sig = identity.sign_submission(&task.task_id, proof);
        let resp = self
            .client
            .post(&self.submit_url)
            .json(&SubmitRequest {
                task_id: &task.task_id,
                node_type: "cli-prover",
                proof: hex::encode(proof),
                proof_hash: sig.proof_hash,
                public_key: sig.public_key,
                signature: sig.signature,
            })
            .send()
            .await?;
        Self::check_status(resp).await?;
        Ok(())
    }
}
