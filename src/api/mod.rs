//! Job source boundary.
//!
//! The pipeline consumes three logical operations from the remote job
//! service: fetch already-assigned tasks, request one new task, and submit a
//! proof. Failures carry a typed kind so callers never inspect error text.

pub mod http;

use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::task::Task;

pub use http::HttpJobSource;

/// A task as described by the job source, before it is stamped with the
/// originating node and a creation timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TaskSpec {
    pub task_id: String,
    pub program_id: String,
    pub public_inputs: Vec<u8>,
}

#[derive(Error, Debug)]
pub enum SourceError {
    /// The source asked us to back off. Aborts the current batch; the fetch
    /// cadence timer handles the wait.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// No task available, or the task is unknown upstream. Normal condition
    /// on fetch; permanent drop on submit.
    #[error("not found: {0}")]
    NotFound(String),

    /// Connection-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("source error: {0}")]
    Other(String),
}

impl SourceError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SourceError::RateLimited(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceError::NotFound(_))
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        SourceError::Transport(e.to_string())
    }
}

/// The remote job service, reduced to the operations the pipeline needs.
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Tasks already assigned to this node. An empty vec is a normal
    /// "nothing waiting" outcome, not an error.
    async fn fetch_existing(&self, node_id: &str) -> Result<Vec<TaskSpec>, SourceError>;

    /// Request one new unit of work. `NotFound` means none available.
    async fn fetch_new(&self, node_id: &str, identity: &Identity)
        -> Result<TaskSpec, SourceError>;

    /// Submit a computed proof, signed by `identity`.
    async fn submit(&self, task: &Task, proof: &[u8], identity: &Identity)
        -> Result<(), SourceError>;
}

/// Ephemeral submission identity, generated once per process.
pub struct Identity {
    signing: SigningKey,
}

/// What accompanies a proof on the wire: the hash that was signed, the
/// signature over `task_id + proof_hash`, and the public half of the key.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SubmissionSignature {
    pub proof_hash: String,
    pub signature: String,
    pub public_key: String,
}

impl Identity {
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing.verifying_key().as_bytes())
    }

    pub fn sign_submission(&self, task_id: &str, proof: &[u8]) -> SubmissionSignature {
        let proof_hash = hex::encode(Sha256::digest(proof));
        let payload = format!("{}{}", task_id, proof_hash);
        let signature = self.signing.sign(payload.as_bytes());
        SubmissionSignature {
            proof_hash,
            signature: hex::encode(signature.to_bytes()),
            public_key: self.public_key_hex(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Verifier, VerifyingKey};

    #[test]
    fn submission_signature_verifies() {
        let identity = Identity::generate();
        let sig = identity.sign_submission("task-1", b"proof-bytes");

        let key_bytes: [u8; 32] = hex::decode(&sig.public_key).unwrap().try_into().unwrap();
        let key = VerifyingKey::from_bytes(&key_bytes).unwrap();
        let sig_bytes: [u8; 64] = hex::decode(&sig.signature).unwrap().try_into().unwrap();
        let signature = ed25519_dalek::Signature::from_bytes(&sig_bytes);

        let payload = format!("task-1{}", sig.proof_hash);
        assert!(key.verify(payload.as_bytes(), &signature).is_ok());
    }

    #[test]
    fn proof_hash_is_sha256_of_proof() {
        let identity = Identity::generate();
        let sig = identity.sign_submission("t", b"abc");
        assert_eq!(
            sig.proof_hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
