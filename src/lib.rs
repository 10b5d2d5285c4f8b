pub mod api;
pub mod config;
pub mod error;
pub mod isolation;
pub mod node;
pub mod prover;
pub mod queue;
pub mod shutdown;
pub mod stats;
pub mod task;
pub mod worker;
