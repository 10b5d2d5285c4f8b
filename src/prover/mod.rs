//! The compute capability.
//!
//! The pipeline treats proof computation as an opaque function from a
//! program id and input payload to an artifact. [`LocalEngine`] is the
//! built-in stand-in: it evaluates two small demo programs and is what the
//! subprocess entry point runs. A real proving backend plugs in behind
//! [`ProofEngine`].

use thiserror::Error;

#[derive(Error, Debug)]
#[error("compute failed: {0}")]
pub struct ComputeError(pub String);

pub trait ProofEngine: Send + Sync {
    fn prove(&self, program_id: &str, public_inputs: &[u8]) -> Result<Vec<u8>, ComputeError>;
}

/// In-process demo engine for the `fib_input` and `fib_input_initial`
/// programs. Inputs and outputs are little-endian u32s.
pub struct LocalEngine;

impl ProofEngine for LocalEngine {
    fn prove(&self, program_id: &str, public_inputs: &[u8]) -> Result<Vec<u8>, ComputeError> {
        match program_id {
            "fib_input_initial" => {
                if public_inputs.len() < 12 {
                    return Err(ComputeError(format!(
                        "fib_input_initial needs 12 input bytes, got {}",
                        public_inputs.len()
                    )));
                }
                let n = u32::from_le_bytes(public_inputs[0..4].try_into().unwrap());
                let a = u32::from_le_bytes(public_inputs[4..8].try_into().unwrap());
                let b = u32::from_le_bytes(public_inputs[8..12].try_into().unwrap());
                Ok(fib_from(n, a, b).to_le_bytes().to_vec())
            }
            "fib_input" => {
                if public_inputs.len() < 4 {
                    return Err(ComputeError(format!(
                        "fib_input needs 4 input bytes, got {}",
                        public_inputs.len()
                    )));
                }
                let n = u32::from_le_bytes(public_inputs[0..4].try_into().unwrap());
                Ok(fib_from(n, 0, 1).to_le_bytes().to_vec())
            }
            other => Err(ComputeError(format!("unsupported program id: {}", other))),
        }
    }
}

fn fib_from(n: u32, init_a: u32, init_b: u32) -> u32 {
    match n {
        0 => init_a,
        1 => init_b,
        _ => {
            let (mut a, mut b) = (init_a, init_b);
            for _ in 2..=n {
                let next = a.wrapping_add(b);
                a = b;
                b = next;
            }
            b
        }
    }
}
