//! Isolated worker processes
//!
//! A worker is one interpreter process per invocation. It runs the embedded
//! harness, which loads the payload into a fresh namespace, calls its
//! `handler(event, context)` with stdout captured, and writes exactly one
//! record into the [`ResultChannel`] before exiting.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub use crate::worker::channel::{ResultChannel, decode_record};
pub use crate::worker::command::{WorkerCommand, resolve_program};
pub use crate::worker::process::WorkerProcess;
use crate::types::InvocationContext;

mod channel;
mod command;
mod process;

/// Script run by the interpreter inside every worker
pub const HARNESS: &str = include_str!("harness.py");

/// Errors that occur while creating or talking to a worker
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker command is empty")]
    EmptyCommand,

    #[error("program '{program}' not found in worker PATH ({path})")]
    ProgramNotFound { program: String, path: String },

    #[error("failed to spawn worker process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("result channel error: {0}")]
    Channel(#[source] std::io::Error),

    #[error("failed to encode worker request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("malformed worker result: {0}")]
    Decode(String),

    #[error("failed to signal worker process group: {0}")]
    Signal(#[source] nix::errno::Errno),

    #[error("worker stdin is closed")]
    StdinClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Request delivered to the harness on stdin
#[derive(Debug, Serialize)]
pub struct WorkerRequest<'a> {
    pub code: &'a str,
    pub event: &'a Value,
    pub context: &'a InvocationContext,
}

impl WorkerRequest<'_> {
    /// Encode as the JSON document the harness reads
    pub fn encode(&self) -> Result<Vec<u8>, WorkerError> {
        serde_json::to_vec(self).map_err(WorkerError::Encode)
    }
}
