//! A library for running untrusted handler functions in isolated workers.
//!
//! Lambdabox accepts a snippet of Python source that defines
//! `handler(event, context)`, runs it in a fresh interpreter process with a
//! wall-clock deadline, and reports exactly one structured result: the
//! handler's return value with its captured output, or a classified failure.
//!
//! # Features
//!
//! - **Process isolation** — One interpreter process per invocation, in its own process group and scratch directory.
//! - **Deadlines** — Hung or runaway payloads are killed, together with anything they forked.
//! - **Crash detection** — A worker that dies without reporting is still answered.
//! - **HTTP service** — `POST /invoke` in front of a concurrency-limited runner.
//! - **Layered configuration** — Built-in defaults, TOML file, and `LAMBDABOX_*` environment variables.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG};
pub use runner::{Outcome, Runner, RunnerError};
pub use server::{ServerError, serve, serve_listener};
pub use types::{
    CRASH_MESSAGE, Failure, FailureKind, InvocationContext, InvocationRequest, InvocationResult,
    RequestError, TIMEOUT_MESSAGE,
};
pub use worker::WorkerError;

pub mod config;
pub mod runner;
pub mod server;
pub mod types;
pub mod worker;
