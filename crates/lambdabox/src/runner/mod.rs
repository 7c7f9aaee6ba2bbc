//! Invocation runner for lambdabox
//!
//! Provides the high-level API for running handlers in isolated workers.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, instrument};

pub use crate::runner::supervisor::{Outcome, supervise};

mod supervisor;

use crate::config::Config;
use crate::types::{
    InvocationContext, InvocationRequest, InvocationResult, RequestError, timeout_duration,
};
use crate::worker::WorkerError;

/// Errors that prevent an invocation from producing a result
///
/// Payload failures are never reported here; they come back as
/// [`InvocationResult::Failure`].
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("invalid request: {0}")]
    Request(#[from] RequestError),

    #[error("failed to start worker: {0}")]
    Worker(#[from] WorkerError),

    #[error("runner is shut down")]
    Closed,
}

/// High-level runner for handler invocations
///
/// Cheap to clone; clones share the configuration and the concurrency limit.
#[derive(Debug, Clone)]
pub struct Runner {
    config: Arc<Config>,
    permits: Arc<Semaphore>,
}

impl Runner {
    /// Create a new runner with the given configuration
    pub fn new(config: Config) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrency));
        Self {
            config: Arc::new(config),
            permits,
        }
    }

    /// Create a new runner with default configuration
    pub fn with_defaults() -> Self {
        Self::new(Config::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of workers that could start right now
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `code` against `event` in a fresh worker, giving it at most
    /// `timeout_seconds` of wall clock time
    pub async fn execute_with_timeout(
        &self,
        code: &str,
        event: Value,
        timeout_seconds: f64,
    ) -> Result<InvocationResult, RunnerError> {
        let deadline = timeout_duration(timeout_seconds)?;
        self.execute(code, &event, deadline).await
    }

    /// Validate and run a request
    pub async fn invoke(
        &self,
        request: &InvocationRequest,
    ) -> Result<InvocationResult, RunnerError> {
        let deadline = request.validate(self.config.max_timeout)?;
        self.execute(&request.code, &request.event, deadline).await
    }

    #[instrument(skip(self, code, event))]
    async fn execute(
        &self,
        code: &str,
        event: &Value,
        deadline: Duration,
    ) -> Result<InvocationResult, RunnerError> {
        // Waiting for a slot does not count against the deadline
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| RunnerError::Closed)?;

        let context = InvocationContext::generate(self.config.memory_limit_mb);
        debug!(request_id = %context.request_id, "starting invocation");

        Ok(supervise(&self.config, code, event, &context, deadline).await?)
    }

    /// Stop accepting new invocations. Running ones finish normally.
    pub fn close(&self) {
        self.permits.close();
    }
}
