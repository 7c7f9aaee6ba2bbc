//! Timeout supervision for a single worker
//!
//! Spawns the worker, waits for it up to the deadline, and turns whatever
//! happened into exactly one [`InvocationResult`].

use std::process::ExitStatus;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::types::{InvocationContext, InvocationResult};
use crate::worker::{ResultChannel, WorkerCommand, WorkerError, WorkerProcess, WorkerRequest};

/// How long to wait for stderr to close after the worker is gone
const STDERR_GRACE: Duration = Duration::from_millis(200);

/// How a supervised worker ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Exited on its own and left a result
    Completed,
    /// Still alive at the deadline and killed
    TimedOut,
    /// Exited on its own without a usable result
    CrashedSilently,
}

/// Run one payload in a fresh worker and supervise it until it finishes or
/// the deadline elapses
///
/// Only failures to create the worker are returned as errors. Everything the
/// payload does, including hanging or crashing, becomes an
/// [`InvocationResult`].
#[instrument(skip(config, code, event), fields(request_id = %context.request_id))]
pub async fn supervise(
    config: &Config,
    code: &str,
    event: &Value,
    context: &InvocationContext,
    deadline: Duration,
) -> Result<InvocationResult, WorkerError> {
    let channel = ResultChannel::create(&config.work_root())?;
    let payload = WorkerRequest {
        code,
        event,
        context,
    }
    .encode()?;

    let command = WorkerCommand::new(config.interpreter.command.iter().cloned())
        .result_path(channel.result_path())
        .working_dir(channel.work_dir())
        .path(config.interpreter.path.as_str())
        .envs(
            config
                .interpreter
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

    let mut worker = WorkerProcess::spawn(command)?;
    let started = Instant::now();

    let exited = wait_within(&mut worker, &payload, deadline).await;

    // Anything the worker forked is killed on every path
    worker.sweep();

    // Drain exactly once, whatever happened
    let drained = channel.drain().await;

    let (outcome, result) = match (exited, drained) {
        (false, _) => (Outcome::TimedOut, InvocationResult::timed_out()),
        (true, Ok(Some(result))) => (Outcome::Completed, result),
        (true, Ok(None)) => {
            let stderr = worker.stderr_output(STDERR_GRACE).await;
            warn!(
                stderr = %String::from_utf8_lossy(&stderr),
                "worker exited without writing a result"
            );
            (Outcome::CrashedSilently, InvocationResult::crashed())
        }
        (true, Err(e)) => {
            let stderr = worker.stderr_output(STDERR_GRACE).await;
            warn!(
                error = %e,
                stderr = %String::from_utf8_lossy(&stderr),
                "worker left an unusable result"
            );
            (Outcome::CrashedSilently, InvocationResult::crashed())
        }
    };

    info!(
        ?outcome,
        kind = ?result.failure_kind(),
        elapsed = format_args!("{:.3}s", started.elapsed().as_secs_f64()),
        "invocation finished"
    );

    Ok(result)
}

/// Deliver the request and wait for the worker to exit, killing it if it is
/// still alive when the deadline elapses
///
/// Returns `true` if the worker exited on its own.
async fn wait_within(worker: &mut WorkerProcess, payload: &[u8], deadline: Duration) -> bool {
    match tokio::time::timeout(deadline, run_to_exit(worker, payload)).await {
        Ok(Ok(status)) => {
            debug!(?status, "worker exited");
            true
        }
        Ok(Err(e)) => {
            warn!(error = %e, "failed to wait for worker");
            reclaim(worker).await;
            true
        }
        // The worker may have exited right at the deadline; only kill it if
        // it is confirmed alive.
        Err(_) => match worker.try_wait() {
            Ok(Some(status)) => {
                debug!(?status, "worker exited at the deadline");
                true
            }
            Ok(None) => {
                debug!("deadline elapsed, killing worker");
                reclaim(worker).await;
                false
            }
            Err(e) => {
                warn!(error = %e, "failed to poll worker at the deadline");
                reclaim(worker).await;
                false
            }
        },
    }
}

async fn run_to_exit(worker: &mut WorkerProcess, payload: &[u8]) -> Result<ExitStatus, WorkerError> {
    if let Err(e) = worker.send(payload).await {
        // A worker that dies before reading its request ends up on the crash path
        debug!(error = %e, "failed to deliver request to worker");
    }
    worker.wait().await
}

async fn reclaim(worker: &mut WorkerProcess) {
    if let Err(e) = worker.terminate().await {
        warn!(pid = worker.id(), error = %e, "failed to terminate worker");
    }
}
