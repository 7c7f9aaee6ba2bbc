//! Worker process handle
//!
//! Spawns one worker in its own process group, feeds it the request, and
//! reaps or kills it.

use std::process::ExitStatus;
use std::time::Duration;

use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::worker::WorkerError;
use crate::worker::command::WorkerCommand;

/// Most stderr bytes kept for diagnostics
const STDERR_LIMIT: usize = 64 * 1024;

/// Process handle for one worker
#[derive(Debug)]
pub struct WorkerProcess {
    child: Child,
    /// Process ID, which is also the process group ID
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<Vec<u8>>>,
    /// Whether the process has been waited on
    reaped: bool,
    /// Whether the process group has already been sent SIGKILL
    group_killed: bool,
}

impl WorkerProcess {
    /// Spawn a new worker process
    #[instrument(skip(command))]
    pub fn spawn(command: WorkerCommand) -> Result<Self, WorkerError> {
        let mut command = command.into_command()?;
        let mut child = command.spawn().map_err(WorkerError::SpawnFailed)?;

        let pid = child.id();
        let stdin = child.stdin.take();
        let stderr = child.stderr.take().map(|s| tokio::spawn(collect_stderr(s)));

        debug!(pid, "spawned worker process");

        Ok(Self {
            child,
            pid,
            stdin,
            stderr,
            reaped: false,
            group_killed: false,
        })
    }

    /// Get the process ID
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Write the request to stdin and close it
    pub async fn send(&mut self, payload: &[u8]) -> Result<(), WorkerError> {
        let mut stdin = self.stdin.take().ok_or(WorkerError::StdinClosed)?;
        stdin.write_all(payload).await?;
        stdin.shutdown().await?;
        Ok(())
    }

    /// Wait for the process to exit
    pub async fn wait(&mut self) -> Result<ExitStatus, WorkerError> {
        let status = self.child.wait().await?;
        self.reaped = true;
        Ok(status)
    }

    /// Check whether the process has exited, without blocking
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>, WorkerError> {
        let status = self.child.try_wait()?;
        if status.is_some() {
            self.reaped = true;
        }
        Ok(status)
    }

    /// Kill the whole process group and reap the worker
    #[instrument(skip(self), fields(pid = self.pid))]
    pub async fn terminate(&mut self) -> Result<ExitStatus, WorkerError> {
        match self.signal_group(Signal::SIGKILL) {
            Ok(()) => self.group_killed = true,
            Err(e) => {
                warn!(error = %e, "failed to kill worker process group, killing leader only");
                self.child.start_kill()?;
            }
        }
        let status = self.wait().await?;
        debug!(?status, "worker terminated");
        Ok(status)
    }

    /// Kill anything the worker left running in its process group
    ///
    /// Call once, right after the leader is reaped. The group id stays
    /// reserved only while some member is alive; once the group is empty the
    /// kernel may hand the same id to a new group leader, such as another
    /// worker. Does nothing if [`terminate`](Self::terminate) already killed
    /// the group while the leader was still unreaped.
    ///
    /// Returns whether a signal was sent.
    pub fn sweep(&mut self) -> bool {
        if self.group_killed {
            return false;
        }
        self.group_killed = true;
        if let Err(e) = self.signal_group(Signal::SIGKILL) {
            warn!(pid = self.pid, error = %e, "failed to sweep worker process group");
        }
        true
    }

    /// Collect what the worker wrote to stderr
    ///
    /// Waits at most `grace` for the stream to close. Only meaningful once the
    /// process group is gone.
    pub async fn stderr_output(&mut self, grace: Duration) -> Vec<u8> {
        let Some(handle) = self.stderr.take() else {
            return Vec::new();
        };
        let abort = handle.abort_handle();
        match tokio::time::timeout(grace, handle).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                debug!(error = %e, "stderr collector failed");
                Vec::new()
            }
            Err(_) => {
                abort.abort();
                debug!("stderr still open after grace period");
                Vec::new()
            }
        }
    }

    fn signal_group(&self, signal: Signal) -> Result<(), WorkerError> {
        let Some(pid) = self.pid else {
            return Ok(());
        };
        let pgid = Pid::from_raw(i32::try_from(pid).map_err(|_| {
            WorkerError::Signal(nix::errno::Errno::EINVAL)
        })?);
        match killpg(pgid, signal) {
            // ESRCH means the group is already gone
            Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(WorkerError::Signal(e)),
        }
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        if let Some(handle) = self.stderr.take() {
            handle.abort();
        }
        if !self.reaped {
            warn!(
                pid = self.pid,
                "worker dropped while running, killing its process group"
            );
            let _ = self.signal_group(Signal::SIGKILL);
        }
    }
}

async fn collect_stderr(mut stderr: ChildStderr) -> Vec<u8> {
    let mut kept = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match stderr.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = STDERR_LIMIT.saturating_sub(kept.len());
                kept.extend_from_slice(&buf[..n.min(room)]);
            }
        }
    }
    kept
}
