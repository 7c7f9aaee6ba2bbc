//! One-shot result channel between a worker and its supervisor
//!
//! The channel is a file inside a per-invocation temporary directory. The
//! worker writes its record once (temp file, then rename) as its last act; the
//! supervisor drains it once after the worker is gone. Dropping or draining
//! the channel removes the directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::types::{Failure, FailureKind, InvocationResult};
use crate::worker::WorkerError;

const RESULT_FILE: &str = "result.json";
const WORK_DIR: &str = "work";

/// Whether the harness reports success or failure
#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RecordStatus {
    Success,
    Error,
}

/// Record written by the harness
///
/// Kept flat rather than a tagged enum so `result` is read straight from the
/// input and large numbers survive untouched.
#[derive(Debug, Deserialize)]
struct WorkerRecord {
    status: RecordStatus,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    kind: Option<FailureKind>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    logs: String,
}

impl WorkerRecord {
    fn into_result(self) -> Result<InvocationResult, WorkerError> {
        let WorkerRecord {
            status,
            result,
            kind,
            error,
            logs,
        } = self;

        match status {
            RecordStatus::Success => Ok(InvocationResult::Success {
                value: result,
                logs,
            }),
            RecordStatus::Error => {
                let kind = kind.ok_or_else(|| {
                    WorkerError::Decode("error record without a kind".to_string())
                })?;
                let error = error.ok_or_else(|| {
                    WorkerError::Decode("error record without an error".to_string())
                })?;
                if !kind.has_logs() {
                    return Err(WorkerError::Decode(format!(
                        "worker reported supervisor-only failure kind {kind:?}"
                    )));
                }
                Ok(InvocationResult::Failure(Failure {
                    kind,
                    error,
                    logs: Some(logs),
                }))
            }
        }
    }
}

/// Decode the contents of a result file
///
/// Returns `Ok(None)` when the file is empty.
pub fn decode_record(content: &[u8]) -> Result<Option<InvocationResult>, WorkerError> {
    if content.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let record: WorkerRecord =
        serde_json::from_slice(content).map_err(|e| WorkerError::Decode(e.to_string()))?;
    record.into_result().map(Some)
}

/// Capacity-one, write-once result channel
#[derive(Debug)]
pub struct ResultChannel {
    dir: TempDir,
    result_path: PathBuf,
    work_dir: PathBuf,
}

impl ResultChannel {
    /// Create a channel backed by a fresh directory under `root`
    pub fn create(root: &Path) -> Result<Self, WorkerError> {
        let dir = tempfile::Builder::new()
            .prefix("lambdabox-")
            .tempdir_in(root)
            .map_err(WorkerError::Channel)?;

        let work_dir = dir.path().join(WORK_DIR);
        std::fs::create_dir(&work_dir).map_err(WorkerError::Channel)?;
        let result_path = dir.path().join(RESULT_FILE);

        debug!(dir = %dir.path().display(), "created result channel");

        Ok(Self {
            dir,
            result_path,
            work_dir,
        })
    }

    /// Path the worker writes its record to
    pub fn result_path(&self) -> &Path {
        &self.result_path
    }

    /// Fresh, empty working directory for the worker
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Take the record out of the channel and reclaim its directory
    ///
    /// Returns `Ok(None)` when the worker left nothing behind. Must only be
    /// called once the worker has exited or been killed.
    pub async fn drain(self) -> Result<Option<InvocationResult>, WorkerError> {
        let content = match tokio::fs::read(&self.result_path).await {
            Ok(content) => Some(content),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                self.close();
                return Err(WorkerError::Channel(e));
            }
        };

        self.close();

        match content {
            Some(content) => decode_record(&content),
            None => Ok(None),
        }
    }

    fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!(dir = %path.display(), error = %e, "failed to remove result channel directory");
        }
    }
}
