use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

/// Error detail reported when an invocation exceeds its deadline
pub const TIMEOUT_MESSAGE: &str = "Execution Timed Out (Limit Exceeded)";

/// Error detail reported when a worker exits without leaving a result
pub const CRASH_MESSAGE: &str = "Process crashed unexpectedly";

/// Errors raised while validating an invocation request
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error("No code provided")]
    EmptyCode,

    #[error("timeout must be a positive number of seconds, got {0}")]
    InvalidTimeout(f64),

    #[error("timeout of {requested}s exceeds the maximum of {max}s")]
    TimeoutTooLarge { requested: f64, max: f64 },
}

/// A request to run one handler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationRequest {
    /// Source text defining `handler(event, context)`
    pub code: String,

    /// Input event, passed through to the handler verbatim
    #[serde(default = "empty_event")]
    pub event: Value,

    /// Wall clock budget in seconds
    #[serde(rename = "timeout")]
    pub timeout_seconds: f64,
}

impl InvocationRequest {
    pub fn new(code: impl Into<String>, event: Value, timeout_seconds: f64) -> Self {
        Self {
            code: code.into(),
            event,
            timeout_seconds,
        }
    }

    /// Check the request and return its deadline
    ///
    /// `max_timeout` is the largest budget the service accepts, in seconds.
    pub fn validate(&self, max_timeout: f64) -> Result<Duration, RequestError> {
        if self.code.is_empty() {
            return Err(RequestError::EmptyCode);
        }
        let deadline = timeout_duration(self.timeout_seconds)?;
        if self.timeout_seconds > max_timeout {
            return Err(RequestError::TimeoutTooLarge {
                requested: self.timeout_seconds,
                max: max_timeout,
            });
        }
        Ok(deadline)
    }
}

/// Convert a timeout in seconds into a [`Duration`], rejecting zero,
/// negative, and non-finite values
pub fn timeout_duration(seconds: f64) -> Result<Duration, RequestError> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(RequestError::InvalidTimeout(seconds));
    }
    Duration::try_from_secs_f64(seconds).map_err(|_| RequestError::InvalidTimeout(seconds))
}

pub(crate) fn empty_event() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Synthetic runtime metadata handed to the handler
///
/// Serialized with the field names a cloud function runtime would use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationContext {
    /// Memory limit reported to the handler in megabytes (informational only)
    pub memory_limit_mb: u32,

    /// Identifier unique to this invocation
    #[serde(rename = "aws_request_id")]
    pub request_id: String,
}

impl InvocationContext {
    /// Create a context with a freshly generated request ID
    pub fn generate(memory_limit_mb: u32) -> Self {
        Self {
            memory_limit_mb,
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// Classification of a failed invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The payload failed to compile or its top-level code raised
    Load,

    /// No callable `handler` was defined after loading
    HandlerMissing,

    /// The handler raised, or returned a value that cannot be encoded
    HandlerRuntime,

    /// The deadline elapsed and the worker was killed
    Timeout,

    /// The worker exited without leaving a result
    Crash,
}

impl FailureKind {
    /// Whether logs can be recovered for this kind of failure
    #[must_use]
    pub fn has_logs(&self) -> bool {
        !matches!(self, FailureKind::Timeout | FailureKind::Crash)
    }
}

/// A failed invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub kind: FailureKind,

    /// Diagnostic trace or message
    pub error: String,

    /// Output captured before the failure, if recoverable
    pub logs: Option<String>,
}

/// Outcome of exactly one invocation
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationResult {
    Success { value: Value, logs: String },
    Failure(Failure),
}

impl InvocationResult {
    /// Failure synthesized when the deadline elapses
    pub fn timed_out() -> Self {
        Self::Failure(Failure {
            kind: FailureKind::Timeout,
            error: TIMEOUT_MESSAGE.to_string(),
            logs: None,
        })
    }

    /// Failure synthesized when the worker leaves nothing behind
    pub fn crashed() -> Self {
        Self::Failure(Failure {
            kind: FailureKind::Crash,
            error: CRASH_MESSAGE.to_string(),
            logs: None,
        })
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, InvocationResult::Success { .. })
    }

    /// Failure kind, or `None` on success
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            InvocationResult::Success { .. } => None,
            InvocationResult::Failure(failure) => Some(failure.kind),
        }
    }

    /// Captured output, if any was recovered
    pub fn logs(&self) -> Option<&str> {
        match self {
            InvocationResult::Success { logs, .. } => Some(logs),
            InvocationResult::Failure(failure) => failure.logs.as_deref(),
        }
    }

    /// Render as the JSON record returned to callers
    pub fn to_json(&self) -> Value {
        // Serializing a borrowed view of owned JSON values cannot fail
        serde_json::to_value(self).unwrap_or_else(|_| empty_event())
    }
}

/// Wire shape of a result
#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum WireResult<'a> {
    Success {
        result: &'a Value,
        logs: &'a str,
    },
    Error {
        error: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        logs: Option<&'a str>,
    },
}

impl Serialize for InvocationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            InvocationResult::Success { value, logs } => WireResult::Success {
                result: value,
                logs,
            },
            InvocationResult::Failure(failure) => WireResult::Error {
                error: &failure.error,
                logs: failure.logs.as_deref(),
            },
        };
        wire.serialize(serializer)
    }
}
