//! Request routing and the invoke endpoint

use hyper::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info};

use crate::runner::{Runner, RunnerError};
use crate::types::{InvocationRequest, empty_event};

/// Path of the invoke endpoint
pub const INVOKE_PATH: &str = "/invoke";

/// Where a request goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Invoke,
    MethodNotAllowed,
    NotFound,
}

impl Route {
    pub fn resolve(method: &Method, path: &str) -> Self {
        match (method, path) {
            (&Method::POST, INVOKE_PATH) => Route::Invoke,
            (_, INVOKE_PATH) => Route::MethodNotAllowed,
            _ => Route::NotFound,
        }
    }
}

/// Status and JSON body of a response
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Value,
}

impl Reply {
    pub fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }

    pub fn not_found() -> Self {
        Self::error(StatusCode::NOT_FOUND, "not found")
    }

    pub fn method_not_allowed() -> Self {
        Self::error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
    }
}

/// Body accepted by the invoke endpoint
#[derive(Debug, Deserialize)]
struct InvokeBody {
    #[serde(default)]
    code: Option<String>,

    #[serde(default = "empty_event")]
    event: Value,

    /// Seconds; the configured default applies when absent
    #[serde(default)]
    timeout: Option<f64>,
}

/// Handle a POST to the invoke endpoint
pub async fn invoke(runner: &Runner, body: &[u8]) -> Reply {
    let body: InvokeBody = match serde_json::from_slice(body) {
        Ok(body) => body,
        Err(e) => {
            return Reply::error(StatusCode::BAD_REQUEST, format!("invalid request body: {e}"));
        }
    };

    let request = InvocationRequest::new(
        body.code.unwrap_or_default(),
        body.event,
        body.timeout.unwrap_or(runner.config().default_timeout),
    );

    match runner.invoke(&request).await {
        Ok(result) => {
            info!(
                success = result.is_success(),
                kind = ?result.failure_kind(),
                "invoke completed"
            );
            Reply::ok(result.to_json())
        }
        Err(RunnerError::Request(e)) => Reply::error(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => {
            error!(error = %e, "invoke failed");
            Reply::error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
