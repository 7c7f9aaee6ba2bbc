use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../lambdabox.example.toml");

/// Prefix for environment variable overrides (e.g. `LAMBDABOX_SERVER__PORT`)
pub const ENV_PREFIX: &str = "LAMBDABOX";

/// Placeholder replaced by the harness source in the interpreter command
pub const HARNESS_PLACEHOLDER: &str = "{harness}";

/// Placeholder replaced by the result channel path in the interpreter command
pub const RESULT_PLACEHOLDER: &str = "{result}";

/// Default PATH inside a worker
pub const DEFAULT_WORKER_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for lambdabox
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Timeout in seconds applied when a request does not specify one
    #[serde(default = "default_timeout")]
    pub default_timeout: f64,

    /// Largest timeout in seconds a request may ask for
    #[serde(default = "default_max_timeout")]
    pub max_timeout: f64,

    /// Memory limit reported to handlers through their context.
    ///
    /// Informational only: nothing enforces it.
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: u32,

    /// Maximum number of workers running at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Directory under which per-invocation working directories are created.
    /// Uses the system temporary directory when unset.
    #[serde(default)]
    pub work_root: Option<PathBuf>,

    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerConfig,

    /// How workers are launched
    #[serde(default)]
    pub interpreter: InterpreterConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted request body in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Command used to start a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpreterConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {harness}, {result}
    #[serde(default = "default_interpreter_command")]
    pub command: Vec<String>,

    /// PATH environment variable for the worker
    ///
    /// Defaults to "/usr/local/bin:/usr/bin:/bin" if not specified.
    #[serde(default = "default_worker_path")]
    pub path: String,

    /// Extra environment variables for the worker. The worker environment is
    /// otherwise empty.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Config {
    /// Create a new config with the embedded defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Address the HTTP service listens on
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| {
                ConfigError::Invalid(format!(
                    "invalid listen address {}:{}: {e}",
                    self.server.host, self.server.port
                ))
            })
    }

    /// Directory under which per-invocation directories are created
    pub fn work_root(&self) -> PathBuf {
        self.work_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_timeout: default_timeout(),
            max_timeout: default_max_timeout(),
            memory_limit_mb: default_memory_limit_mb(),
            max_concurrency: default_max_concurrency(),
            work_root: None,
            server: ServerConfig::default(),
            interpreter: InterpreterConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            command: default_interpreter_command(),
            path: default_worker_path(),
            env: HashMap::new(),
        }
    }
}

fn default_timeout() -> f64 {
    3.0
}

fn default_max_timeout() -> f64 {
    900.0
}

fn default_memory_limit_mb() -> u32 {
    128
}

fn default_max_concurrency() -> usize {
    16
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

fn default_port() -> u16 {
    8080
}

fn default_max_body_bytes() -> usize {
    6 * 1024 * 1024
}

fn default_interpreter_command() -> Vec<String> {
    ["python3", "-I", "-c", HARNESS_PLACEHOLDER, RESULT_PLACEHOLDER]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

fn default_worker_path() -> String {
    DEFAULT_WORKER_PATH.to_owned()
}
