//! Command builder for worker processes
//!
//! Expands the configured interpreter command and prepares the process
//! environment for one worker.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::config::{DEFAULT_WORKER_PATH, HARNESS_PLACEHOLDER, RESULT_PLACEHOLDER};
use crate::worker::WorkerError;

/// Builder for a worker process command line
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    /// Command template with placeholders
    template: Vec<String>,
    /// Script substituted for {harness}
    harness: String,
    /// Host path substituted for {result}
    result_path: PathBuf,
    /// PATH for the worker
    path: String,
    env: HashMap<String, String>,
    working_dir: Option<PathBuf>,
}

impl WorkerCommand {
    /// Create a new builder from a command template
    pub fn new(template: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            template: template.into_iter().map(Into::into).collect(),
            harness: crate::worker::HARNESS.to_owned(),
            result_path: PathBuf::new(),
            path: DEFAULT_WORKER_PATH.to_owned(),
            env: HashMap::new(),
            working_dir: None,
        }
    }

    /// Replace the script substituted for {harness}
    #[cfg(test)]
    fn harness(mut self, harness: impl Into<String>) -> Self {
        self.harness = harness.into();
        self
    }

    /// Set the path the worker writes its result record to
    pub fn result_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.result_path = path.into();
        self
    }

    /// Set the PATH environment variable
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set multiple environment variables
    pub fn envs<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set the working directory
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Build the expanded argument vector
    pub fn build(&self) -> Vec<String> {
        let result = self.result_path.to_string_lossy();
        self.template
            .iter()
            .map(|arg| {
                arg.replace(RESULT_PLACEHOLDER, &result)
                    .replace(HARNESS_PLACEHOLDER, &self.harness)
            })
            .collect()
    }

    /// Build a [`Command`] ready to spawn
    ///
    /// The environment is cleared except for PATH and the configured
    /// variables. The child runs in its own process group so the whole group
    /// can be killed on timeout. stdout is discarded, stdin and stderr are
    /// piped.
    pub fn into_command(self) -> Result<Command, WorkerError> {
        let mut args = self.build();
        resolve_program(&mut args, &self.path)?;

        let (program, rest) = args.split_first().ok_or(WorkerError::EmptyCommand)?;

        let mut command = Command::new(program);
        command
            .args(rest)
            .env_clear()
            .env("PATH", &self.path)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        #[cfg(unix)]
        command.process_group(0);

        Ok(command)
    }
}

/// Resolve the program in a command to an absolute path using `search_path`.
///
/// The worker environment is cleared, so the program is looked up in the
/// worker's PATH rather than the service's. Commands that already contain a
/// `/` (like `./python` or `/usr/bin/python3`) are left unchanged.
pub fn resolve_program(command: &mut [String], search_path: &str) -> Result<(), WorkerError> {
    let first = match command.first_mut() {
        Some(first) => first,
        None => return Err(WorkerError::EmptyCommand),
    };

    // Already an absolute or relative path
    if first.contains('/') {
        return Ok(());
    }

    for dir in search_path.split(':').filter(|dir| !dir.is_empty()) {
        let candidate = Path::new(dir).join(&*first);
        if candidate.is_file() {
            *first = candidate.to_string_lossy().into_owned();
            return Ok(());
        }
    }

    Err(WorkerError::ProgramNotFound {
        program: first.clone(),
        path: search_path.to_owned(),
    })
}
