//! Integration tests for lambdabox
//!
//! These tests run real handlers and require a `python3` interpreter on the
//! worker PATH.
//! Run with: cargo test -p lambdabox --features integration-tests

#![cfg(feature = "integration-tests")]

use std::fs;

use lambdabox::config::Config;
use lambdabox::{InvocationResult, Runner};
use serde_json::{Value, json};

mod config_loading;
mod handlers;
mod http;
mod isolation;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Helper to get handler fixture source
pub(crate) fn fixture_handler(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/handlers/{name}");
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

/// Default configuration with invocation directories under `work_root`
pub(crate) fn test_config(work_root: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.work_root = Some(work_root.to_path_buf());
    config
}

/// Run a handler fixture once with its own runner
pub(crate) async fn run_fixture(name: &str, event: Value, timeout: f64) -> InvocationResult {
    let root = tempfile::tempdir().expect("Failed to create work root");
    let runner = Runner::new(test_config(root.path()));
    runner
        .execute_with_timeout(&fixture_handler(name), event, timeout)
        .await
        .expect("Invocation failed to start")
}

pub(crate) fn empty_event() -> Value {
    json!({})
}

/// Wait briefly for `pid` to disappear or become a zombie
pub(crate) async fn process_gone(pid: u32) -> bool {
    for _ in 0..40 {
        match fs::read_to_string(format!("/proc/{pid}/stat")) {
            Err(_) => return true,
            Ok(stat) => {
                // State follows the parenthesised command name
                let state = stat.rsplit_once(") ").and_then(|(_, rest)| rest.chars().next());
                if matches!(state, Some('Z' | 'X')) {
                    return true;
                }
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    false
}
