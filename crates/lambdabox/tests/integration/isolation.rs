use std::time::{Duration, Instant};

use lambdabox::{FailureKind, Runner};
use serde_json::json;

use super::{empty_event, fixture_handler, process_gone, run_fixture, test_config};

#[tokio::test]
async fn test_busy_loop_times_out() {
    let started = Instant::now();
    let result = run_fixture("busy_loop.py", empty_event(), 1.0).await;

    assert_eq!(
        result.to_json(),
        json!({"status": "error", "error": "Execution Timed Out (Limit Exceeded)"})
    );
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_timeout_kills_spawned_children() {
    let scratch = tempfile::tempdir().unwrap();
    let pid_file = scratch.path().join("child.pid");

    let started = Instant::now();
    let result = run_fixture(
        "fork_bomb_sleeper.py",
        json!({"pid_file": pid_file.to_string_lossy()}),
        1.0,
    )
    .await;

    assert_eq!(result.failure_kind(), Some(FailureKind::Timeout));
    assert!(started.elapsed() < Duration::from_secs(3));

    let pid: u32 = std::fs::read_to_string(&pid_file)
        .expect("handler did not record its child")
        .trim()
        .parse()
        .unwrap();
    assert!(process_gone(pid).await, "child {pid} outlived the invocation");
}

#[tokio::test]
async fn test_state_does_not_leak_between_invocations() {
    let root = tempfile::tempdir().unwrap();
    let runner = Runner::new(test_config(root.path()));
    let code = fixture_handler("counter.py");

    for _ in 0..3 {
        let result = runner
            .execute_with_timeout(&code, empty_event(), 3.0)
            .await
            .unwrap();
        assert_eq!(result.to_json()["result"], json!({"count": 1, "leaked": 0}));
    }
}

#[tokio::test]
async fn test_timeout_does_not_affect_next_invocation() {
    let root = tempfile::tempdir().unwrap();
    let runner = Runner::new(test_config(root.path()));

    let hung = runner
        .execute_with_timeout(&fixture_handler("busy_loop.py"), empty_event(), 0.5)
        .await
        .unwrap();
    assert_eq!(hung.failure_kind(), Some(FailureKind::Timeout));

    let next = runner
        .execute_with_timeout(&fixture_handler("add.py"), json!({"a": 1, "b": 1}), 3.0)
        .await
        .unwrap();
    assert_eq!(next.to_json()["result"], 2);
}

#[tokio::test]
async fn test_concurrent_invocations_get_their_own_results() {
    let root = tempfile::tempdir().unwrap();
    let runner = Runner::new(test_config(root.path()));
    let code = fixture_handler("add.py");

    let results = run_concurrently(&runner, &code).await;
    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(result.to_json()["result"], json!(i * 2));
    }
    assert!(std::fs::read_dir(root.path()).unwrap().next().is_none());
}

async fn run_concurrently(runner: &Runner, code: &str) -> Vec<lambdabox::InvocationResult> {
    let mut tasks = Vec::new();
    for i in 0..6 {
        let runner = runner.clone();
        let code = code.to_string();
        tasks.push(tokio::spawn(async move {
            runner
                .execute_with_timeout(&code, json!({"a": i, "b": i}), 5.0)
                .await
                .unwrap()
        }));
    }

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap());
    }
    results
}

#[tokio::test]
async fn test_working_directory_starts_empty() {
    let root = tempfile::tempdir().unwrap();
    let runner = Runner::new(test_config(root.path()));
    let code = "import os\n\ndef handler(event, context):\n    return os.listdir('.')\n";

    let result = runner
        .execute_with_timeout(code, empty_event(), 3.0)
        .await
        .unwrap();
    assert_eq!(result.to_json()["result"], json!([]));
}

#[tokio::test]
async fn test_conflicting_top_level_names_run_independently() {
    let root = tempfile::tempdir().unwrap();
    let runner = Runner::new(test_config(root.path()));
    let first = "NAME = 'first'\n\ndef handler(event, context):\n    return NAME\n";
    let second = "NAME = 'second'\n\ndef handler(event, context):\n    return NAME\n";

    let (a, b) = tokio::join!(
        runner.execute_with_timeout(first, empty_event(), 3.0),
        runner.execute_with_timeout(second, empty_event(), 3.0),
    );
    assert_eq!(a.unwrap().to_json()["result"], "first");
    assert_eq!(b.unwrap().to_json()["result"], "second");
}
