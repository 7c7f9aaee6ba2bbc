use lambdabox::{FailureKind, InvocationResult};
use serde_json::json;

use super::{empty_event, run_fixture};

#[tokio::test]
async fn test_add_returns_sum() {
    let result = run_fixture("add.py", json!({"a": 2, "b": 3}), 3.0).await;

    assert_eq!(
        result,
        InvocationResult::Success {
            value: json!(5),
            logs: String::new()
        }
    );
    assert_eq!(
        result.to_json(),
        json!({"status": "success", "result": 5, "logs": ""})
    );
}

#[tokio::test]
async fn test_echo_captures_print_output() {
    let event = json!({"nested": {"list": [1, "two", null]}});
    let result = run_fixture("echo.py", event.clone(), 3.0).await;

    assert!(result.is_success());
    let json = result.to_json();
    assert_eq!(json["result"]["echo"], event);
    assert_eq!(json["logs"], "received event\n");
}

#[tokio::test]
async fn test_context_fields() {
    let result = run_fixture("context.py", empty_event(), 3.0).await;

    let json = result.to_json();
    assert_eq!(json["result"]["memory_limit_mb"], 128);
    let request_id = json["result"]["aws_request_id"].as_str().unwrap();
    assert_eq!(request_id.len(), 36);
}

#[tokio::test]
async fn test_request_ids_differ_between_invocations() {
    let a = run_fixture("context.py", empty_event(), 3.0).await.to_json();
    let b = run_fixture("context.py", empty_event(), 3.0).await.to_json();

    assert_ne!(a["result"]["aws_request_id"], b["result"]["aws_request_id"]);
}

#[tokio::test]
async fn test_logs_keep_write_order() {
    let result = run_fixture("logs_order.py", empty_event(), 3.0).await;

    assert_eq!(
        result.to_json(),
        json!({"status": "success", "result": null, "logs": "line 0\nline 1\nline 2\n"})
    );
}

#[tokio::test]
async fn test_load_time_output_is_captured() {
    let result = run_fixture("top_level_print.py", empty_event(), 3.0).await;

    assert_eq!(result.logs(), Some("loading module\nin handler\n"));
    assert_eq!(result.to_json()["result"], "done");
}

#[tokio::test]
async fn test_missing_handler() {
    let result = run_fixture("no_handler.py", empty_event(), 3.0).await;

    assert_eq!(result.failure_kind(), Some(FailureKind::HandlerMissing));
    assert_eq!(
        result.to_json(),
        json!({
            "status": "error",
            "error": "Function 'handler(event, context)' not found.",
            "logs": ""
        })
    );
}

#[tokio::test]
async fn test_non_callable_handler_is_missing() {
    let root = tempfile::tempdir().unwrap();
    let runner = lambdabox::Runner::new(super::test_config(root.path()));
    let result = runner
        .execute_with_timeout("handler = 42", empty_event(), 3.0)
        .await
        .unwrap();

    assert_eq!(result.failure_kind(), Some(FailureKind::HandlerMissing));
}

#[tokio::test]
async fn test_lone_surrogates_are_replaced() {
    let result = run_fixture("lone_surrogate.py", empty_event(), 3.0).await;

    assert_eq!(
        result,
        InvocationResult::Success {
            value: json!("x\u{fffd}y"),
            logs: "\u{fffd}\n".to_string()
        }
    );
}

#[tokio::test]
async fn test_integers_beyond_64_bits_round_trip() {
    let event: serde_json::Value =
        serde_json::from_str(r#"{"n": -1180591620717411303424}"#).unwrap();
    let result = run_fixture("big_int.py", event, 3.0).await;

    assert!(result.is_success());
    assert_eq!(
        result.to_json()["result"].to_string(),
        r#"{"echo":-1180591620717411303424,"power":1180591620717411303424}"#
    );
}
