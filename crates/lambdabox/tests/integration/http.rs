use lambdabox::{Runner, serve_listener};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use super::{fixture_handler, test_config};

async fn post_invoke(addr: std::net::SocketAddr, body: &Value) -> (u16, Value) {
    let body = body.to_string();
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "POST /invoke HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    let status = response[9..12].parse().unwrap();
    let (_, payload) = response.split_once("\r\n\r\n").unwrap();
    (status, serde_json::from_str(payload).unwrap())
}

#[tokio::test]
async fn test_invoke_over_http() {
    let root = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(serve_listener(
        Runner::new(test_config(root.path())),
        listener,
        async {
            let _ = rx.await;
        },
    ));

    let (status, body) = post_invoke(
        addr,
        &json!({"code": fixture_handler("add.py"), "event": {"a": 20, "b": 22}}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"status": "success", "result": 42, "logs": ""}));

    let (status, body) = post_invoke(
        addr,
        &json!({"code": fixture_handler("busy_loop.py"), "timeout": 0.5}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(
        body,
        json!({"status": "error", "error": "Execution Timed Out (Limit Exceeded)"})
    );

    let (status, body) = post_invoke(addr, &json!({"event": {}})).await;
    assert_eq!(status, 400);
    assert_eq!(body, json!({"error": "No code provided"}));

    tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}
