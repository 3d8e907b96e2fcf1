#![cfg(unix)]

#[path = "common.rs"]
mod common;

use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tsbridge::{ClientError, Reply, TsClient};

/// Upper bound for anything that should settle "immediately".
const PROMPTLY: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_start_and_request() {
    let dir = tempfile::tempdir().unwrap();
    let client = TsClient::start(common::fake_config(dir.path())).await.unwrap();
    assert!(client.is_ready());

    let body = client.request("navtree", json!({"file": "/virtual/a.ts"})).await.unwrap();
    assert_eq!(body, json!({"command": "navtree", "seq": 1}));

    client.shutdown(Duration::from_secs(2)).await;
}

#[tokio::test]
async fn test_pipelined_requests_keep_their_replies() {
    let dir = tempfile::tempdir().unwrap();
    let client = TsClient::start(common::fake_config(dir.path())).await.unwrap();

    let (a, b, c) = tokio::join!(
        client.request("navtree", json!({})),
        client.request("completionInfo", json!({})),
        client.request("references", json!({})),
    );
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert_eq!(a["command"], "navtree");
    assert_eq!(b["command"], "completionInfo");
    assert_eq!(c["command"], "references");

    let mut seqs = vec![a["seq"].as_i64(), b["seq"].as_i64(), c["seq"].as_i64()];
    seqs.sort();
    seqs.dedup();
    assert_eq!(seqs.len(), 3);
    assert_eq!(client.pending_requests(), 0);

    client.shutdown(Duration::from_secs(2)).await;
}

#[tokio::test]
async fn test_fire_and_forget_and_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    let client = TsClient::start(common::fake_config(dir.path())).await.unwrap();
    let file = Path::new("/virtual/a.ts");

    let reply = client.send("open", json!({"file": file})).await.unwrap();
    assert!(matches!(reply, Reply::Sent { .. }));
    assert_eq!(client.pending_requests(), 0);

    let diagnostics = client.collect_diagnostics(&[file]).await.unwrap();
    let names: Vec<_> = diagnostics.iter().map(|event| event.name.as_str()).collect();
    assert_eq!(names, vec!["syntaxDiag", "semanticDiag"]);
    let first = &diagnostics[1].body.as_ref().unwrap()["diagnostics"][0];
    assert_eq!(first["code"], 2322);

    client.shutdown(Duration::from_secs(2)).await;
}

#[tokio::test]
async fn test_server_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let client = TsClient::start(common::fake_config(dir.path())).await.unwrap();

    let err = client.request("fail", json!({})).await.unwrap_err();
    assert_eq!(
        err,
        ClientError::Server {
            command: "fail".to_string(),
            message: "Simulated failure".to_string()
        }
    );

    client.shutdown(Duration::from_secs(2)).await;
}

#[tokio::test]
async fn test_unanswered_request_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let client = TsClient::start(common::fake_config(dir.path())).await.unwrap();

    let err = client
        .send_with_timeout("hang", json!({}), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Timeout { ref command, .. } if command == "hang"));
    assert_eq!(client.pending_requests(), 0);

    client.shutdown(Duration::from_secs(2)).await;
}

#[tokio::test]
async fn test_kill_fails_pending_without_waiting() {
    let dir = tempfile::tempdir().unwrap();
    let client = TsClient::start(common::fake_config(dir.path())).await.unwrap();

    let calls = async {
        tokio::join!(
            client.request("hang", json!({})),
            client.request("hang", json!({})),
            client.request("hang", json!({})),
        )
    };
    let killer = async {
        while client.pending_requests() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        client.kill().await;
    };

    let ((a, b, c), ()) =
        tokio::time::timeout(PROMPTLY, async { tokio::join!(calls, killer) }).await.unwrap();
    for outcome in [a, b, c] {
        assert_eq!(outcome, Err(ClientError::ProcessExited));
    }
    assert!(matches!(
        client.request("navtree", json!({})).await,
        Err(ClientError::StreamUnwritable { .. })
    ));
}

#[tokio::test]
async fn test_process_exit_fails_pending() {
    let dir = tempfile::tempdir().unwrap();
    let client = TsClient::start(common::fake_config(dir.path())).await.unwrap();

    let outcome = tokio::time::timeout(PROMPTLY, client.request("crash", json!({}))).await.unwrap();
    assert_eq!(outcome, Err(ClientError::ProcessExited));
}

#[tokio::test]
async fn test_missing_readiness_event_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::fake_config(dir.path())
        .with_args(["silent"])
        .with_startup_timeout(Duration::from_millis(200));

    let client = TsClient::spawn(config).await.unwrap();
    assert_eq!(client.request("navtree", json!({})).await, Err(ClientError::NotReady));
    assert!(matches!(client.wait_ready().await, Err(ClientError::StartupTimeout { .. })));
    client.kill().await;
}

#[tokio::test]
async fn test_graceful_shutdown_closes_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let client = TsClient::start(common::fake_config(dir.path())).await.unwrap();

    tokio::time::timeout(PROMPTLY, client.shutdown(Duration::from_secs(2))).await.unwrap();
    assert!(matches!(
        client.request("navtree", json!({})).await,
        Err(ClientError::StreamUnwritable { .. })
    ));
}

#[tokio::test]
async fn test_spawn_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::fake_config(dir.path()).with_node("tsbridge-no-such-interpreter");
    let err = TsClient::start(config).await.err().unwrap();
    let ClientError::Spawn { reason } = err else {
        panic!("expected a spawn failure, got {err:?}");
    };
    assert!(reason.contains("not found on PATH"));
}
