//! Bridge behavior against the scripted mock editor: correlation, timeouts,
//! multiplexing, event ordering, and connection teardown.

use std::time::{Duration, Instant};

use serde_json::json;

use holt_core::{BufferId, Position};
use holt_paths::PathResolver;
use holt_rpc::mock::{MockEditor, MockReply};
use holt_rpc::{EditorClient, EditorClientConfig, EditorEvent, RpcError};

fn workspace() -> (tempfile::TempDir, PathResolver) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("main.py"), "print('hi')\n").unwrap();
    let resolver = PathResolver::new(dir.path()).unwrap();
    (dir, resolver)
}

fn connect(resolver: PathResolver) -> (EditorClient, MockEditor) {
    MockEditor::spawn(
        resolver,
        EditorClientConfig {
            call_timeout: Duration::from_millis(500),
            ..EditorClientConfig::default()
        },
    )
}

#[tokio::test]
async fn calls_are_correlated_with_their_responses() {
    let (_dir, resolver) = workspace();
    let (client, mock) = connect(resolver);

    mock.respond("lsp/hover", json!("a docstring"));

    let buffer = BufferId(1);
    let hover = client
        .lsp_hover(buffer, Position::new(3, 7))
        .await
        .unwrap();
    assert_eq!(hover.as_deref(), Some("a docstring"));

    let call = &mock.calls()[0];
    assert_eq!(call.method, "lsp/hover");
    assert_eq!(call.params["line"], 3);
    assert_eq!(call.params["column"], 7);
}

#[tokio::test]
async fn remote_rejections_pass_the_message_through() {
    let (_dir, resolver) = workspace();
    let (client, mock) = connect(resolver);

    mock.respond_error("debug/pause", "target is not running");

    let err = client
        .debug_pause(holt_core::RemoteSessionId(9))
        .await
        .unwrap_err();
    match err {
        RpcError::Remote(message) => assert_eq!(message, "target is not running"),
        other => panic!("expected Remote, got {other}"),
    }
}

#[tokio::test]
async fn a_slow_call_times_out_without_affecting_others() {
    let (_dir, resolver) = workspace();
    let (client, mock) = connect(resolver);

    mock.handle("workspace/search", |_| {
        MockReply::ok(json!([])).after(Duration::from_secs(5))
    });
    mock.respond("lsp/status", json!({ "clients": 1, "ready": true }));

    let slow = client.workspace_search("needle", 10);
    let fast = client.lsp_status(BufferId(1));
    let (slow, fast) = tokio::join!(slow, fast);

    assert!(matches!(slow.unwrap_err(), RpcError::RemoteTimeout { .. }));
    assert!(fast.unwrap().ready);
}

#[tokio::test]
async fn concurrent_callers_are_not_serialized_behind_a_slow_call() {
    let (_dir, resolver) = workspace();
    let (client, mock) = connect(resolver);

    mock.handle("analysis/imports", |_| {
        MockReply::ok(json!([])).after(Duration::from_millis(300))
    });
    mock.respond("lsp/status", json!({ "clients": 1, "ready": true }));

    let started = Instant::now();
    let slow = client.imports(BufferId(1));
    let fast = client.lsp_status(BufferId(2));

    let (slow, fast) = tokio::join!(slow, fast);
    slow.unwrap();
    fast.unwrap();

    // The fast reply arrived while the slow one was still pending, so the
    // total is bounded by the slow call, not the sum.
    assert!(started.elapsed() < Duration::from_millis(450));
}

#[tokio::test]
async fn events_are_delivered_in_emission_order() {
    let (_dir, resolver) = workspace();
    let (client, mock) = connect(resolver);

    let mut events = client.subscribe();
    mock.push_event("output", json!({ "session": 1, "output": "a" }));
    mock.push_event("output", json!({ "session": 1, "output": "b" }));
    mock.push_event("exited", json!({ "session": 1, "exit_code": 0 }));

    let mut outputs = Vec::new();
    for _ in 0..3 {
        outputs.push(events.recv().await.unwrap());
    }
    assert!(
        matches!(&outputs[0], EditorEvent::Output { output, .. } if output == "a"),
        "got {outputs:?}"
    );
    assert!(matches!(&outputs[1], EditorEvent::Output { output, .. } if output == "b"));
    assert!(matches!(&outputs[2], EditorEvent::Exited { exit_code: Some(0), .. }));
}

#[tokio::test]
async fn connection_loss_fails_everything_exactly_once() {
    let (_dir, resolver) = workspace();
    let (client, mock) = connect(resolver);

    // Never answered; the call should fail when the connection drops, well
    // before its timeout.
    mock.handle("debug/stackTrace", |_| {
        MockReply::ok(json!([])).after(Duration::from_secs(60))
    });

    let mut events = client.subscribe();
    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.debug_stack_trace(holt_core::RemoteSessionId(1)).await }
    });

    // Give the request time to hit the mock before dropping the pipe.
    tokio::time::sleep(Duration::from_millis(50)).await;
    mock.close();

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, RpcError::ConnectionLost), "got {err}");

    // Terminal sentinel, then the sequence ends.
    loop {
        match events.recv().await {
            Ok(EditorEvent::ConnectionLost) => break,
            Ok(_) => continue,
            Err(err) => panic!("sentinel not delivered: {err}"),
        }
    }
    let after_sentinel = tokio::time::timeout(Duration::from_millis(100), events.recv()).await;
    assert!(after_sentinel.is_err(), "no events follow the sentinel");

    // No further calls succeed on this connection.
    let err = client.lsp_status(BufferId(1)).await.unwrap_err();
    assert!(matches!(err, RpcError::ConnectionLost));
    assert!(client.is_closed());
}

#[tokio::test]
async fn path_arguments_reach_the_wire_canonicalized() {
    let (dir, resolver) = workspace();
    let (client, mock) = connect(resolver.clone());

    mock.respond("buffer/open", json!(7));

    let relative = client.open_buffer("main.py").await.unwrap();
    let absolute = client.open_buffer(dir.path().join("main.py")).await.unwrap();
    assert_eq!(relative, BufferId(7));
    assert_eq!(absolute, BufferId(7));

    let calls = mock.calls();
    assert_eq!(calls.len(), 2);
    // Two spellings of the same file serialize identically.
    assert_eq!(calls[0].params["path"], calls[1].params["path"]);

    let missing = client.open_buffer("missing.py").await.unwrap_err();
    assert!(matches!(missing, RpcError::Path(_)));
    // The failed canonicalization never reached the editor.
    assert_eq!(mock.calls_for("buffer/open"), 2);
}

#[cfg(unix)]
#[tokio::test]
async fn symlinked_spellings_canonicalize_to_one_path() {
    let dir = tempfile::tempdir().unwrap();
    let real = dir.path().join("real");
    std::fs::create_dir(&real).unwrap();
    std::fs::write(real.join("app.py"), "x = 1\n").unwrap();
    std::os::unix::fs::symlink(&real, dir.path().join("alias")).unwrap();

    let resolver = PathResolver::new(&real).unwrap();
    let (client, mock) = connect(resolver);
    mock.respond("buffer/open", json!(1));

    client.open_buffer(real.join("app.py")).await.unwrap();
    client
        .open_buffer(dir.path().join("alias/app.py"))
        .await
        .unwrap();

    let calls = mock.calls();
    assert_eq!(calls[0].params["path"], calls[1].params["path"]);
}
