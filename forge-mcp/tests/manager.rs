use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use forge_credentials::CredentialStore;
use forge_events::EventBus;
use forge_mcp::McpManager;
use forge_protocol::mcp::{McpConnectionStatus, McpEntry, McpOAuthConfig};

/// A tiny stdio MCP server emulated with `python3`: answers `initialize` and
/// `tools/list` with one tool, and `tools/call` by echoing its arguments.
const FAKE_SERVER_SCRIPT: &str = r#"
import sys, json

def reply(id_, result):
    sys.stdout.write(json.dumps({"jsonrpc": "2.0", "id": id_, "result": result}) + "\n")
    sys.stdout.flush()

for line in sys.stdin:
    line = line.strip()
    if not line:
        continue
    msg = json.loads(line)
    method = msg.get("method")
    if method == "initialize":
        reply(msg["id"], {"protocolVersion": "2025-03-26"})
    elif method == "notifications/initialized":
        continue
    elif method == "tools/list":
        reply(msg["id"], {"tools": [{"name": "search", "description": "search things", "inputSchema": {}}]})
    elif method == "tools/call":
        reply(msg["id"], {"content": [{"type": "text", "text": "ok"}], "echo": msg["params"]["arguments"]})
"#;

fn local_entry() -> McpEntry {
    McpEntry::Local {
        command: vec!["python3".to_string(), "-c".to_string(), FAKE_SERVER_SCRIPT.to_string()],
        environment: BTreeMap::new(),
        enabled: true,
    }
}

#[tokio::test]
async fn local_server_connects_lists_and_calls_tools() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let store = Arc::new(CredentialStore::new(dir.path()));
    let events = Arc::new(EventBus::new());
    let manager = McpManager::new(store, events);

    let mut config = HashMap::new();
    config.insert("serverA".to_string(), local_entry());
    manager.connect_all(config).await;

    let status = manager.status().await;
    assert_eq!(status.get("serverA"), Some(&McpConnectionStatus::Connected));

    let catalog = manager.tool_catalog().await;
    assert!(catalog.contains_key("serverA_search"));

    let result = manager
        .tool_call("serverA", "search", serde_json::json!({"query": "rust"}))
        .await
        .expect("tool call succeeds");
    assert_eq!(result["echo"]["query"], "rust");
}

#[tokio::test]
async fn disabled_entry_is_not_connected() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let store = Arc::new(CredentialStore::new(dir.path()));
    let events = Arc::new(EventBus::new());
    let manager = McpManager::new(store, events);

    let mut config = HashMap::new();
    config.insert(
        "serverA".to_string(),
        McpEntry::Local { command: vec!["true".to_string()], environment: BTreeMap::new(), enabled: false },
    );
    manager.connect_all(config).await;

    assert_eq!(manager.status().await.get("serverA"), Some(&McpConnectionStatus::Disabled));
}

#[tokio::test]
async fn remote_entry_with_unreachable_url_and_oauth_disabled_fails_without_blocking() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let store = Arc::new(CredentialStore::new(dir.path()));
    let events = Arc::new(EventBus::new());
    let manager = McpManager::new(store, events);

    let mut config = HashMap::new();
    config.insert(
        "serverA".to_string(),
        McpEntry::Remote {
            url: "http://127.0.0.1:1/mcp".to_string(),
            enabled: true,
            oauth: McpOAuthConfig::Disabled(false),
        },
    );
    config.insert("serverB".to_string(), local_entry());
    manager.connect_all(config).await;

    let status = manager.status().await;
    assert!(matches!(status.get("serverA"), Some(McpConnectionStatus::Failed { .. })));
    assert_eq!(status.get("serverB"), Some(&McpConnectionStatus::Connected));
}

#[tokio::test]
async fn tool_call_on_unknown_server_is_an_error() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let store = Arc::new(CredentialStore::new(dir.path()));
    let events = Arc::new(EventBus::new());
    let manager = McpManager::new(store, events);

    let result = manager.tool_call("does-not-exist", "search", serde_json::json!({})).await;
    assert!(result.is_err());
}
