use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

use crate::jsonrpc::{JsonRpcMessage, JsonRpcRequest, JsonRpcNotification, RequestId};

const CHANNEL_CAPACITY: usize = 128;

type PendingMap = Arc<Mutex<HashMap<i64, oneshot::Sender<JsonRpcMessage>>>>;

/// A stdio-transport MCP session: a child process, a newline-delimited JSON
/// writer task, and a reader task dispatching responses to whichever
/// in-flight request is waiting on them.
pub struct StdioMcpClient {
    _child: Child,
    outgoing_tx: mpsc::Sender<JsonRpcMessage>,
    pending: PendingMap,
    id_counter: AtomicI64,
}

impl StdioMcpClient {
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .env_clear()
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn MCP server command {command:?}"))?;

        let stdin = child.stdin.take().context("child stdin not piped")?;
        let stdout = child.stdout.take().context("child stdout not piped")?;

        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<JsonRpcMessage>(CHANNEL_CAPACITY);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(message) = outgoing_rx.recv().await {
                let Ok(mut line) = serde_json::to_vec(&message) else { continue };
                line.push(b'\n');
                if stdin.write_all(&line).await.is_err() || stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        let pending_for_reader = Arc::clone(&pending);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<JsonRpcMessage>(&line) {
                            Ok(JsonRpcMessage::Response(resp)) => {
                                dispatch(&pending_for_reader, &resp.id, JsonRpcMessage::Response(resp.clone())).await;
                            }
                            Ok(JsonRpcMessage::Error(err)) => {
                                dispatch(&pending_for_reader, &err.id, JsonRpcMessage::Error(err.clone())).await;
                            }
                            Ok(JsonRpcMessage::Notification(note)) => {
                                debug!(method = %note.method, "mcp notification");
                            }
                            Ok(other) => {
                                warn!(?other, "unexpected MCP message on stdio transport");
                            }
                            Err(err) => {
                                warn!(%err, line = %line, "failed to parse MCP stdio line");
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!(%err, "error reading MCP stdio transport");
                        break;
                    }
                }
            }
        });

        Ok(Self { _child: child, outgoing_tx, pending, id_counter: AtomicI64::new(1) })
    }

    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        let request_id = RequestId::Integer(id);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let request = JsonRpcRequest::new(request_id, method, params);
        if self.outgoing_tx.send(JsonRpcMessage::Request(request)).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(anyhow!("MCP stdio writer task is gone"));
        }

        let message = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(message)) => message,
            Ok(Err(_)) => {
                self.pending.lock().await.remove(&id);
                return Err(anyhow!("MCP stdio response channel closed before a reply arrived"));
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(anyhow!("MCP stdio request {method:?} timed out"));
            }
        };

        match message {
            JsonRpcMessage::Response(resp) => Ok(resp.result),
            JsonRpcMessage::Error(err) => Err(anyhow!(
                "MCP server returned error {}: {}",
                err.error.code,
                err.error.message
            )),
            other => Err(anyhow!("unexpected MCP reply variant: {other:?}")),
        }
    }

    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let notification = JsonRpcNotification {
            jsonrpc: crate::jsonrpc::JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
        };
        self.outgoing_tx
            .send(JsonRpcMessage::Notification(notification))
            .await
            .map_err(|_| anyhow!("MCP stdio writer task is gone"))
    }
}

async fn dispatch(pending: &PendingMap, id: &RequestId, message: JsonRpcMessage) {
    let RequestId::Integer(id) = id else {
        warn!("MCP stdio reply carried a non-integer id");
        return;
    };
    if let Some(tx) = pending.lock().await.remove(id) {
        let _ = tx.send(message);
    }
}
