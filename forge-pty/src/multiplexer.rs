use std::collections::HashMap;
use std::sync::Arc;

use forge_events::EventBus;
use forge_protocol::pty::{PtyConnectOptions, PtyCreateInput, PtySessionInfo, PtyStatus};
use forge_protocol::RuntimeEvent;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::info;
use uuid::Uuid;

use crate::error::PtyError;
use crate::process::spawn_process;
use crate::session::{spawn_session_actor, Command, SessionActorHandle};
use crate::shell::preferred_shell;

type SessionTable = Arc<Mutex<HashMap<String, SessionActorHandle>>>;

/// Spawns and owns PTY child processes (C6). One coarse lock over the
/// session table suffices; it's held only for structural map
/// operations, never across child I/O (that lives on each session's own
/// actor task).
pub struct PtyMultiplexer {
    sessions: SessionTable,
    events: Arc<EventBus>,
    pty_shell: Option<String>,
}

impl PtyMultiplexer {
    pub fn new(events: Arc<EventBus>, pty_shell: Option<String>) -> Self {
        Self { sessions: Arc::new(Mutex::new(HashMap::new())), events, pty_shell }
    }

    pub async fn create(&self, input: PtyCreateInput) -> Result<PtySessionInfo, PtyError> {
        let (shell, default_args) = preferred_shell(self.pty_shell.as_deref());
        let command = input.command.unwrap_or_else(|| shell.clone());
        let args = if input.args.is_empty() { default_args } else { input.args };
        let cwd = input.cwd.clone().map(std::path::PathBuf::from).unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."))
        });

        let spawned = spawn_process(&command, &args, &cwd, &input.env).await?;
        let id = Uuid::new_v4().to_string();

        let info = PtySessionInfo {
            id: id.clone(),
            title: input.title.unwrap_or_else(|| command.clone()),
            command: command.clone(),
            args: args.clone(),
            cwd: input.cwd.clone(),
            status: PtyStatus::Running,
            pid: spawned.handle.pid(),
            cwd_pinned: false,
        };

        let events = Arc::clone(&self.events);
        let sessions_for_exit = Arc::clone(&self.sessions);
        let id_for_exit = id.clone();
        let handle = spawn_session_actor(
            info.clone(),
            shell,
            spawned.handle,
            spawned.output_rx,
            spawned.exit_rx,
            Arc::clone(&events),
            move |_exited_id| {
                let sessions_for_exit = Arc::clone(&sessions_for_exit);
                let id_for_exit = id_for_exit.clone();
                tokio::spawn(async move {
                    sessions_for_exit.lock().await.remove(&id_for_exit);
                });
            },
        );

        self.sessions.lock().await.insert(id.clone(), handle);
        self.events.publish(RuntimeEvent::PtyCreated { info: info.clone() });
        info!(session = %id, "pty session created");
        Ok(info)
    }

    pub async fn connect(
        &self,
        id: &str,
        sink: mpsc::UnboundedSender<Vec<u8>>,
        options: PtyConnectOptions,
    ) -> Result<Uuid, PtyError> {
        let cmd_tx = self.cmd_tx(id).await?;
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = cmd_tx.send(Command::Connect { sink, options, reply: reply_tx });
        reply_rx.await.map_err(|_| PtyError::NotFound(id.to_string()))
    }

    pub async fn add_listener(&self, id: &str, sink: mpsc::UnboundedSender<Vec<u8>>) -> Result<(), PtyError> {
        let cmd_tx = self.cmd_tx(id).await?;
        let _ = cmd_tx.send(Command::AddListener { sink });
        Ok(())
    }

    /// Write on an unknown id is a silent no-op — idempotent operations
    /// never raise `pty_not_found`.
    pub async fn write(&self, id: &str, data: Vec<u8>) {
        if let Ok(cmd_tx) = self.cmd_tx(id).await {
            let _ = cmd_tx.send(Command::Write { data });
        }
    }

    pub async fn resize(&self, id: &str, cols: u16, rows: u16) {
        if let Ok(cmd_tx) = self.cmd_tx(id).await {
            let _ = cmd_tx.send(Command::Resize { cols, rows });
        }
    }

    /// Idempotent: removing an already-removed (or unknown) id is a no-op.
    pub async fn remove(&self, id: &str) {
        let handle = self.sessions.lock().await.remove(id);
        if let Some(handle) = handle {
            let _ = handle.cmd_tx.send(Command::Remove);
            self.events.publish(RuntimeEvent::PtyDeleted { id: id.to_string() });
        }
    }

    pub async fn get(&self, id: &str) -> Option<PtySessionInfo> {
        let cmd_tx = self.cmd_tx(id).await.ok()?;
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = cmd_tx.send(Command::GetInfo { reply: reply_tx });
        reply_rx.await.ok()
    }

    pub async fn list(&self) -> Vec<PtySessionInfo> {
        let ids: Vec<String> = self.sessions.lock().await.keys().cloned().collect();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(info) = self.get(&id).await {
                out.push(info);
            }
        }
        out
    }

    async fn cmd_tx(&self, id: &str) -> Result<mpsc::UnboundedSender<Command>, PtyError> {
        self.sessions
            .lock()
            .await
            .get(id)
            .map(|h| h.cmd_tx.clone())
            .ok_or_else(|| PtyError::NotFound(id.to_string()))
    }
}
