use std::sync::Arc;

use forge_events::EventBus;
use forge_protocol::pty::{PtyConnectOptions, PtySessionInfo, PtyStatus, PTY_BUFFER_LIMIT};
use forge_protocol::RuntimeEvent;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use uuid::Uuid;

use crate::process::ProcessHandle;
use crate::shell::{cd_command, shell_kind};

const BACKLOG_FLUSH_CHUNK: usize = 64 * 1024;

struct Subscriber {
    id: Uuid,
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

pub enum Command {
    Connect {
        sink: mpsc::UnboundedSender<Vec<u8>>,
        options: PtyConnectOptions,
        reply: oneshot::Sender<Uuid>,
    },
    Disconnect {
        id: Uuid,
    },
    AddListener {
        sink: mpsc::UnboundedSender<Vec<u8>>,
    },
    Write {
        data: Vec<u8>,
    },
    Resize {
        cols: u16,
        rows: u16,
    },
    GetInfo {
        reply: oneshot::Sender<PtySessionInfo>,
    },
    Remove,
}

pub struct SessionActorHandle {
    pub cmd_tx: mpsc::UnboundedSender<Command>,
}

/// Owns a session's mutable state (buffer, subscribers, listeners) on a
/// single task, so structural changes never race with child I/O delivery.
pub fn spawn_session_actor(
    mut info: PtySessionInfo,
    shell: String,
    process: ProcessHandle,
    mut output_rx: tokio::sync::broadcast::Receiver<Vec<u8>>,
    mut exit_rx: oneshot::Receiver<i32>,
    events: Arc<EventBus>,
    on_exit: impl FnOnce(&str) + Send + 'static,
) -> SessionActorHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();
    let kind = shell_kind(&shell);

    tokio::spawn(async move {
        let mut buffer: Vec<u8> = Vec::new();
        let mut subscribers: Vec<Subscriber> = Vec::new();
        let mut listeners: Vec<mpsc::UnboundedSender<Vec<u8>>> = Vec::new();

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break; };
                    match cmd {
                        Command::Connect { sink, options, reply } => {
                            if let Some(dir) = &options.directory {
                                if !info.cwd_pinned {
                                    info.cwd_pinned = true;
                                    info.cwd = Some(dir.clone());
                                    let _ = process.writer_sender().send(cd_command(kind, dir)).await;
                                    events.publish(RuntimeEvent::PtyUpdated { info: info.clone() });
                                }
                            }

                            let id = Uuid::new_v4();
                            if !buffer.is_empty() {
                                let mut delivered_all = true;
                                for chunk in buffer.chunks(BACKLOG_FLUSH_CHUNK) {
                                    if sink.send(chunk.to_vec()).is_err() {
                                        delivered_all = false;
                                        break;
                                    }
                                }
                                if delivered_all {
                                    buffer.clear();
                                }
                            }
                            subscribers.push(Subscriber { id, tx: sink });
                            let _ = reply.send(id);
                        }
                        Command::Disconnect { id } => {
                            subscribers.retain(|s| s.id != id);
                        }
                        Command::AddListener { sink } => {
                            listeners.push(sink);
                        }
                        Command::Write { data } => {
                            let _ = process.writer_sender().send(data).await;
                        }
                        Command::Resize { cols, rows } => {
                            let _ = process.resize(cols, rows);
                        }
                        Command::GetInfo { reply } => {
                            let _ = reply.send(info.clone());
                        }
                        Command::Remove => {
                            process.terminate();
                            break;
                        }
                    }
                }
                chunk = output_rx.recv() => {
                    let Ok(chunk) = chunk else { continue; };

                    listeners.retain(|tx| tx.send(chunk.clone()).is_ok());

                    let mut delivered = false;
                    subscribers.retain(|s| {
                        let ok = s.tx.send(chunk.clone()).is_ok();
                        delivered = delivered || ok;
                        ok
                    });

                    if !delivered {
                        buffer.extend_from_slice(&chunk);
                        if buffer.len() > PTY_BUFFER_LIMIT {
                            let start = buffer.len() - PTY_BUFFER_LIMIT;
                            buffer.drain(..start);
                        }
                    }
                }
                code = &mut exit_rx => {
                    let exit_code = code.ok();
                    info.status = PtyStatus::Exited;
                    events.publish(RuntimeEvent::PtyExited { id: info.id.clone(), exit_code });
                    debug!(session = %info.id, ?exit_code, "pty session exited");
                    subscribers.clear();
                    listeners.clear();
                    on_exit(&info.id);
                    break;
                }
            }
        }
        info!(session = %info.id, "pty session actor stopped");
    });

    SessionActorHandle { cmd_tx }
}
