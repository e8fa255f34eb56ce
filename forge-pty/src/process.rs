use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

/// Handle for driving a spawned PTY child: a stdin writer channel, a
/// broadcast of raw output chunks, and exit notification. Dropping it
/// terminates the child and aborts its bridging tasks.
pub struct ProcessHandle {
    writer_tx: mpsc::Sender<Vec<u8>>,
    output_tx: broadcast::Sender<Vec<u8>>,
    killer: std::sync::Mutex<Option<Box<dyn portable_pty::ChildKiller + Send + Sync>>>,
    reader_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
    writer_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
    wait_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
    master: std::sync::Mutex<Box<dyn portable_pty::MasterPty + Send>>,
    pid: Option<u32>,
}

impl ProcessHandle {
    pub fn writer_sender(&self) -> mpsc::Sender<Vec<u8>> {
        self.writer_tx.clone()
    }

    pub fn output_receiver(&self) -> broadcast::Receiver<Vec<u8>> {
        self.output_tx.subscribe()
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn resize(&self, cols: u16, rows: u16) -> std::io::Result<()> {
        let size = PtySize { rows, cols, pixel_width: 0, pixel_height: 0 };
        self.master
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .resize(size)
            .map_err(std::io::Error::other)
    }

    pub fn terminate(&self) {
        if let Ok(mut guard) = self.killer.lock() {
            if let Some(mut killer) = guard.take() {
                let _ = killer.kill();
            }
        }
        for handle in [&self.reader_handle, &self.writer_handle, &self.wait_handle] {
            if let Ok(mut guard) = handle.lock() {
                if let Some(h) = guard.take() {
                    h.abort();
                }
            }
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}

pub struct SpawnedProcess {
    pub handle: ProcessHandle,
    pub output_rx: broadcast::Receiver<Vec<u8>>,
    pub exit_rx: oneshot::Receiver<i32>,
}

/// Spawns a process attached to a PTY with `TERM=xterm-256color`, bridging
/// its blocking reader/writer/wait operations onto tokio channels. PTY reads
/// are blocking I/O, so the reader loop runs on `spawn_blocking`.
pub async fn spawn_process(
    program: &str,
    args: &[String],
    cwd: &Path,
    env: &HashMap<String, String>,
) -> anyhow::Result<SpawnedProcess> {
    if program.is_empty() {
        anyhow::bail!("missing program for PTY spawn");
    }

    let pty_system = native_pty_system();
    let pair = pty_system.openpty(PtySize { rows: 24, cols: 80, pixel_width: 0, pixel_height: 0 })?;

    let mut command_builder = CommandBuilder::new(program);
    command_builder.cwd(cwd);
    command_builder.env_clear();
    command_builder.env("TERM", "xterm-256color");
    for arg in args {
        command_builder.arg(arg);
    }
    for (key, value) in env {
        command_builder.env(key, value);
    }

    let mut child = pair.slave.spawn_command(command_builder)?;
    let killer = child.clone_killer();
    let pid = child.process_id();
    drop(pair.slave);

    let (writer_tx, mut writer_rx) = mpsc::channel::<Vec<u8>>(128);
    let (output_tx, initial_output_rx) = broadcast::channel::<Vec<u8>>(256);

    let mut reader = pair.master.try_clone_reader()?;
    let output_tx_clone = output_tx.clone();
    let reader_handle: JoinHandle<()> = tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; 8_192];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let _ = output_tx_clone.send(buf[..n].to_vec());
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(5));
                    continue;
                }
                Err(_) => break,
            }
        }
    });

    let writer = pair.master.take_writer()?;
    let writer = Arc::new(tokio::sync::Mutex::new(writer));
    let writer_handle: JoinHandle<()> = tokio::spawn({
        let writer = Arc::clone(&writer);
        async move {
            while let Some(bytes) = writer_rx.recv().await {
                let mut guard = writer.lock().await;
                use std::io::Write;
                let _ = guard.write_all(&bytes);
                let _ = guard.flush();
            }
        }
    });

    let (exit_tx, exit_rx) = oneshot::channel::<i32>();
    let wait_handle: JoinHandle<()> = tokio::task::spawn_blocking(move || {
        let code = match child.wait() {
            Ok(status) => status.exit_code() as i32,
            Err(_) => -1,
        };
        let _ = exit_tx.send(code);
    });

    let handle = ProcessHandle {
        writer_tx,
        output_tx,
        killer: std::sync::Mutex::new(Some(killer)),
        reader_handle: std::sync::Mutex::new(Some(reader_handle)),
        writer_handle: std::sync::Mutex::new(Some(writer_handle)),
        wait_handle: std::sync::Mutex::new(Some(wait_handle)),
        master: std::sync::Mutex::new(pair.master),
        pid,
    };

    Ok(SpawnedProcess { handle, output_rx: initial_output_rx, exit_rx })
}
