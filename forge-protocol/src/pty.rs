use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const PTY_BUFFER_LIMIT: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PtyStatus {
    Running,
    Exited,
}

/// Snapshot published on the event bus; never carries the live buffer or
/// subscriber set (those are internal to the multiplexer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PtySessionInfo {
    pub id: String,
    pub title: String,
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<String>,
    pub status: PtyStatus,
    pub pid: Option<u32>,
    pub cwd_pinned: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PtyCreateInput {
    pub command: Option<String>,
    pub args: Vec<String>,
    pub cwd: Option<String>,
    pub env: BTreeMap<String, String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PtyConnectOptions {
    pub directory: Option<String>,
}
