use serde::{Deserialize, Serialize};

use crate::mcp::McpConnectionStatus;
use crate::pty::PtySessionInfo;

/// Published on the event bus (C7). Never carries payload-streaming data;
/// used only for state transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuntimeEvent {
    PtyCreated { info: PtySessionInfo },
    PtyUpdated { info: PtySessionInfo },
    PtyExited { id: String, exit_code: Option<i32> },
    PtyDeleted { id: String },
    McpStatus { name: String, status: McpConnectionStatus },
    /// Ambient diagnostic, not part of the client-facing schema: fires once
    /// per completed registry build.
    RegistryRebuilt,
}

impl RuntimeEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            RuntimeEvent::PtyCreated { .. } => "pty.created",
            RuntimeEvent::PtyUpdated { .. } => "pty.updated",
            RuntimeEvent::PtyExited { .. } => "pty.exited",
            RuntimeEvent::PtyDeleted { .. } => "pty.deleted",
            RuntimeEvent::McpStatus { .. } => "mcp.status",
            RuntimeEvent::RegistryRebuilt => "registry.rebuilt",
        }
    }
}
