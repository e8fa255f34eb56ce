use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::mcp::McpEntry;

/// How a provider without native tool support is asked to emit tool calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallMode {
    #[default]
    Native,
    Prompt,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigProviderOverride {
    pub models: BTreeMap<String, serde_json::Value>,
    pub options: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub tool_call_mode: ToolCallMode,
    #[serde(default)]
    pub blacklist: BTreeSet<String>,
    #[serde(default)]
    pub whitelist: BTreeSet<String>,
}

/// The validated configuration record the core consumes. Parsing the
/// on-disk config file itself is an external collaborator's job; this type
/// is the result of that parse, already validated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub data_dir: Option<PathBuf>,
    pub providers: BTreeMap<String, ConfigProviderOverride>,
    pub mcp: BTreeMap<String, McpEntry>,
    pub disabled_providers: BTreeSet<String>,
    pub enabled_providers: Option<BTreeSet<String>>,
    pub model: Option<String>,
    pub small_model: Option<String>,
    pub allow_experimental: bool,
    pub pty_shell: Option<String>,
}

impl RuntimeConfig {
    /// Parses a pinned `"<providerID>/<modelID>"` override.
    pub fn parse_pinned_model(pin: &str) -> Option<(&str, &str)> {
        pin.split_once('/')
    }
}
