use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Configured (not connected) MCP server entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpEntry {
    Local {
        command: Vec<String>,
        #[serde(default)]
        environment: BTreeMap<String, String>,
        enabled: bool,
    },
    Remote {
        url: String,
        enabled: bool,
        oauth: McpOAuthConfig,
    },
}

impl McpEntry {
    pub fn enabled(&self) -> bool {
        match self {
            McpEntry::Local { enabled, .. } => *enabled,
            McpEntry::Remote { enabled, .. } => *enabled,
        }
    }
}

/// `false` means OAuth is not attempted for this entry; `{}` means attempt
/// discovery/dynamic-registration with no pre-configured client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum McpOAuthConfig {
    Disabled(bool),
    Configured {
        #[serde(default)]
        client_id: Option<String>,
        #[serde(default)]
        client_secret: Option<String>,
        #[serde(default)]
        scope: Option<String>,
    },
}

impl McpOAuthConfig {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, McpOAuthConfig::Disabled(false))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix seconds.
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredClientInfo {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub client_secret_expires_at: Option<i64>,
}

/// Persisted keyed by configured MCP server name. At most one record per
/// name; `code_verifier` is present only between authorization-URL emission
/// and token exchange.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpAuthRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<StoredTokens>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_info: Option<StoredClientInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
}

impl McpAuthRecord {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_none() && self.client_info.is_none() && self.code_verifier.is_none()
    }

    pub fn is_fresh(&self, now_unix: i64) -> bool {
        match &self.tokens {
            Some(t) => match t.expires_at {
                Some(exp) => exp > now_unix,
                None => true,
            },
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum McpConnectionStatus {
    Connected,
    Disabled,
    NeedsAuth,
    NeedsClientRegistration { error: String },
    Failed { error: String },
}

impl McpConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, McpConnectionStatus::Connected)
    }
}
