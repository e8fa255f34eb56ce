use std::collections::HashMap;
use std::sync::Arc;

use forge_credentials::CredentialStore;
use forge_events::EventBus;
use forge_oauth::{OAuthClientConfig, OAuthProvider};
use forge_protocol::events::RuntimeEvent;
use forge_protocol::mcp::{McpConnectionStatus, McpEntry, McpOAuthConfig};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::connection::{tool_specs_from_list_result, CallOutcome, Transport};
use crate::error::McpError;
use crate::stdio::StdioMcpClient;
use crate::tools::{qualify_tools, ToolSpec};

struct ManagedEntry {
    entry: McpEntry,
    transport: Option<Transport>,
    oauth: Option<Arc<OAuthProvider>>,
    status: McpConnectionStatus,
    tools: Vec<ToolSpec>,
}

/// Owns one connection per configured MCP server and tracks its status
/// (C3). Tool discovery is cached for the life of a connection; a reconnect
/// (transport error or explicit refresh) re-enumerates.
pub struct McpManager {
    store: Arc<CredentialStore>,
    http: reqwest::Client,
    events: Arc<EventBus>,
    entries: Mutex<HashMap<String, ManagedEntry>>,
}

impl McpManager {
    pub fn new(store: Arc<CredentialStore>, events: Arc<EventBus>) -> Self {
        Self {
            store,
            http: reqwest::Client::new(),
            events,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Attempts to connect every enabled entry. A single entry failing to
    /// authenticate (401 with an OAuth hint) sets that entry's status to
    /// `needs_auth` and moves on; it never aborts the rest of startup.
    pub async fn connect_all(&self, config: HashMap<String, McpEntry>) {
        for (name, entry) in config {
            if !entry.enabled() {
                self.entries.lock().await.insert(
                    name,
                    ManagedEntry { entry, transport: None, oauth: None, status: McpConnectionStatus::Disabled, tools: Vec::new() },
                );
                continue;
            }
            self.connect_one(name, entry).await;
        }
    }

    async fn connect_one(&self, name: String, entry: McpEntry) {
        let outcome = match &entry {
            McpEntry::Local { command, environment, .. } => self.connect_local(&name, command, environment).await,
            McpEntry::Remote { url, oauth, .. } => self.connect_remote(&name, url, oauth).await,
        };

        let (transport, oauth, status, tools) = match outcome {
            Ok(connected) => connected,
            Err(status) => (None, None, status, Vec::new()),
        };

        self.events.publish(RuntimeEvent::McpStatus { name: name.clone(), status: status.clone() });
        info!(server = %name, ?status, "mcp connection attempt finished");
        self.entries.lock().await.insert(name, ManagedEntry { entry, transport, oauth, status, tools });
    }

    #[allow(clippy::type_complexity)]
    async fn connect_local(
        &self,
        name: &str,
        command: &[String],
        environment: &std::collections::BTreeMap<String, String>,
    ) -> Result<(Option<Transport>, Option<Arc<OAuthProvider>>, McpConnectionStatus, Vec<ToolSpec>), McpConnectionStatus> {
        let Some(program) = command.first() else {
            return Err(McpConnectionStatus::Failed { error: "empty command".to_string() });
        };
        let env: HashMap<String, String> = environment.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let client = StdioMcpClient::spawn(program, &command[1..], &env)
            .await
            .map_err(|err| McpConnectionStatus::Failed { error: err.to_string() })?;
        let transport = Transport::Stdio(client);
        transport.initialize().await.map_err(|err| McpConnectionStatus::Failed { error: err.to_string() })?;
        let tools = match transport.list_tools().await {
            Ok(CallOutcome::Result(result)) => tool_specs_from_list_result(name, &result),
            Ok(CallOutcome::Unauthorized) => Vec::new(),
            Err(err) => return Err(McpConnectionStatus::Failed { error: err.to_string() }),
        };
        Ok((Some(transport), None, McpConnectionStatus::Connected, tools))
    }

    #[allow(clippy::type_complexity)]
    async fn connect_remote(
        &self,
        name: &str,
        url: &str,
        oauth_config: &McpOAuthConfig,
    ) -> Result<(Option<Transport>, Option<Arc<OAuthProvider>>, McpConnectionStatus, Vec<ToolSpec>), McpConnectionStatus> {
        let parsed = url::Url::parse(url).map_err(|err| McpConnectionStatus::Failed { error: err.to_string() })?;

        let bearer = self.stored_bearer_token(name).await;
        let transport = crate::http::HttpMcpClient::new(parsed, bearer.as_deref())
            .map_err(|err| McpConnectionStatus::Failed { error: err.to_string() })?;

        let oauth_provider = if oauth_config.is_enabled() {
            let client_config = match oauth_config {
                McpOAuthConfig::Configured { client_id, client_secret, scope } => OAuthClientConfig {
                    client_id: client_id.clone(),
                    client_secret: client_secret.clone(),
                    scope: scope.clone(),
                },
                McpOAuthConfig::Disabled(_) => OAuthClientConfig::default(),
            };
            match OAuthProvider::discover(name, url, client_config, Arc::clone(&self.store), self.http.clone()).await {
                Ok(provider) => Some(Arc::new(provider)),
                Err(err) => {
                    warn!(server = %name, %err, "oauth discovery failed; continuing unauthenticated");
                    None
                }
            }
        } else {
            None
        };

        let transport_ref = Transport::Http(transport);

        match transport_ref.initialize().await {
            Ok(()) => {}
            Err(_) if oauth_provider.is_some() => {
                return Ok((Some(transport_ref), oauth_provider, McpConnectionStatus::NeedsAuth, Vec::new()));
            }
            Err(err) => return Err(McpConnectionStatus::Failed { error: err.to_string() }),
        }

        let tools = match transport_ref.list_tools().await {
            Ok(CallOutcome::Result(result)) => tool_specs_from_list_result(name, &result),
            Ok(CallOutcome::Unauthorized) if oauth_provider.is_some() => {
                return Ok((Some(transport_ref), oauth_provider, McpConnectionStatus::NeedsAuth, Vec::new()));
            }
            Ok(CallOutcome::Unauthorized) => {
                return Err(McpConnectionStatus::Failed { error: "server requires authentication".to_string() });
            }
            Err(err) => return Err(McpConnectionStatus::Failed { error: err.to_string() }),
        };

        Ok((Some(transport_ref), oauth_provider, McpConnectionStatus::Connected, tools))
    }

    async fn stored_bearer_token(&self, name: &str) -> Option<String> {
        let record = self.store.get(name).await.ok()??;
        let tokens = record.tokens?;
        let now = chrono::Utc::now().timestamp();
        if tokens.expires_at.is_some_and(|exp| exp <= now) {
            return None;
        }
        Some(tokens.access_token)
    }

    pub async fn status(&self) -> HashMap<String, McpConnectionStatus> {
        self.entries.lock().await.iter().map(|(name, entry)| (name.clone(), entry.status.clone())).collect()
    }

    /// Drives the OAuth provider interactively and returns the resulting
    /// status. Reconnects the entry afterward so a fresh tool list is
    /// picked up on success.
    pub async fn authenticate(
        &self,
        name: &str,
        on_redirect: impl FnOnce(&str) + Send,
    ) -> Result<McpConnectionStatus, McpError> {
        let (entry, oauth) = {
            let entries = self.entries.lock().await;
            let managed = entries.get(name).ok_or_else(|| McpError::UnknownServer(name.to_string()))?;
            (managed.entry.clone(), managed.oauth.clone())
        };
        let Some(oauth) = oauth else {
            return Err(McpError::UnknownServer(name.to_string()));
        };

        match oauth.authenticate(on_redirect).await {
            Ok(()) => {
                self.connect_one(name.to_string(), entry).await;
            }
            Err(err) => {
                let status = McpConnectionStatus::Failed { error: err.to_string() };
                self.entries.lock().await.entry(name.to_string()).and_modify(|e| e.status = status.clone());
                self.events.publish(RuntimeEvent::McpStatus { name: name.to_string(), status: status.clone() });
            }
        }
        Ok(self.entries.lock().await.get(name).map(|e| e.status.clone()).unwrap_or(McpConnectionStatus::Failed {
            error: "connection vanished during authentication".to_string(),
        }))
    }

    /// Purges tokens and client info; the next call to the server falls back
    /// to config-provided credentials or proceeds unauthenticated.
    pub async fn remove_auth(&self, name: &str) -> Result<(), McpError> {
        self.store.remove(name).await?;
        Ok(())
    }

    pub async fn has_stored_tokens(&self, name: &str) -> Result<bool, McpError> {
        Ok(self.store.get(name).await?.and_then(|r| r.tokens).is_some())
    }

    /// Aggregated tool catalog keyed by the fully-qualified `"<mcpName>_<toolName>"` name.
    pub async fn tool_catalog(&self) -> HashMap<String, ToolSpec> {
        let entries = self.entries.lock().await;
        let all = entries.values().flat_map(|e| e.tools.iter().cloned());
        qualify_tools(all)
    }

    pub async fn tool_call(&self, mcp_name: &str, tool_name: &str, args: Value) -> Result<Value, McpError> {
        let transport_exists = {
            let entries = self.entries.lock().await;
            entries.get(mcp_name).map(|e| e.transport.is_some()).unwrap_or(false)
        };
        if !transport_exists {
            return Err(McpError::UnknownServer(mcp_name.to_string()));
        }

        let outcome = {
            let entries = self.entries.lock().await;
            let managed = entries.get(mcp_name).ok_or_else(|| McpError::UnknownServer(mcp_name.to_string()))?;
            let transport = managed.transport.as_ref().ok_or_else(|| McpError::UnknownServer(mcp_name.to_string()))?;
            transport.call_tool(tool_name, args.clone()).await
        };

        match outcome {
            Ok(CallOutcome::Result(result)) => Ok(result),
            Ok(CallOutcome::Unauthorized) => self.retry_after_refresh(mcp_name, tool_name, args).await,
            Err(err) => {
                let status = McpConnectionStatus::Failed { error: err.to_string() };
                self.entries.lock().await.entry(mcp_name.to_string()).and_modify(|e| e.status = status.clone());
                Err(McpError::Transport { name: mcp_name.to_string(), cause: err.to_string() })
            }
        }
    }

    /// Token refresh is attempted lazily on 401; a second consecutive 401
    /// escalates the server to `needs_auth` rather than retrying forever.
    async fn retry_after_refresh(&self, mcp_name: &str, tool_name: &str, args: Value) -> Result<Value, McpError> {
        let oauth = {
            let entries = self.entries.lock().await;
            entries.get(mcp_name).and_then(|e| e.oauth.clone())
        };
        let Some(oauth) = oauth else {
            return Err(McpError::AuthRequired { name: mcp_name.to_string() });
        };

        if oauth.refresh().await.is_err() {
            self.mark_needs_auth(mcp_name).await;
            return Err(McpError::AuthRequired { name: mcp_name.to_string() });
        }

        let outcome = {
            let entries = self.entries.lock().await;
            let managed = entries.get(mcp_name).ok_or_else(|| McpError::UnknownServer(mcp_name.to_string()))?;
            let transport = managed.transport.as_ref().ok_or_else(|| McpError::UnknownServer(mcp_name.to_string()))?;
            transport.call_tool(tool_name, args).await
        };

        match outcome {
            Ok(CallOutcome::Result(result)) => Ok(result),
            Ok(CallOutcome::Unauthorized) => {
                self.mark_needs_auth(mcp_name).await;
                Err(McpError::AuthRequired { name: mcp_name.to_string() })
            }
            Err(err) => Err(McpError::Transport { name: mcp_name.to_string(), cause: err.to_string() }),
        }
    }

    async fn mark_needs_auth(&self, mcp_name: &str) {
        self.entries.lock().await.entry(mcp_name.to_string()).and_modify(|e| e.status = McpConnectionStatus::NeedsAuth);
        self.events.publish(RuntimeEvent::McpStatus { name: mcp_name.to_string(), status: McpConnectionStatus::NeedsAuth });
    }
}
