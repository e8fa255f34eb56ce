use thiserror::Error;

/// Surfaced to the chat orchestrator when a tool call fails. `Transport`
/// covers connection and call errors; `AuthRequired` carries the server name
/// so the client can prompt the user to run the auth flow.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("mcp_transport({name}): {cause}")]
    Transport { name: String, cause: String },

    #[error("mcp_auth_required({name})")]
    AuthRequired { name: String },

    #[error("no MCP server configured with name {0:?}")]
    UnknownServer(String),

    #[error("tool {tool:?} not found on server {server:?}")]
    ToolNotFound { server: String, tool: String },

    #[error(transparent)]
    Credentials(#[from] forge_credentials::CredentialStoreError),
}
