use std::time::Duration;

use anyhow::{anyhow, Result};
use serde_json::{json, Value};

use crate::http::{HttpMcpClient, RequestOutcome};
use crate::stdio::StdioMcpClient;
use crate::tools::ToolSpec;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub enum Transport {
    Stdio(StdioMcpClient),
    Http(HttpMcpClient),
}

pub enum CallOutcome {
    Result(Value),
    Unauthorized,
}

impl Transport {
    pub async fn initialize(&self) -> Result<()> {
        let params = json!({
            "protocolVersion": "2025-03-26",
            "clientInfo": { "name": "forge-runtime", "version": env!("CARGO_PKG_VERSION") },
            "capabilities": {},
        });
        match self {
            Transport::Stdio(client) => {
                client.request("initialize", Some(params), REQUEST_TIMEOUT).await?;
                client.notify("notifications/initialized", None).await?;
                Ok(())
            }
            Transport::Http(client) => match client.request("initialize", Some(params), REQUEST_TIMEOUT).await? {
                RequestOutcome::Result(_) => Ok(()),
                RequestOutcome::Unauthorized => Err(anyhow!("unauthorized during initialize")),
            },
        }
    }

    pub async fn list_tools(&self) -> Result<CallOutcome> {
        match self {
            Transport::Stdio(client) => {
                let result = client.request("tools/list", None, REQUEST_TIMEOUT).await?;
                Ok(CallOutcome::Result(result))
            }
            Transport::Http(client) => match client.request("tools/list", None, REQUEST_TIMEOUT).await? {
                RequestOutcome::Result(result) => Ok(CallOutcome::Result(result)),
                RequestOutcome::Unauthorized => Ok(CallOutcome::Unauthorized),
            },
        }
    }

    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<CallOutcome> {
        let params = json!({ "name": tool_name, "arguments": arguments });
        match self {
            Transport::Stdio(client) => {
                let result = client.request("tools/call", Some(params), REQUEST_TIMEOUT).await?;
                Ok(CallOutcome::Result(result))
            }
            Transport::Http(client) => match client.request("tools/call", Some(params), REQUEST_TIMEOUT).await? {
                RequestOutcome::Result(result) => Ok(CallOutcome::Result(result)),
                RequestOutcome::Unauthorized => Ok(CallOutcome::Unauthorized),
            },
        }
    }
}

pub fn tool_specs_from_list_result(server_name: &str, result: &Value) -> Vec<ToolSpec> {
    let Some(tools) = result.get("tools").and_then(Value::as_array) else {
        return Vec::new();
    };
    tools
        .iter()
        .filter_map(|tool| {
            let name = tool.get("name")?.as_str()?.to_string();
            Some(ToolSpec {
                mcp_name: server_name.to_string(),
                tool_name: name,
                description: tool.get("description").and_then(Value::as_str).map(str::to_string),
                input_schema: tool.get("inputSchema").cloned().unwrap_or(Value::Null),
            })
        })
        .collect()
}
