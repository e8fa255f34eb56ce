use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use crate::jsonrpc::{JsonRpcMessage, JsonRpcRequest, RequestId};

/// A streamable-HTTP MCP session: every request is a single POST carrying a
/// JSON-RPC envelope, answered by a single JSON-RPC envelope in the
/// response body. No server push; reconnects are just new requests.
pub struct HttpMcpClient {
    http: reqwest::Client,
    url: url::Url,
    headers: HeaderMap,
    id_counter: AtomicI64,
}

impl HttpMcpClient {
    pub fn new(url: url::Url, bearer_token: Option<&str>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = bearer_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| anyhow!("invalid bearer token: {e}"))?;
            headers.insert(AUTHORIZATION, value);
        }
        let http = reqwest::Client::builder().build()?;
        Ok(Self { http, url, headers, id_counter: AtomicI64::new(1) })
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        let value = HeaderValue::from_str(value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<RequestOutcome> {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(RequestId::Integer(id), method, params);

        let response = self
            .http
            .post(self.url.clone())
            .headers(self.headers.clone())
            .json(&JsonRpcMessage::Request(request))
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(RequestOutcome::Unauthorized);
        }
        if !status.is_success() {
            return Err(anyhow!("MCP HTTP transport returned status {status}"));
        }

        let message: JsonRpcMessage = response.json().await?;
        match message {
            JsonRpcMessage::Response(resp) => Ok(RequestOutcome::Result(resp.result)),
            JsonRpcMessage::Error(err) => {
                Err(anyhow!("MCP server returned error {}: {}", err.error.code, err.error.message))
            }
            other => Err(anyhow!("unexpected MCP reply variant: {other:?}")),
        }
    }
}

pub enum RequestOutcome {
    Result(Value),
    Unauthorized,
}
