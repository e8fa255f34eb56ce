//! Anthropic Messages API driver, reused for Bedrock's Anthropic-family
//! models via the `invoke` transport: same request/response shape, a
//! different endpoint path and auth header, and the model id already
//! carries its Bedrock cross-region prefix by the time it reaches here.

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

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicDriver {
    http: reqwest::Client,
    base_url: String,
    model_id: String,
    auth_token: String,
}

impl AnthropicDriver {
    /// `base_url` is the API root (`https://api.anthropic.com` for direct
    /// Anthropic, `https://bedrock-runtime.<region>.amazonaws.com` for
    /// Bedrock); the endpoint path is derived from which host it is.
    pub fn new(http: reqwest::Client, base_url: String, model_id: String, auth_token: String) -> Self {
        Self { http, base_url, model_id, auth_token }
    }

    fn is_bedrock(&self) -> bool {
        self.base_url.contains("bedrock-runtime")
    }

    fn endpoint(&self) -> String {
        if self.is_bedrock() {
            format!("{}/model/{}/invoke", self.base_url, self.model_id)
        } else {
            format!("{}/v1/messages", self.base_url)
        }
    }

    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.is_bedrock() {
            builder.bearer_auth(&self.auth_token)
        } else {
            builder.header("x-api-key", &self.auth_token).header("anthropic-version", ANTHROPIC_VERSION)
        }
    }

    fn request_body(&self, req: &GenerateRequest) -> Value {
        let use_shim = req.uses_prompt_shim();
        let native_tools = req.wants_tools() && !use_shim;

        let mut system = req
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.clone())
            .collect::<Vec<_>>()
            .join("\n");
        if use_shim {
            let shim_system = crate::shim::build_shim_system_message(&req.tools, &req.tool_choice);
            system = if system.is_empty() { shim_system } else { format!("{system}\n{shim_system}") };
        }

        let messages: Vec<Value> = req
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                serde_json::json!({
                    "role": match m.role { Role::User => "user", Role::Assistant => "assistant", Role::Tool => "user", Role::System => unreachable!() },
                    "content": m.content,
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "max_tokens": DEFAULT_MAX_TOKENS,
            "messages": messages,
        });
        if !self.is_bedrock() {
            body["model"] = Value::String(self.model_id.clone());
        } else {
            body["anthropic_version"] = Value::String(ANTHROPIC_VERSION.to_string());
        }
        if !system.is_empty() {
            body["system"] = Value::String(system);
        }
        if native_tools {
            body["tools"] = Value::Array(req.tools.iter().map(|t| serde_json::json!({ "name": t.name, "description": t.description, "input_schema": t.parameters })).collect());
        }
        body
    }
}

#[derive(Debug, Deserialize, Default)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone, Copy)]
struct WireUsage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

fn usage_from_wire(usage: Option<WireUsage>) -> Usage {
    usage
        .map(|u| Usage { input_tokens: u.input_tokens, output_tokens: u.output_tokens, total_tokens: match (u.input_tokens, u.output_tokens) { (Some(i), Some(o)) => Some(i + o), _ => None } })
        .unwrap_or_default()
}

fn finish_reason_from_stop(stop_reason: Option<&str>) -> FinishReason {
    match stop_reason {
        Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
        Some("tool_use") => FinishReason::ToolCalls,
        Some("max_tokens") => FinishReason::Length,
        Some(_) | None => FinishReason::Unknown,
    }
}

#[async_trait]
impl LanguageModel for AnthropicDriver {
    async fn do_generate(&self, req: &GenerateRequest, cancel: CancellationToken, timeout: Option<Duration>) -> Result<GenerateResult, ProviderError> {
        let body = self.request_body(req);
        let builder = self.apply_auth(self.http.post(self.endpoint())).json(&body);
        let response = run_with_cancellation(builder.send(), &cancel, timeout).await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::UpstreamHttp { status, body });
        }

        let parsed: MessagesResponse = response.json().await?;
        let usage = usage_from_wire(parsed.usage);

        if req.uses_prompt_shim() {
            let text = parsed.content.into_iter().find_map(|b| match b { ResponseBlock::Text { text } => Some(text), _ => None }).unwrap_or_default();
            return Ok(shim_outcome_to_generate_result(parse_shim_response(&text), usage));
        }

        let mut content = Vec::new();
        let mut saw_tool_use = false;
        for block in parsed.content {
            match block {
                ResponseBlock::Text { text } => content.push(ContentPart::Text { text }),
                ResponseBlock::ToolUse { id, name, input } => {
                    saw_tool_use = true;
                    content.push(ContentPart::ToolCall { tool_call_id: id, tool_name: name, input: input.to_string() });
                }
                ResponseBlock::Other => {}
            }
        }
        let finish_reason = if saw_tool_use { FinishReason::ToolCalls } else { finish_reason_from_stop(parsed.stop_reason.as_deref()) };
        Ok(GenerateResult { content, finish_reason: Some(finish_reason), usage, warnings: Vec::new() })
    }

    async fn do_stream(
        &self,
        req: &GenerateRequest,
        cancel: CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<BoxStream<'static, StreamPart>, ProviderError> {
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
                ContentPart::ToolCall { tool_call_id, tool_name, input } => parts.push(StreamPart::ToolCall { tool_call_id, tool_name, input }),
                ContentPart::Reasoning { text } => parts.push(StreamPart::Raw { value: serde_json::json!({ "reasoning": text }) }),
            }
        }
        parts.push(StreamPart::Finish { finish_reason: result.finish_reason.unwrap_or(FinishReason::Unknown), usage: result.usage });
        Ok(Box::pin(tokio_stream::iter(parts)))
    }
}
