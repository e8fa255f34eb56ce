//! Ollama `/api/chat` driver. Grounded in end-to-end scenarios 1 and 2: a
//! non-streaming call maps `{message:{content}, prompt_eval_count,
//! eval_count, done}` onto `GenerateResult`, and streaming mode accumulates
//! text silently when the prompt-shim is active, parsing once at `done:true`.

use std::time::Duration;

use async_trait::async_trait;
use forge_protocol::stream::{ContentPart, FinishReason, GenerateResult, StreamPart, Usage};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::backend::LanguageModel;
use crate::cancellation::run_with_cancellation;
use crate::error::ProviderError;
use crate::request::{GenerateRequest, Role};
use crate::shim::{parse_shim_response, shim_outcome_to_generate_result, shim_outcome_to_stream_parts};

pub struct OllamaDriver {
    http: reqwest::Client,
    base_url: String,
    model_id: String,
}

impl OllamaDriver {
    pub fn new(http: reqwest::Client, base_url: String, model_id: String) -> Self {
        Self { http, base_url, model_id }
    }

    fn wire_messages(&self, req: &GenerateRequest) -> Vec<OllamaMessage> {
        req.messages
            .iter()
            .map(|m| OllamaMessage {
                role: match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                }
                .to_string(),
                content: m.content.clone(),
            })
            .collect()
    }

    fn request_body(&self, req: &GenerateRequest, stream: bool) -> Value {
        let use_shim = req.uses_prompt_shim();
        let mut body = serde_json::json!({
            "model": self.model_id,
            "messages": self.wire_messages(req),
            "stream": stream,
        });
        if use_shim {
            body["format"] = Value::String("json".to_string());
        }
        body
    }
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize, Default)]
struct OllamaChatChunk {
    #[serde(default)]
    message: Option<OllamaResponseMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
}

fn usage_from_counts(prompt: Option<u64>, eval: Option<u64>) -> Usage {
    Usage { input_tokens: prompt, output_tokens: eval, total_tokens: match (prompt, eval) { (Some(p), Some(e)) => Some(p + e), _ => None } }
}

#[async_trait]
impl LanguageModel for OllamaDriver {
    async fn do_generate(&self, req: &GenerateRequest, cancel: CancellationToken, timeout: Option<Duration>) -> Result<GenerateResult, ProviderError> {
        let body = self.request_body(req, false);
        let response = run_with_cancellation(self.http.post(format!("{}/api/chat", self.base_url)).json(&body).send(), &cancel, timeout).await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::UpstreamHttp { status, body });
        }

        let chunk: OllamaChatChunk = response.json().await?;
        let usage = usage_from_counts(chunk.prompt_eval_count, chunk.eval_count);
        let content = chunk.message.unwrap_or_default().content;

        if req.uses_prompt_shim() {
            Ok(shim_outcome_to_generate_result(parse_shim_response(&content), usage))
        } else {
            Ok(GenerateResult { content: vec![ContentPart::Text { text: content }], finish_reason: Some(FinishReason::Stop), usage, warnings: Vec::new() })
        }
    }

    async fn do_stream(
        &self,
        req: &GenerateRequest,
        cancel: CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<BoxStream<'static, StreamPart>, ProviderError> {
        let body = self.request_body(req, true);
        let response = run_with_cancellation(self.http.post(format!("{}/api/chat", self.base_url)).json(&body).send(), &cancel, timeout).await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::UpstreamHttp { status, body });
        }

        let use_shim = req.uses_prompt_shim();
        let byte_stream = response.bytes_stream().map_err(ProviderError::Transport);

        let parts = ndjson_chat_chunks(byte_stream)
            .await?
            .into_iter()
            .fold((String::new(), Vec::new()), |(mut acc, mut emitted), chunk| {
                let delta = chunk.message.unwrap_or_default().content;
                if use_shim {
                    acc.push_str(&delta);
                    if chunk.done {
                        let usage = usage_from_counts(chunk.prompt_eval_count, chunk.eval_count);
                        emitted.extend(shim_outcome_to_stream_parts(parse_shim_response(&acc), usage));
                    }
                } else {
                    if emitted.is_empty() {
                        emitted.push(StreamPart::StreamStart);
                        emitted.push(StreamPart::TextStart { id: "0".to_string() });
                    }
                    if !delta.is_empty() {
                        emitted.push(StreamPart::TextDelta { id: "0".to_string(), delta });
                    }
                    if chunk.done {
                        emitted.push(StreamPart::TextEnd { id: "0".to_string() });
                        let usage = usage_from_counts(chunk.prompt_eval_count, chunk.eval_count);
                        emitted.push(StreamPart::Finish { finish_reason: FinishReason::Stop, usage });
                    }
                }
                (acc, emitted)
            })
            .1;

        Ok(Box::pin(tokio_stream::iter(parts)))
    }
}

/// Reads newline-delimited JSON chat chunks off a byte stream, buffering
/// partial lines across network reads.
async fn ndjson_chat_chunks<S>(mut stream: S) -> Result<Vec<OllamaChatChunk>, ProviderError>
where
    S: futures::Stream<Item = Result<bytes::Bytes, ProviderError>> + Unpin,
{
    let mut buffer = String::new();
    let mut chunks = Vec::new();
    while let Some(bytes) = stream.next().await {
        let bytes = bytes?;
        buffer.push_str(&String::from_utf8_lossy(&bytes));
        while let Some(pos) = buffer.find('\n') {
            let line = buffer[..pos].trim().to_string();
            buffer.drain(..=pos);
            if line.is_empty() {
                continue;
            }
            if let Ok(chunk) = serde_json::from_str::<OllamaChatChunk>(&line) {
                chunks.push(chunk);
            }
        }
    }
    let trailing = buffer.trim();
    if !trailing.is_empty() {
        if let Ok(chunk) = serde_json::from_str::<OllamaChatChunk>(trailing) {
            chunks.push(chunk);
        }
    }
    Ok(chunks)
}
