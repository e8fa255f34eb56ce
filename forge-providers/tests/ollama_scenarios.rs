use std::time::Duration;

use forge_protocol::stream::{ContentPart, FinishReason, StreamPart};
use forge_providers::backend::LanguageModel;
use forge_providers::drivers::ollama::OllamaDriver;
use forge_providers::request::{GenerateRequest, Message, Role, ToolDefinition};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn ollama_chat_yields_expected_content_usage_and_finish_reason() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "message": {"content": "hello"},
            "prompt_eval_count": 1,
            "eval_count": 1,
            "done": true,
        })))
        .mount(&server)
        .await;

    let driver = OllamaDriver::new(reqwest::Client::new(), server.uri(), "llama3.1:8b-instruct".to_string());
    let req = GenerateRequest { messages: vec![Message { role: Role::User, content: "hi".to_string() }], ..Default::default() };

    let result = driver.do_generate(&req, CancellationToken::new(), Some(Duration::from_secs(5))).await.expect("generate succeeds");

    assert_eq!(result.content, vec![ContentPart::Text { text: "hello".to_string() }]);
    assert_eq!(result.usage.input_tokens, Some(1));
    assert_eq!(result.usage.output_tokens, Some(1));
    assert_eq!(result.usage.total_tokens, Some(2));
    assert_eq!(result.finish_reason, Some(FinishReason::Stop));
}

#[tokio::test]
async fn prompt_mode_tool_call_stream_emits_stream_start_tool_call_then_finish() {
    let server = MockServer::start().await;
    let chunk = serde_json::json!({
        "message": {"content": "{\"opencode\":{\"tool_calls\":[{\"name\":\"ide.hover\",\"arguments\":{\"uri\":\"a.ts\",\"line\":1,\"character\":0}}]}}"},
        "done": true,
    });
    let body = format!("{chunk}\n");
    Mock::given(method("POST")).and(path("/api/chat")).respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson")).mount(&server).await;

    let driver = OllamaDriver::new(reqwest::Client::new(), server.uri(), "llama3.1:8b-instruct".to_string());
    let req = GenerateRequest {
        messages: vec![Message { role: Role::User, content: "hover a.ts:1:0".to_string() }],
        tools: vec![ToolDefinition { name: "ide.hover".to_string(), description: "hover info".to_string(), parameters: serde_json::json!({}) }],
        tool_choice: "auto".to_string(),
        tool_call_mode: forge_protocol::config::ToolCallMode::Prompt,
    };

    let mut stream = driver.do_stream(&req, CancellationToken::new(), Some(Duration::from_secs(5))).await.expect("stream starts");
    let parts: Vec<StreamPart> = (&mut stream).collect().await;

    assert_eq!(parts[0], StreamPart::StreamStart);
    match &parts[1] {
        StreamPart::ToolCall { tool_name, input, .. } => {
            assert_eq!(tool_name, "ide.hover");
            let parsed: serde_json::Value = serde_json::from_str(input).expect("input is JSON");
            assert_eq!(parsed, serde_json::json!({"uri": "a.ts", "line": 1, "character": 0}));
        }
        other => panic!("expected a tool-call part, got {other:?}"),
    }
    assert_eq!(parts.last(), Some(&StreamPart::Finish { finish_reason: FinishReason::ToolCalls, usage: Default::default() }));
}
