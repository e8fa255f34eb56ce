//! Prompt-engineered tool-calling shim: the only route by which a backend
//! without native tool support can participate in tool loops. The model is
//! instructed to emit exactly one JSON object of one of two shapes and the
//! response is parsed leniently back into the same `ContentPart`/`StreamPart`
//! vocabulary native tool-calling backends produce.

use std::fmt::Write as _;

use forge_protocol::stream::{ContentPart, FinishReason, GenerateResult, StreamPart, Usage};
use serde_json::Value;
use uuid::Uuid;

use crate::request::ToolDefinition;

pub fn build_shim_system_message(tools: &[ToolDefinition], tool_choice: &str) -> String {
    let mut listing = String::new();
    for tool in tools {
        let _ = writeln!(
            listing,
            "- {{\"name\": {:?}, \"description\": {:?}, \"parameters\": {}}}",
            tool.name, tool.description, tool.parameters
        );
    }
    format!(
        "Respond with exactly one JSON object and nothing else. To call one or \
         more tools, emit {{\"opencode\":{{\"tool_calls\":[{{\"name\":\"<tool>\",\"arguments\":{{...}}}}]}}}}. \
         To answer directly, emit {{\"opencode\":{{\"final\":\"<text>\"}}}}.\n\
         tool_choice: {tool_choice}\nAvailable tools:\n{listing}"
    )
}

/// Finds the first balanced `{...}` substring, tracking string literals so
/// braces inside quoted text don't throw off the depth count.
pub fn extract_balanced_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escape = false;
    for (i, &byte) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escape {
                escape = false;
            } else if byte == b'\\' {
                escape = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShimOutcome {
    ToolCalls(Vec<(String, Value)>),
    Text(String),
}

/// Parses a shim-formatted response. Falls back to treating the whole input
/// as the final text when no balanced JSON object is found or it doesn't
/// parse, per the "deliberately lenient" extraction rule.
pub fn parse_shim_response(raw: &str) -> ShimOutcome {
    let Some(json_str) = extract_balanced_json(raw) else {
        return ShimOutcome::Text(raw.to_string());
    };
    let Ok(value) = serde_json::from_str::<Value>(json_str) else {
        return ShimOutcome::Text(raw.to_string());
    };
    let opencode = value.get("opencode").unwrap_or(&value);

    let calls = ["tool_calls", "toolCalls", "toolcalls"]
        .into_iter()
        .find_map(|key| opencode.get(key))
        .and_then(Value::as_array);
    if let Some(entries) = calls {
        let parsed: Vec<(String, Value)> = entries
            .iter()
            .filter_map(|entry| {
                let name = entry.get("name")?.as_str()?.to_string();
                let arguments = entry.get("arguments").cloned().unwrap_or_else(|| Value::Object(Default::default()));
                Some((name, arguments))
            })
            .collect();
        if !parsed.is_empty() {
            return ShimOutcome::ToolCalls(parsed);
        }
    }

    let text = ["final", "content", "text"]
        .into_iter()
        .find_map(|key| opencode.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| raw.to_string());
    ShimOutcome::Text(text)
}

pub fn shim_outcome_to_generate_result(outcome: ShimOutcome, usage: Usage) -> GenerateResult {
    match outcome {
        ShimOutcome::ToolCalls(calls) => GenerateResult {
            content: calls
                .into_iter()
                .map(|(tool_name, arguments)| ContentPart::ToolCall {
                    tool_call_id: Uuid::new_v4().to_string(),
                    tool_name,
                    input: arguments.to_string(),
                })
                .collect(),
            finish_reason: Some(FinishReason::ToolCalls),
            usage,
            warnings: Vec::new(),
        },
        ShimOutcome::Text(text) => {
            GenerateResult { content: vec![ContentPart::Text { text }], finish_reason: Some(FinishReason::Stop), usage, warnings: Vec::new() }
        }
    }
}

pub fn shim_outcome_to_stream_parts(outcome: ShimOutcome, usage: Usage) -> Vec<StreamPart> {
    let mut parts = vec![StreamPart::StreamStart];
    match outcome {
        ShimOutcome::ToolCalls(calls) => {
            for (tool_name, arguments) in calls {
                parts.push(StreamPart::ToolCall { tool_call_id: Uuid::new_v4().to_string(), tool_name, input: arguments.to_string() });
            }
            parts.push(StreamPart::Finish { finish_reason: FinishReason::ToolCalls, usage });
        }
        ShimOutcome::Text(text) => {
            let id = Uuid::new_v4().to_string();
            parts.push(StreamPart::TextStart { id: id.clone() });
            parts.push(StreamPart::TextDelta { id: id.clone(), delta: text });
            parts.push(StreamPart::TextEnd { id });
            parts.push(StreamPart::Finish { finish_reason: FinishReason::Stop, usage });
        }
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_balanced_object_ignoring_braces_in_strings() {
        let raw = r#"prefix {"opencode":{"final":"a { b } c"}} suffix {"ignored":true}"#;
        let extracted = extract_balanced_json(raw).expect("balanced object found");
        assert_eq!(extracted, r#"{"opencode":{"final":"a { b } c"}}"#);
    }

    #[test]
    fn parses_tool_calls_shape() {
        let raw = r#"{"opencode":{"tool_calls":[{"name":"ide.hover","arguments":{"uri":"a.ts"}}]}}"#;
        let outcome = parse_shim_response(raw);
        match outcome {
            ShimOutcome::ToolCalls(calls) => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].0, "ide.hover");
                assert_eq!(calls[0].1, serde_json::json!({"uri": "a.ts"}));
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    #[test]
    fn tolerates_camel_case_tool_calls_key() {
        let raw = r#"{"opencode":{"toolCalls":[{"name":"t","arguments":{}}]}}"#;
        assert!(matches!(parse_shim_response(raw), ShimOutcome::ToolCalls(_)));
    }

    #[test]
    fn falls_back_to_final_text() {
        let raw = r#"{"opencode":{"final":"hello there"}}"#;
        assert_eq!(parse_shim_response(raw), ShimOutcome::Text("hello there".to_string()));
    }

    #[test]
    fn falls_back_to_raw_text_when_no_json_object_present() {
        let raw = "just plain text, no braces here";
        assert_eq!(parse_shim_response(raw), ShimOutcome::Text(raw.to_string()));
    }

    #[test]
    fn round_trip_tool_call_from_echoed_system_instructions() {
        let tools = vec![ToolDefinition { name: "t".to_string(), description: "d".to_string(), parameters: serde_json::json!({}) }];
        let system = build_shim_system_message(&tools, "auto");
        assert!(system.contains("tool_choice: auto"));
        let echoed = r#"{"opencode":{"tool_calls":[{"name":"t","arguments":{}}]}}"#;
        match parse_shim_response(echoed) {
            ShimOutcome::ToolCalls(calls) => assert_eq!(calls[0].0, "t"),
            other => panic!("expected tool call, got {other:?}"),
        }
    }
}
