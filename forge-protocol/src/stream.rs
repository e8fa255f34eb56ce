use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    ContentFilter,
    Error,
    Unknown,
}

/// One element of `doGenerate`'s `content[]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ContentPart {
    Text { text: String },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        input: String,
    },
    Reasoning { text: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateResult {
    pub content: Vec<ContentPart>,
    pub finish_reason: Option<FinishReason>,
    pub usage: Usage,
    pub warnings: Vec<String>,
}

/// Tagged with an explicit `kind` field so unknown future variants can be
/// ignored by consumers coded against the known tag set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StreamPart {
    StreamStart,
    TextStart { id: String },
    TextDelta { id: String, delta: String },
    TextEnd { id: String },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        input: String,
    },
    Finish { finish_reason: FinishReason, usage: Usage },
    Error { message: String },
    Raw { value: serde_json::Value },
}
