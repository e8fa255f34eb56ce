use forge_protocol::config::ToolCallMode;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// A tool made available to the model for this call, independent of the
/// transport (MCP, built-in) that produced it.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: String,
    pub tool_call_mode: ToolCallMode,
}

impl GenerateRequest {
    pub fn wants_tools(&self) -> bool {
        !self.tools.is_empty()
    }

    pub fn uses_prompt_shim(&self) -> bool {
        self.wants_tools() && self.tool_call_mode == ToolCallMode::Prompt
    }
}
