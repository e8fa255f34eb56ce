use std::collections::{HashMap, HashSet};

use serde_json::Value;
use sha1::{Digest, Sha1};
use tracing::warn;

/// Models require tool names to conform to `^[a-zA-Z0-9_-]+$`, so the
/// delimiter between MCP name and tool name must come from that set.
const TOOL_NAME_DELIMITER: &str = "_";
const MAX_TOOL_NAME_LENGTH: usize = 64;

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub mcp_name: String,
    pub tool_name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() { "_".to_string() } else { out }
}

fn sha1_hex(s: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(s.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Qualifies every tool as `"<mcpName>_<toolName>"`, sanitizing to the
/// model-safe character set and truncating with a stable hash suffix on
/// collision or length overflow. Tools are never silently dropped into the
/// same key: a name that's already taken is skipped with a warning rather
/// than overwritten.
pub fn qualify_tools<I>(tools: I) -> HashMap<String, ToolSpec>
where
    I: IntoIterator<Item = ToolSpec>,
{
    let mut used_names = HashSet::new();
    let mut seen_raw = HashSet::new();
    let mut qualified = HashMap::new();

    for tool in tools {
        let raw = format!("{}{TOOL_NAME_DELIMITER}{}", tool.mcp_name, tool.tool_name);
        if !seen_raw.insert(raw.clone()) {
            warn!(name = %raw, "skipping duplicated tool");
            continue;
        }

        let mut qualified_name = sanitize(&raw);
        if qualified_name.len() > MAX_TOOL_NAME_LENGTH {
            let hash = sha1_hex(&raw);
            let prefix_len = MAX_TOOL_NAME_LENGTH - hash.len();
            qualified_name = format!("{}{hash}", &qualified_name[..prefix_len]);
        }

        if used_names.contains(&qualified_name) {
            warn!(name = %qualified_name, "skipping duplicated tool after sanitization");
            continue;
        }

        used_names.insert(qualified_name.clone());
        qualified.insert(qualified_name, tool);
    }

    qualified
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(mcp: &str, name: &str) -> ToolSpec {
        ToolSpec {
            mcp_name: mcp.to_string(),
            tool_name: name.to_string(),
            description: None,
            input_schema: Value::Null,
        }
    }

    #[test]
    fn distinct_servers_get_distinct_qualified_names() {
        let qualified = qualify_tools([tool("serverA", "search"), tool("serverB", "search")]);
        assert!(qualified.contains_key("serverA_search"));
        assert!(qualified.contains_key("serverB_search"));
    }

    #[test]
    fn duplicate_raw_name_is_skipped_not_overwritten() {
        let qualified = qualify_tools([tool("serverA", "search"), tool("serverA", "search")]);
        assert_eq!(qualified.len(), 1);
    }

    #[test]
    fn names_longer_than_limit_are_hashed() {
        let long_tool = "t".repeat(100);
        let qualified = qualify_tools([tool("server", &long_tool)]);
        let (name, _) = qualified.into_iter().next().expect("one tool");
        assert!(name.len() <= MAX_TOOL_NAME_LENGTH);
    }

    #[test]
    fn disallowed_characters_are_sanitized() {
        let qualified = qualify_tools([tool("server.name", "tool.name")]);
        let (name, _) = qualified.into_iter().next().expect("one tool");
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
    }
}
