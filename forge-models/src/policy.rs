use forge_protocol::model::Provider;

pub const DEFAULT_MODEL_PRIORITY: &[&str] = &["gpt-5", "claude-sonnet-4", "gemini-3-pro"];
pub const SMALL_MODEL_PRIORITY: &[&str] =
    &["claude-haiku-4-5", "3-5-haiku", "gemini-3-flash", "gemini-2.5-flash", "gpt-5-nano"];

/// Priority order actually applied for this provider's small-model search.
/// `opencode` and `github-copilot*` override the default priority list.
pub fn small_model_priority_for(provider_id: &str) -> Vec<&'static str> {
    if provider_id == "opencode" {
        vec!["gpt-5-nano"]
    } else if provider_id.starts_with("github-copilot") {
        vec!["gpt-5-mini", "claude-haiku-4-5", "3-5-haiku", "gemini-3-flash", "gemini-2.5-flash", "gpt-5-nano"]
    } else {
        SMALL_MODEL_PRIORITY.to_vec()
    }
}

/// Picks the highest-priority model id within a provider's surviving models,
/// falling back to alphabetical order when nothing on the priority list
/// matches.
pub fn best_by_priority<'a>(provider: &'a Provider, priority: &[&str]) -> Option<&'a str> {
    for term in priority {
        if let Some(model_id) = provider.models.keys().find(|id| id.contains(term)) {
            return Some(model_id.as_str());
        }
    }
    provider.models.keys().next().map(String::as_str)
}
