//! Ollama model discovery: `GET {baseURL}/api/tags` with a 2.5s timeout.
//! Newly seen model names are synthesized from a template cloned off an
//! existing Ollama entry, falling back to conservative defaults. If
//! discovery fails outright and the registry holds no Ollama models yet, a
//! single fallback entry is synthesized so callers can still address the
//! endpoint.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use forge_protocol::model::{Capabilities, Cost, Limits, Model, ModelStatus};
use serde::Deserialize;

const DISCOVERY_TIMEOUT: Duration = Duration::from_millis(2500);
const FALLBACK_CONTEXT: u64 = 16 * 1024;
const FALLBACK_OUTPUT: u64 = 4 * 1024;
pub const FALLBACK_MODEL_ID: &str = "llama3.1:8b-instruct";

#[derive(Debug, Deserialize, Default)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

pub async fn discover_ollama_models(http: &reqwest::Client, base_url: &str, existing: &[Model], prompt_mode_selected: bool) -> Vec<Model> {
    let fetch = async {
        let response = http.get(format!("{}/api/tags", base_url.trim_end_matches('/'))).send().await?;
        response.error_for_status()?.json::<TagsResponse>().await
    };

    let tags = match tokio::time::timeout(DISCOVERY_TIMEOUT, fetch).await {
        Ok(Ok(tags)) => tags,
        _ => {
            return if existing.is_empty() { vec![fallback_model(base_url)] } else { Vec::new() };
        }
    };

    let known: HashSet<&str> = existing.iter().map(|m| m.model_id.as_str()).collect();
    let template = existing.first();
    tags.models.into_iter().filter(|entry| !known.contains(entry.name.as_str())).map(|entry| model_from_template(&entry.name, base_url, template, prompt_mode_selected)).collect()
}

fn model_from_template(name: &str, base_url: &str, template: Option<&Model>, prompt_mode_selected: bool) -> Model {
    let mut capabilities = template.map(|t| t.capabilities.clone()).unwrap_or_default();
    if template.is_none() {
        capabilities.tool_call = prompt_mode_selected;
    }
    let limits = template.map(|t| t.limits).unwrap_or(Limits { context: Some(FALLBACK_CONTEXT), output: Some(FALLBACK_OUTPUT) });
    let cost = template.map(|t| t.cost).unwrap_or_default();

    Model {
        provider_id: "ollama".to_string(),
        model_id: name.to_string(),
        api_id: String::new(),
        upstream_url: Some(base_url.to_string()),
        family: name.to_string(),
        capabilities,
        cost,
        limits,
        status: ModelStatus::Active,
        options: BTreeMap::new(),
        headers: BTreeMap::new(),
        release_date: None,
        variants: Vec::new(),
    }
    .with_api_id_default()
}

fn fallback_model(base_url: &str) -> Model {
    model_from_template(FALLBACK_MODEL_ID, base_url, None, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_endpoint_with_empty_registry_yields_fallback_model() {
        let http = reqwest::Client::new();
        let models = discover_ollama_models(&http, "http://127.0.0.1:1", &[], false).await;
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].model_id, FALLBACK_MODEL_ID);
    }

    #[tokio::test]
    async fn unreachable_endpoint_with_existing_models_yields_nothing_new() {
        let http = reqwest::Client::new();
        let existing = vec![model_from_template("llama3.1:8b-instruct", "http://127.0.0.1:1", None, false)];
        let models = discover_ollama_models(&http, "http://127.0.0.1:1", &existing, false).await;
        assert!(models.is_empty());
    }
}
