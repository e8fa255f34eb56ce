//! Owiseman model discovery: `GET /v1/models`, OpenAI-style `data[].id`
//! listing, requiring both an `Authorization: Bearer` and an `api-key`
//! header on the request.

use std::collections::BTreeMap;

use forge_protocol::model::{Capabilities, Cost, Limits, Model, ModelStatus};
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
struct ModelsListResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

pub async fn discover_owiseman_models(http: &reqwest::Client, base_url: &str, api_key: Option<&str>) -> Vec<Model> {
    let mut builder = http.get(format!("{}/v1/models", base_url.trim_end_matches('/')));
    if let Some(key) = api_key {
        builder = builder.bearer_auth(key).header("api-key", key);
    }

    let Ok(response) = builder.send().await else { return Vec::new() };
    let Ok(response) = response.error_for_status() else { return Vec::new() };
    let Ok(listing) = response.json::<ModelsListResponse>().await else { return Vec::new() };

    listing.data.into_iter().map(|entry| model_from_id(&entry.id, base_url)).collect()
}

fn model_from_id(id: &str, base_url: &str) -> Model {
    Model {
        provider_id: "owiseman".to_string(),
        model_id: id.to_string(),
        api_id: String::new(),
        upstream_url: Some(base_url.to_string()),
        family: id.to_string(),
        capabilities: Capabilities::default(),
        cost: Cost::default(),
        limits: Limits::default(),
        status: ModelStatus::Active,
        options: BTreeMap::new(),
        headers: BTreeMap::new(),
        release_date: None,
        variants: Vec::new(),
    }
    .with_api_id_default()
}
