use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Input/output modality a model can consume or produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Audio,
    Image,
    Video,
    Pdf,
}

/// Whether a model exposes interleaved (tool-call-interspersed) reasoning as
/// a plain boolean or under a named field in the wire payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InterleavedReasoning {
    Flag(bool),
    TaggedField(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub input_modalities: BTreeSet<Modality>,
    pub output_modalities: BTreeSet<Modality>,
    pub tool_call: bool,
    pub reasoning: bool,
    pub interleaved_reasoning: Option<InterleavedReasoning>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            input_modalities: BTreeSet::from([Modality::Text]),
            output_modalities: BTreeSet::from([Modality::Text]),
            tool_call: false,
            reasoning: false,
            interleaved_reasoning: None,
        }
    }
}

/// Per-million-token rates. `None` means the rate is unknown/unpriced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    pub input: Option<f64>,
    pub output: Option<f64>,
    pub cache_read: Option<f64>,
    pub cache_write: Option<f64>,
    /// Override rates applied once the prompt exceeds 200K tokens.
    pub over_200k: Option<Box<Cost>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub context: Option<u64>,
    pub output: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Alpha,
    Beta,
    Active,
    Deprecated,
}

/// A named parameter overlay applied to a base model (reasoning-enabled,
/// extended-context, ...) surfaced as its own selectable entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    pub capabilities: Option<Capabilities>,
    pub cost: Option<Cost>,
    pub limits: Option<Limits>,
    pub options: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub provider_id: String,
    pub model_id: String,
    /// Upstream wire identifier; defaults to `model_id` when absent.
    pub api_id: String,
    pub upstream_url: Option<String>,
    pub family: String,
    pub capabilities: Capabilities,
    pub cost: Cost,
    pub limits: Limits,
    pub status: ModelStatus,
    pub options: BTreeMap<String, serde_json::Value>,
    pub headers: BTreeMap<String, String>,
    pub release_date: Option<chrono::NaiveDate>,
    pub variants: Vec<Variant>,
}

impl Model {
    /// `apiID` is non-empty, defaulting to `modelID` per the data model
    /// invariant.
    pub fn with_api_id_default(mut self) -> Self {
        if self.api_id.is_empty() {
            self.api_id = self.model_id.clone();
        }
        self
    }

    pub fn is_prunable(&self, allow_experimental: bool) -> bool {
        match self.status {
            ModelStatus::Deprecated => true,
            ModelStatus::Alpha => !allow_experimental,
            ModelStatus::Beta | ModelStatus::Active => false,
        }
    }

    /// `"<providerID>/<modelID>"` — the identifier surfaced to the client.
    pub fn qualified_id(&self) -> String {
        format!("{}/{}", self.provider_id, self.model_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderSource {
    Env,
    Config,
    Custom,
    Api,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub name: String,
    pub source: ProviderSource,
    pub env_var_names: Vec<String>,
    pub api_key: Option<String>,
    pub options: BTreeMap<String, serde_json::Value>,
    pub models: BTreeMap<String, Model>,
}

impl Provider {
    /// A provider with zero surviving models is dropped by the registry.
    pub fn has_surviving_models(&self) -> bool {
        !self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_id_defaults_to_model_id() {
        let m = Model {
            provider_id: "openai".into(),
            model_id: "gpt-5".into(),
            api_id: String::new(),
            upstream_url: None,
            family: "gpt-5".into(),
            capabilities: Capabilities::default(),
            cost: Cost::default(),
            limits: Limits::default(),
            status: ModelStatus::Active,
            options: BTreeMap::new(),
            headers: BTreeMap::new(),
            release_date: None,
            variants: Vec::new(),
        }
        .with_api_id_default();
        assert_eq!(m.api_id, "gpt-5");
    }

    #[test]
    fn deprecated_always_prunable() {
        let mut m = sample_model();
        m.status = ModelStatus::Deprecated;
        assert!(m.is_prunable(true));
        assert!(m.is_prunable(false));
    }

    #[test]
    fn alpha_prunable_unless_experimental() {
        let mut m = sample_model();
        m.status = ModelStatus::Alpha;
        assert!(m.is_prunable(false));
        assert!(!m.is_prunable(true));
    }

    fn sample_model() -> Model {
        Model {
            provider_id: "p".into(),
            model_id: "m".into(),
            api_id: "m".into(),
            upstream_url: None,
            family: "m".into(),
            capabilities: Capabilities::default(),
            cost: Cost::default(),
            limits: Limits::default(),
            status: ModelStatus::Active,
            options: BTreeMap::new(),
            headers: BTreeMap::new(),
            release_date: None,
            variants: Vec::new(),
        }
    }
}
