use std::collections::{BTreeMap, BTreeSet};

use forge_protocol::model::{Capabilities, Cost, Limits, Model, Modality, ModelStatus, Provider, ProviderSource};

fn text_model(
    provider_id: &str,
    model_id: &str,
    family: &str,
    status: ModelStatus,
    context: u64,
    output: u64,
    tool_call: bool,
    reasoning: bool,
) -> Model {
    Model {
        provider_id: provider_id.to_string(),
        model_id: model_id.to_string(),
        api_id: model_id.to_string(),
        upstream_url: None,
        family: family.to_string(),
        capabilities: Capabilities {
            input_modalities: BTreeSet::from([Modality::Text]),
            output_modalities: BTreeSet::from([Modality::Text]),
            tool_call,
            reasoning,
            interleaved_reasoning: None,
        },
        cost: Cost::default(),
        limits: Limits { context: Some(context), output: Some(output) },
        status,
        options: BTreeMap::new(),
        headers: BTreeMap::new(),
        release_date: None,
        variants: Vec::new(),
    }
}

fn provider(id: &str, name: &str, env_var_names: &[&str], models: Vec<Model>) -> Provider {
    Provider {
        id: id.to_string(),
        name: name.to_string(),
        source: ProviderSource::Config,
        env_var_names: env_var_names.iter().map(|s| s.to_string()).collect(),
        api_key: None,
        options: BTreeMap::new(),
        models: models.into_iter().map(|m| (m.model_id.clone(), m)).collect(),
    }
}

/// Static seed catalog of providers x models. A real deployment's bundled
/// database is generated from an upstream pricing/capability feed; this is
/// a representative subset covering the families the rest of the registry
/// logic (priority lists, fuzzy search, filters) is tested against.
pub fn bundled_database() -> Vec<Provider> {
    vec![
        provider(
            "anthropic",
            "Anthropic",
            &["ANTHROPIC_API_KEY"],
            vec![
                text_model("anthropic", "claude-sonnet-4", "claude-sonnet-4", ModelStatus::Active, 200_000, 8_192, true, true),
                text_model("anthropic", "claude-haiku-4-5", "claude-haiku-4-5", ModelStatus::Active, 200_000, 8_192, true, false),
                text_model("anthropic", "claude-3-5-haiku", "claude-3-5-haiku", ModelStatus::Active, 200_000, 8_192, true, false),
            ],
        ),
        provider(
            "openai",
            "OpenAI",
            &["OPENAI_API_KEY"],
            vec![
                text_model("openai", "gpt-5", "gpt-5", ModelStatus::Active, 400_000, 16_384, true, true),
                text_model("openai", "gpt-5-mini", "gpt-5", ModelStatus::Active, 400_000, 16_384, true, true),
                text_model("openai", "gpt-5-nano", "gpt-5", ModelStatus::Active, 400_000, 16_384, true, false),
            ],
        ),
        provider(
            "google",
            "Google",
            &["GOOGLE_API_KEY", "GEMINI_API_KEY"],
            vec![
                text_model("google", "gemini-3-pro", "gemini-3", ModelStatus::Active, 1_000_000, 8_192, true, true),
                text_model("google", "gemini-3-flash", "gemini-3", ModelStatus::Active, 1_000_000, 8_192, true, false),
                text_model("google", "gemini-2.5-flash", "gemini-2.5", ModelStatus::Active, 1_000_000, 8_192, true, false),
            ],
        ),
        provider("opencode", "opencode", &["OPENCODE_API_KEY"], vec![
            text_model("opencode", "gpt-5-nano", "gpt-5", ModelStatus::Active, 400_000, 16_384, true, false),
        ]),
        provider("github-copilot", "GitHub Copilot", &["GITHUB_COPILOT_TOKEN"], vec![
            text_model("github-copilot", "gpt-5-mini", "gpt-5", ModelStatus::Active, 128_000, 8_192, true, false),
            text_model("github-copilot", "claude-haiku-4-5", "claude-haiku-4-5", ModelStatus::Active, 128_000, 8_192, true, false),
        ]),
        provider("ollama", "Ollama", &[], vec![
            text_model("ollama", "llama3.1:8b-instruct", "llama3.1", ModelStatus::Active, 16_384, 4_096, false, false),
        ]),
    ]
}
