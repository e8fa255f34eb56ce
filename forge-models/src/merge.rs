use std::collections::{BTreeMap, HashMap};

use forge_protocol::config::RuntimeConfig;
use forge_protocol::model::{Model, ModelStatus, Provider, ProviderSource};
use serde_json::Value;

use crate::registry::Registry;

fn merge_options(into: &mut BTreeMap<String, Value>, from: &BTreeMap<String, Value>) {
    for (key, value) in from {
        into.insert(key.clone(), value.clone());
    }
}

fn apply_config_value_to_model(model: &mut Model, value: &Value) {
    if let Some(limits) = value.get("limits") {
        if let Some(context) = limits.get("context").and_then(Value::as_u64) {
            model.limits.context = Some(context);
        }
        if let Some(output) = limits.get("output").and_then(Value::as_u64) {
            model.limits.output = Some(output);
        }
    }
    if let Some(tool_call) = value.get("tool_call").and_then(Value::as_bool) {
        model.capabilities.tool_call = tool_call;
    }
    if let Some(obj) = value.get("options").and_then(Value::as_object) {
        for (k, v) in obj {
            model.options.insert(k.clone(), v.clone());
        }
    }
}

fn model_from_config_value(provider_id: &str, model_id: &str, value: &Value) -> Model {
    let mut model = Model {
        provider_id: provider_id.to_string(),
        model_id: model_id.to_string(),
        api_id: String::new(),
        upstream_url: None,
        family: model_id.to_string(),
        capabilities: Default::default(),
        cost: Default::default(),
        limits: Default::default(),
        status: ModelStatus::Active,
        options: BTreeMap::new(),
        headers: BTreeMap::new(),
        release_date: None,
        variants: Vec::new(),
    }
    .with_api_id_default();
    apply_config_value_to_model(&mut model, value);
    model
}

fn apply_config_overrides(providers: &mut BTreeMap<String, Provider>, config: &RuntimeConfig) {
    for (provider_id, override_cfg) in &config.providers {
        let provider = providers.entry(provider_id.clone()).or_insert_with(|| Provider {
            id: provider_id.clone(),
            name: provider_id.clone(),
            source: ProviderSource::Config,
            env_var_names: Vec::new(),
            api_key: None,
            options: BTreeMap::new(),
            models: BTreeMap::new(),
        });

        merge_options(&mut provider.options, &override_cfg.options);

        for (model_id, value) in &override_cfg.models {
            match provider.models.get_mut(model_id) {
                Some(existing) => apply_config_value_to_model(existing, value),
                None => {
                    let model = model_from_config_value(provider_id, model_id, value);
                    provider.models.insert(model_id.clone(), model);
                }
            }
        }
    }
}

fn apply_env_credentials(providers: &mut BTreeMap<String, Provider>, env: &HashMap<String, String>) {
    for provider in providers.values_mut() {
        for var_name in &provider.env_var_names {
            if let Some(value) = env.get(var_name).filter(|v| !v.is_empty()) {
                provider.api_key = Some(value.clone());
                provider.source = ProviderSource::Env;
                break;
            }
        }
    }
}

fn apply_stored_api_keys(providers: &mut BTreeMap<String, Provider>, stored_api_keys: &BTreeMap<String, String>) {
    for (provider_id, key) in stored_api_keys {
        if let Some(provider) = providers.get_mut(provider_id) {
            provider.api_key = Some(key.clone());
            provider.source = ProviderSource::Api;
        }
    }
}

fn apply_plugin_options(providers: &mut BTreeMap<String, Provider>, plugin_options: &BTreeMap<String, BTreeMap<String, Value>>) {
    for (provider_id, options) in plugin_options {
        if let Some(provider) = providers.get_mut(provider_id) {
            merge_options(&mut provider.options, options);
            if let Some(key) = options.get("apiKey").and_then(Value::as_str) {
                provider.api_key = Some(key.to_string());
                provider.source = ProviderSource::Custom;
            }
        }
    }
}

fn apply_custom_loader_models(providers: &mut BTreeMap<String, Provider>, discovered: &BTreeMap<String, Vec<Model>>) {
    for (provider_id, models) in discovered {
        if let Some(provider) = providers.get_mut(provider_id) {
            for model in models {
                provider.models.entry(model.model_id.clone()).or_insert_with(|| model.clone());
            }
        }
    }
}

fn apply_filters(providers: &mut BTreeMap<String, Provider>, config: &RuntimeConfig) {
    providers.retain(|id, _| !config.disabled_providers.contains(id));
    if let Some(enabled) = &config.enabled_providers {
        providers.retain(|id, _| enabled.contains(id));
    }

    for (provider_id, provider) in providers.iter_mut() {
        let Some(override_cfg) = config.providers.get(provider_id) else { continue };
        if !override_cfg.whitelist.is_empty() {
            provider.models.retain(|model_id, _| override_cfg.whitelist.contains(model_id));
        }
        for blocked in &override_cfg.blacklist {
            provider.models.remove(blocked);
        }
    }

    for provider in providers.values_mut() {
        provider.models.retain(|_, model| !model.is_prunable(config.allow_experimental));
        for model in provider.models.values_mut() {
            model.variants.retain(|v| !v.disabled);
        }
    }

    // A provider that declares credential env vars but never received one
    // (env, stored, or plugin) has no way to authenticate and is dropped.
    // Providers with no declared env vars (local endpoints like Ollama) are
    // autoloaded without a credential.
    providers.retain(|_, provider| provider.api_key.is_some() || provider.env_var_names.is_empty());

    providers.retain(|_, provider| provider.has_surviving_models());
}

/// Runs the eight-stage ordered merge. Each stage's input overrides the
/// prior stage's output where keys overlap; this order is load-bearing and
/// must not be reshuffled.
pub fn build_registry(
    config: &RuntimeConfig,
    env: &HashMap<String, String>,
    stored_api_keys: &BTreeMap<String, String>,
    plugin_options: &BTreeMap<String, BTreeMap<String, Value>>,
    discovered_models: &BTreeMap<String, Vec<Model>>,
) -> Registry {
    let mut providers: BTreeMap<String, Provider> = crate::bundled::bundled_database()
        .into_iter()
        .map(|p| (p.id.clone(), p))
        .collect();

    apply_config_overrides(&mut providers, config); // stage 2
    apply_env_credentials(&mut providers, env); // stage 3
    apply_stored_api_keys(&mut providers, stored_api_keys); // stage 4
    apply_plugin_options(&mut providers, plugin_options); // stage 5
    apply_custom_loader_models(&mut providers, discovered_models); // stage 6
    apply_config_overrides(&mut providers, config); // stage 7: config override pass 2
    apply_filters(&mut providers, config); // stage 8

    Registry { providers }
}
