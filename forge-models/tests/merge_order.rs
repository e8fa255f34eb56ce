use std::collections::{BTreeMap, BTreeSet, HashMap};

use forge_models::build_registry;
use forge_protocol::config::{ConfigProviderOverride, RuntimeConfig};

fn config() -> RuntimeConfig {
    RuntimeConfig::default()
}

#[test]
fn env_credential_sets_source_and_api_key() {
    let cfg = config();
    let mut env = HashMap::new();
    env.insert("ANTHROPIC_API_KEY".to_string(), "sk-test".to_string());

    let registry = build_registry(&cfg, &env, &BTreeMap::new(), &BTreeMap::new(), &BTreeMap::new());
    let provider = registry.providers().find(|p| p.id == "anthropic").expect("anthropic provider present");
    assert_eq!(provider.api_key.as_deref(), Some("sk-test"));
}

#[test]
fn stored_api_key_overrides_env_credential() {
    let cfg = config();
    let mut env = HashMap::new();
    env.insert("ANTHROPIC_API_KEY".to_string(), "from-env".to_string());
    let mut stored = BTreeMap::new();
    stored.insert("anthropic".to_string(), "from-store".to_string());

    let registry = build_registry(&cfg, &env, &stored, &BTreeMap::new(), &BTreeMap::new());
    let provider = registry.providers().find(|p| p.id == "anthropic").expect("anthropic provider present");
    assert_eq!(provider.api_key.as_deref(), Some("from-store"));
}

#[test]
fn disabled_provider_is_filtered_out() {
    let mut cfg = config();
    cfg.disabled_providers.insert("openai".to_string());

    let registry = build_registry(&cfg, &HashMap::new(), &BTreeMap::new(), &BTreeMap::new(), &BTreeMap::new());
    assert!(registry.providers().all(|p| p.id != "openai"));
}

#[test]
fn enabled_providers_allowlist_restricts_to_named_set() {
    let mut cfg = config();
    cfg.enabled_providers = Some(BTreeSet::from(["anthropic".to_string()]));
    let mut env = HashMap::new();
    env.insert("ANTHROPIC_API_KEY".to_string(), "sk-test".to_string());

    let registry = build_registry(&cfg, &env, &BTreeMap::new(), &BTreeMap::new(), &BTreeMap::new());
    let names: Vec<_> = registry.providers().map(|p| p.id.clone()).collect();
    assert_eq!(names, vec!["anthropic".to_string()]);
}

#[test]
fn whitelist_restricts_models_blacklist_removes_them() {
    let mut cfg = config();
    cfg.providers.insert(
        "anthropic".to_string(),
        ConfigProviderOverride {
            whitelist: BTreeSet::from(["claude-sonnet-4".to_string(), "claude-haiku-4-5".to_string()]),
            blacklist: BTreeSet::from(["claude-haiku-4-5".to_string()]),
            ..Default::default()
        },
    );
    let mut env = HashMap::new();
    env.insert("ANTHROPIC_API_KEY".to_string(), "sk-test".to_string());

    let registry = build_registry(&cfg, &env, &BTreeMap::new(), &BTreeMap::new(), &BTreeMap::new());
    let provider = registry.providers().find(|p| p.id == "anthropic").expect("anthropic provider present");
    let ids: Vec<_> = provider.models.keys().cloned().collect();
    assert_eq!(ids, vec!["claude-sonnet-4".to_string()]);
}

#[test]
fn default_model_honors_pinned_override() {
    let mut cfg = config();
    cfg.model = Some("openai/gpt-5-mini".to_string());
    let mut env = HashMap::new();
    env.insert("OPENAI_API_KEY".to_string(), "sk-test".to_string());
    let registry = build_registry(&cfg, &env, &BTreeMap::new(), &BTreeMap::new(), &BTreeMap::new());
    let model = registry.default_model(cfg.model.as_deref()).expect("pinned model resolves");
    assert_eq!(model.qualified_id(), "openai/gpt-5-mini");
}

#[test]
fn default_model_without_pin_picks_priority_entry_of_first_provider() {
    let cfg = config();
    let mut env = HashMap::new();
    env.insert("ANTHROPIC_API_KEY".to_string(), "sk-test".to_string());
    let registry = build_registry(&cfg, &env, &BTreeMap::new(), &BTreeMap::new(), &BTreeMap::new());
    let model = registry.default_model(None).expect("a default model exists");
    // "anthropic" sorts first among the bundled providers; its priority
    // entry is claude-sonnet-4.
    assert_eq!(model.qualified_id(), "anthropic/claude-sonnet-4");
}

#[test]
fn provider_without_any_credential_is_absent_from_the_registry() {
    let cfg = config();
    let registry = build_registry(&cfg, &HashMap::new(), &BTreeMap::new(), &BTreeMap::new(), &BTreeMap::new());
    // No env/stored/plugin credential was supplied for any of the
    // credentialed bundled providers; only Ollama (a local endpoint with no
    // declared env vars) survives.
    let names: Vec<_> = registry.providers().map(|p| p.id.clone()).collect();
    assert_eq!(names, vec!["ollama".to_string()]);
}

#[test]
fn plugin_supplied_api_key_counts_as_a_credential() {
    let cfg = config();
    let mut plugin_options = BTreeMap::new();
    plugin_options.insert("openai".to_string(), BTreeMap::from([("apiKey".to_string(), serde_json::Value::String("sk-plugin".to_string()))]));

    let registry = build_registry(&cfg, &HashMap::new(), &BTreeMap::new(), &plugin_options, &BTreeMap::new());
    let provider = registry.providers().find(|p| p.id == "openai").expect("openai survives via plugin credential");
    assert_eq!(provider.api_key.as_deref(), Some("sk-plugin"));
}

#[test]
fn small_model_applies_opencode_override() {
    let mut cfg = config();
    cfg.enabled_providers = Some(BTreeSet::from(["opencode".to_string()]));
    let mut env = HashMap::new();
    env.insert("OPENCODE_API_KEY".to_string(), "sk-test".to_string());
    let registry = build_registry(&cfg, &env, &BTreeMap::new(), &BTreeMap::new(), &BTreeMap::new());
    let model = registry.small_model(None).expect("opencode restricts to gpt-5-nano");
    assert_eq!(model.qualified_id(), "opencode/gpt-5-nano");
}

#[test]
fn unknown_pinned_model_reports_suggestions() {
    let cfg = config();
    let registry = build_registry(&cfg, &HashMap::new(), &BTreeMap::new(), &BTreeMap::new(), &BTreeMap::new());
    let err = registry.default_model(Some("anthropic/clawd-sonet")).unwrap_err();
    match err {
        forge_models::RegistryError::ModelNotFound { suggestions, .. } => {
            assert!(!suggestions.is_empty());
        }
        other => panic!("expected ModelNotFound, got {other:?}"),
    }
}
