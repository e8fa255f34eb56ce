use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use forge_credentials::CredentialStore;
use forge_events::EventBus;
use forge_mcp::McpManager;
use forge_models::Registry;
use forge_protocol::model::{Model, Provider};
use forge_protocol::RuntimeConfig;
use forge_providers::AdapterRegistry;
use forge_pty::PtyMultiplexer;
use serde_json::Value;

use crate::error::RuntimeError;

/// Everything the runtime's components need wired together: a credential
/// store, an OAuth-capable MCP manager, a merged model registry, a
/// memoized backend-adapter cache, a PTY multiplexer, and the event bus
/// they all publish onto. This crate does not parse config files or CLI
/// args; the embedding application resolves `RuntimeConfig` and the
/// credential/discovery inputs and hands them in.
pub struct Runtime {
    pub config: RuntimeConfig,
    pub events: Arc<EventBus>,
    pub credentials: Arc<CredentialStore>,
    pub mcp: McpManager,
    pub pty: PtyMultiplexer,
    pub registry: Registry,
    pub adapters: AdapterRegistry,
}

/// Inputs the model registry's merge needs that this crate cannot source
/// itself (env vars, an external auth CLI's stored keys, plugin-contributed
/// options, and pre-fetched discovery results) — see [`forge_models::build_registry`].
#[derive(Default)]
pub struct RegistryInputs {
    pub env: HashMap<String, String>,
    pub stored_api_keys: BTreeMap<String, String>,
    pub plugin_options: BTreeMap<String, BTreeMap<String, Value>>,
    pub discovered_models: BTreeMap<String, Vec<Model>>,
}

impl Runtime {
    pub async fn new(config: RuntimeConfig, inputs: RegistryInputs) -> Result<Self, RuntimeError> {
        let data_dir = match &config.data_dir {
            Some(dir) => dir.clone(),
            None => forge_credentials::find_data_dir()?,
        };

        let events = Arc::new(EventBus::new());
        let credentials = Arc::new(CredentialStore::new(&data_dir));
        let registry = forge_models::build_registry(&config, &inputs.env, &inputs.stored_api_keys, &inputs.plugin_options, &inputs.discovered_models);

        let mcp = McpManager::new(credentials.clone(), events.clone());
        mcp.connect_all(config.mcp.clone().into_iter().collect()).await;

        let pty = PtyMultiplexer::new(events.clone(), config.pty_shell.clone());
        let adapters = AdapterRegistry::new(reqwest::Client::new());

        Ok(Self { config, events, credentials, mcp, pty, registry, adapters })
    }

    /// Resolves (and memoizes) the backend handle for a qualified
    /// `"<providerID>/<modelID>"` model id, honoring the registry's pinned
    /// default/small-model policy when `qualified_id` is `None`.
    pub async fn handle_for(&self, qualified_id: Option<&str>) -> Result<Arc<dyn forge_providers::LanguageModel>, RuntimeError> {
        let model = self
            .registry
            .default_model(qualified_id)
            .map_err(|e| RuntimeError::ConfigInvalid(e.to_string()))?;
        let provider = self
            .find_provider(&model.provider_id)
            .ok_or_else(|| RuntimeError::ConfigInvalid(format!("provider {} disappeared after model resolution", model.provider_id)))?;
        self.adapters.handle_for(provider, model).await.map_err(|e| RuntimeError::ConfigInvalid(e.to_string()))
    }

    fn find_provider(&self, provider_id: &str) -> Option<&Provider> {
        self.registry.providers().find(|p| p.id == provider_id)
    }
}
