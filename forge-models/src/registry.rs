use std::collections::BTreeMap;

use forge_protocol::config::RuntimeConfig;
use forge_protocol::model::{Model, Provider};

use crate::error::RegistryError;
use crate::policy::{best_by_priority, small_model_priority_for, DEFAULT_MODEL_PRIORITY};
use crate::search::fuzzy_search;

/// The merged provider/model catalog (C4), built once per configuration
/// change via [`crate::build_registry`].
pub struct Registry {
    pub(crate) providers: BTreeMap<String, Provider>,
}

impl Registry {
    pub fn providers(&self) -> impl Iterator<Item = &Provider> {
        self.providers.values()
    }

    pub fn get(&self, provider_id: &str, model_id: &str) -> Option<&Model> {
        self.providers.get(provider_id)?.models.get(model_id)
    }

    fn qualified_ids(&self) -> Vec<String> {
        self.providers
            .values()
            .flat_map(|p| p.models.keys().map(move |m| format!("{}/{m}", p.id)))
            .collect()
    }

    pub fn search(&self, query: &str) -> Vec<String> {
        fuzzy_search(query, &self.qualified_ids())
    }

    fn resolve_pinned(&self, pin: &str) -> Result<&Model, RegistryError> {
        let Some((provider_id, model_id)) = RuntimeConfig::parse_pinned_model(pin) else {
            return Err(RegistryError::ModelNotFound {
                provider_id: String::new(),
                model_id: pin.to_string(),
                suggestions: self.search(pin),
            });
        };
        self.get(provider_id, model_id).ok_or_else(|| RegistryError::ModelNotFound {
            provider_id: provider_id.to_string(),
            model_id: model_id.to_string(),
            suggestions: self.search(pin),
        })
    }

    /// Honors a config-pinned `model` override if present; otherwise picks
    /// the first provider (config order) with surviving models and returns
    /// its highest-priority entry.
    pub fn default_model(&self, pinned: Option<&str>) -> Result<&Model, RegistryError> {
        if let Some(pin) = pinned {
            return self.resolve_pinned(pin);
        }

        let provider = self.providers.values().find(|p| p.has_surviving_models()).ok_or(RegistryError::NoProvidersAvailable)?;
        let model_id = best_by_priority(provider, DEFAULT_MODEL_PRIORITY).ok_or(RegistryError::NoProvidersAvailable)?;
        self.get(&provider.id, model_id).ok_or(RegistryError::NoProvidersAvailable)
    }

    /// An explicit `small_model` override wins; otherwise searches each
    /// provider (config order) for the first priority-list match, applying
    /// provider-specific overrides along the way.
    pub fn small_model(&self, explicit: Option<&str>) -> Result<&Model, RegistryError> {
        if let Some(pin) = explicit {
            return self.resolve_pinned(pin);
        }

        for provider in self.providers.values() {
            let priority = small_model_priority_for(&provider.id);
            if let Some(model_id) = best_by_priority(provider, &priority) {
                if priority.iter().any(|term| model_id.contains(term)) {
                    if let Some(model) = self.get(&provider.id, model_id) {
                        return Ok(model);
                    }
                }
            }
        }
        Err(RegistryError::NoProvidersAvailable)
    }
}
