use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("model not found: {provider_id}/{model_id} (did you mean: {})", suggestions.join(", "))]
    ModelNotFound { provider_id: String, model_id: String, suggestions: Vec<String> },

    #[error("provider {provider_id} failed to initialize: {cause}")]
    ProviderInitError { provider_id: String, cause: String },

    #[error("no provider has any surviving models")]
    NoProvidersAvailable,
}
