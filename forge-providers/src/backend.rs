//! Closed backend-driver dispatch. The set of wire protocols this adapter
//! speaks is known and small, so it is represented as a closed sum type
//! rather than a trait-object registry keyed by provider id: adding a
//! genuinely new wire protocol is a compile-time exhaustiveness failure,
//! while everything that already speaks an OpenAI-compatible chat wire
//! format shares one driver parameterized by base URL and header set.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use forge_protocol::model::{Model, Provider};
use forge_protocol::stream::{GenerateResult, StreamPart};
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::request::GenerateRequest;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    Anthropic,
    OpenAi,
    OpenAiCompatible { base_url: String },
    Bedrock,
    VertexGemini,
    AzureOpenAi,
    Ollama,
    LmStudio,
    Owiseman,
    CloudflareGateway,
}

impl BackendKind {
    /// Dispatches on provider id with a sequence of prefix/exact matches
    /// and no fallthrough silently reused between cases, closed by an
    /// explicit catch-all.
    pub fn for_provider(provider: &Provider) -> BackendKind {
        let upstream_url = provider.models.values().find_map(|m| m.upstream_url.clone());
        match provider.id.as_str() {
            "anthropic" => BackendKind::Anthropic,
            "openai" => BackendKind::OpenAi,
            "bedrock" | "amazon-bedrock" => BackendKind::Bedrock,
            "vertex" | "vertex-gemini" | "google-vertex" => BackendKind::VertexGemini,
            "azure" | "azure-openai" => BackendKind::AzureOpenAi,
            "ollama" => BackendKind::Ollama,
            "lmstudio" | "lm-studio" => BackendKind::LmStudio,
            "owiseman" => BackendKind::Owiseman,
            "cloudflare" | "cloudflare-gateway" => BackendKind::CloudflareGateway,
            _ => BackendKind::OpenAiCompatible { base_url: upstream_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()) },
        }
    }
}

/// The streaming interface every backend driver implements, independent of
/// wire format. Implementations must be safe for concurrent calls: handles
/// are memoized and shared across callers.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn do_generate(&self, req: &GenerateRequest, cancel: CancellationToken, timeout: Option<Duration>) -> Result<GenerateResult, ProviderError>;

    async fn do_stream(
        &self,
        req: &GenerateRequest,
        cancel: CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<BoxStream<'static, StreamPart>, ProviderError>;
}

pub fn build_driver(http: reqwest::Client, provider: &Provider, model: &Model) -> Result<Arc<dyn LanguageModel>, ProviderError> {
    let kind = BackendKind::for_provider(provider);
    let api_id = model.api_id.clone();
    let api_key = provider.api_key.clone();

    match kind {
        BackendKind::Ollama => {
            let base_url = provider
                .options
                .get("baseUrl")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| "http://127.0.0.1:11434".to_string());
            Ok(Arc::new(crate::drivers::ollama::OllamaDriver::new(http, base_url, api_id)))
        }
        BackendKind::Anthropic => {
            let api_key = api_key.ok_or_else(|| ProviderError::ProviderInitError { provider_id: provider.id.clone(), cause: "missing API key".to_string() })?;
            Ok(Arc::new(crate::drivers::anthropic::AnthropicDriver::new(http, "https://api.anthropic.com".to_string(), api_id, api_key)))
        }
        BackendKind::Bedrock => {
            let region = provider.options.get("region").and_then(|v| v.as_str()).unwrap_or("us-east-1").to_string();
            let model_id = crate::bedrock::bedrock_model_id(&api_id, &region);
            let bearer = api_key.ok_or_else(|| ProviderError::ProviderInitError {
                provider_id: provider.id.clone(),
                cause: "missing AWS_BEARER_TOKEN_BEDROCK".to_string(),
            })?;
            let base_url = format!("https://bedrock-runtime.{region}.amazonaws.com");
            Ok(Arc::new(crate::drivers::anthropic::AnthropicDriver::new(http, base_url, model_id, bearer)))
        }
        BackendKind::OpenAi => Ok(Arc::new(crate::drivers::chat_completions::ChatCompletionsDriver::openai(http, api_id, api_key))),
        BackendKind::AzureOpenAi => {
            let resource = std::env::var("AZURE_COGNITIVE_SERVICES_RESOURCE_NAME").unwrap_or_default();
            let base_url = format!("https://{resource}.openai.azure.com/openai/deployments/{api_id}");
            Ok(Arc::new(crate::drivers::chat_completions::ChatCompletionsDriver::azure(http, base_url, api_id, api_key)))
        }
        BackendKind::VertexGemini => {
            let project = std::env::var("GOOGLE_CLOUD_PROJECT").unwrap_or_default();
            let location = std::env::var("GOOGLE_CLOUD_LOCATION").unwrap_or_else(|_| "us-central1".to_string());
            let base_url = format!("https://{location}-aiplatform.googleapis.com/v1/projects/{project}/locations/{location}/endpoints/openapi");
            Ok(Arc::new(crate::drivers::chat_completions::ChatCompletionsDriver::bearer(http, base_url, api_id, api_key)))
        }
        BackendKind::LmStudio => {
            let base_url = provider.options.get("baseUrl").and_then(|v| v.as_str()).unwrap_or("http://127.0.0.1:1234/v1").to_string();
            Ok(Arc::new(crate::drivers::chat_completions::ChatCompletionsDriver::bearer(http, base_url, api_id, api_key)))
        }
        BackendKind::CloudflareGateway => {
            let account = std::env::var("CLOUDFLARE_ACCOUNT_ID").unwrap_or_default();
            let gateway = std::env::var("CLOUDFLARE_GATEWAY_ID").unwrap_or_default();
            let base_url = format!("https://gateway.ai.cloudflare.com/v1/{account}/{gateway}/compat");
            let token = api_key.or_else(|| std::env::var("CLOUDFLARE_API_TOKEN").ok());
            Ok(Arc::new(crate::drivers::chat_completions::ChatCompletionsDriver::bearer(http, base_url, api_id, token)))
        }
        BackendKind::Owiseman => {
            let base_url = std::env::var("OWISEMAN_BASE_URL").unwrap_or_else(|_| "https://api.owiseman.com".to_string());
            let token = api_key.or_else(|| std::env::var("OWISEMAN_API_KEY").ok());
            Ok(Arc::new(crate::drivers::chat_completions::ChatCompletionsDriver::owiseman(http, base_url, api_id, token)))
        }
        BackendKind::OpenAiCompatible { base_url } => Ok(Arc::new(crate::drivers::chat_completions::ChatCompletionsDriver::bearer(http, base_url, api_id, api_key))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use forge_protocol::model::ProviderSource;

    use super::*;

    fn provider(id: &str) -> Provider {
        Provider { id: id.to_string(), name: id.to_string(), source: ProviderSource::Config, env_var_names: Vec::new(), api_key: None, options: BTreeMap::new(), models: BTreeMap::new() }
    }

    #[test]
    fn known_ids_dispatch_to_named_backends() {
        assert_eq!(BackendKind::for_provider(&provider("anthropic")), BackendKind::Anthropic);
        assert_eq!(BackendKind::for_provider(&provider("ollama")), BackendKind::Ollama);
        assert_eq!(BackendKind::for_provider(&provider("owiseman")), BackendKind::Owiseman);
    }

    #[test]
    fn unknown_id_falls_back_to_openai_compatible_catch_all() {
        match BackendKind::for_provider(&provider("some-new-vendor")) {
            BackendKind::OpenAiCompatible { .. } => {}
            other => panic!("expected OpenAiCompatible fallback, got {other:?}"),
        }
    }
}
