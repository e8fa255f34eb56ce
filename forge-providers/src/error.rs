use thiserror::Error;

/// Stable, client-facing error taxonomy for the backend-adapter layer.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider_init_error({provider_id}): {cause}")]
    ProviderInitError { provider_id: String, cause: String },

    #[error("upstream_http({status}): {body}")]
    UpstreamHttp { status: u16, body: String },

    #[error("upstream_cancelled")]
    UpstreamCancelled,

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ProviderError {
    /// `status >= 500` or `status == 429`; retry policy itself is the caller's.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::UpstreamHttp { status, .. } if *status >= 500 || *status == 429)
    }
}
