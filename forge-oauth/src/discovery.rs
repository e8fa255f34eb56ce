use serde::{Deserialize, Serialize};

use crate::error::{FailureReason, OAuthError, OAuthStage};

/// RFC 8414 authorization server metadata (fields this runtime consumes).
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub registration_endpoint: Option<String>,
    #[serde(default)]
    pub scopes_supported: Vec<String>,
}

/// RFC 9728 protected resource metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtectedResourceMetadata {
    pub resource: String,
    #[serde(default)]
    pub authorization_servers: Vec<String>,
}

pub async fn discover_authorization_server(
    client: &reqwest::Client,
    base_url: &str,
) -> Result<AuthorizationServerMetadata, OAuthError> {
    let url = format!("{}/.well-known/oauth-authorization-server", base_url.trim_end_matches('/'));
    let resp = client.get(&url).send().await.map_err(|err| {
        OAuthError::failed(OAuthStage::Discovery, FailureReason::NetworkError, err.to_string())
    })?;
    if !resp.status().is_success() {
        return Err(OAuthError::failed(
            OAuthStage::Discovery,
            FailureReason::NetworkError,
            format!("authorization server metadata returned {}", resp.status()),
        ));
    }
    resp.json().await.map_err(|err| {
        OAuthError::failed(OAuthStage::Discovery, FailureReason::NetworkError, err.to_string())
    })
}

pub async fn discover_protected_resource(
    client: &reqwest::Client,
    base_url: &str,
) -> Result<ProtectedResourceMetadata, OAuthError> {
    let url = format!("{}/.well-known/oauth-protected-resource", base_url.trim_end_matches('/'));
    let resp = client.get(&url).send().await.map_err(|err| {
        OAuthError::failed(OAuthStage::Discovery, FailureReason::NetworkError, err.to_string())
    })?;
    if !resp.status().is_success() {
        return Err(OAuthError::failed(
            OAuthStage::Discovery,
            FailureReason::NetworkError,
            format!("protected resource metadata returned {}", resp.status()),
        ));
    }
    resp.json().await.map_err(|err| {
        OAuthError::failed(OAuthStage::Discovery, FailureReason::NetworkError, err.to_string())
    })
}

#[derive(Debug, Serialize)]
struct RegistrationRequest<'a> {
    client_name: &'a str,
    redirect_uris: Vec<&'a str>,
    grant_types: Vec<&'a str>,
    response_types: Vec<&'a str>,
    token_endpoint_auth_method: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DynamicClientRegistration {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub client_secret_expires_at: Option<i64>,
}

/// Dynamic client registration, attempted when no `clientId` is configured
/// (RFC 7591).
pub async fn register_client(
    client: &reqwest::Client,
    registration_endpoint: &str,
    redirect_uri: &str,
    client_name: &str,
) -> Result<DynamicClientRegistration, OAuthError> {
    let body = RegistrationRequest {
        client_name,
        redirect_uris: vec![redirect_uri],
        grant_types: vec!["authorization_code", "refresh_token"],
        response_types: vec!["code"],
        token_endpoint_auth_method: "none",
    };
    let resp = client
        .post(registration_endpoint)
        .json(&body)
        .send()
        .await
        .map_err(|err| {
            OAuthError::failed(OAuthStage::Registration, FailureReason::RegistrationRequired, err.to_string())
        })?;
    if !resp.status().is_success() {
        return Err(OAuthError::failed(
            OAuthStage::Registration,
            FailureReason::RegistrationRequired,
            format!("dynamic client registration returned {}", resp.status()),
        ));
    }
    resp.json().await.map_err(|err| {
        OAuthError::failed(OAuthStage::Registration, FailureReason::RegistrationRequired, err.to_string())
    })
}
