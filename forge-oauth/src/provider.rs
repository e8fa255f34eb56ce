use std::sync::Arc;
use std::time::Duration;

use forge_credentials::CredentialStore;
use forge_protocol::mcp::{McpAuthRecord, StoredClientInfo, StoredTokens};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::callback::LoopbackListener;
use crate::discovery::{
    discover_authorization_server, discover_protected_resource, register_client, AuthorizationServerMetadata,
};
use crate::error::{FailureReason, OAuthError, OAuthStage};
use crate::pkce::PkcePair;
use crate::state::OAuthFlowState;

const DEFAULT_OAUTH_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Default)]
pub struct OAuthClientConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    error: Option<String>,
}

/// One instance per `(mcpName, serverURL, clientConfig)`. Drives the
/// authorization-code + PKCE state machine and persists results through the
/// credential store.
pub struct OAuthProvider {
    mcp_name: String,
    server_url: String,
    metadata: AuthorizationServerMetadata,
    client_config: OAuthClientConfig,
    http: reqwest::Client,
    store: Arc<CredentialStore>,
    state: tokio::sync::Mutex<OAuthFlowState>,
}

impl OAuthProvider {
    pub async fn discover(
        mcp_name: impl Into<String>,
        server_url: impl Into<String>,
        client_config: OAuthClientConfig,
        store: Arc<CredentialStore>,
        http: reqwest::Client,
    ) -> Result<Self, OAuthError> {
        let server_url = server_url.into();
        let metadata = match discover_authorization_server(&http, &server_url).await {
            Ok(m) => m,
            Err(_) => {
                // Fall back to protected-resource metadata's first authorization
                // server, then to the bare server URL as both endpoints base.
                let resource = discover_protected_resource(&http, &server_url).await.ok();
                let base = resource
                    .as_ref()
                    .and_then(|r| r.authorization_servers.first().cloned())
                    .unwrap_or_else(|| server_url.clone());
                AuthorizationServerMetadata {
                    issuer: base.clone(),
                    authorization_endpoint: format!("{base}/authorize"),
                    token_endpoint: format!("{base}/token"),
                    registration_endpoint: Some(format!("{base}/register")),
                    scopes_supported: Vec::new(),
                }
            }
        };
        Ok(Self {
            mcp_name: mcp_name.into(),
            server_url,
            metadata,
            client_config,
            http,
            store,
            state: tokio::sync::Mutex::new(OAuthFlowState::Idle),
        })
    }

    pub fn mcp_name(&self) -> &str {
        &self.mcp_name
    }

    /// Drives `idle -> pending_auth -> awaiting_code -> authenticated`.
    /// `on_redirect` is invoked with the authorization URL once it is ready;
    /// the caller (C3) is responsible for surfacing it to the user.
    pub async fn authenticate(
        &self,
        on_redirect: impl FnOnce(&str) + Send,
    ) -> Result<(), OAuthError> {
        let mut guard = self.state.lock().await;
        *guard = OAuthFlowState::Idle;

        let (client_id, client_secret) = match self.resolve_client_info().await {
            Ok(pair) => pair,
            Err(err) => {
                *guard = OAuthFlowState::Failed(FailureReason::RegistrationRequired);
                return Err(err);
            }
        };
        *guard = OAuthFlowState::PendingAuth { client_id: client_id.clone(), client_secret: client_secret.clone() };

        let callback_path = "/callback";
        let listener = match LoopbackListener::bind(callback_path) {
            Ok(l) => l,
            Err(err) => {
                *guard = OAuthFlowState::Failed(FailureReason::NetworkError);
                return Err(OAuthError::failed(OAuthStage::Redirect, FailureReason::NetworkError, err.to_string()));
            }
        };

        let pkce = PkcePair::generate();
        let csrf_state = Uuid::new_v4().to_string();
        let scope = self.client_config.scope.clone().unwrap_or_default();
        let auth_url = format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&state={}&code_challenge={}&code_challenge_method=S256{}",
            self.metadata.authorization_endpoint,
            urlencoding::encode(&client_id),
            urlencoding::encode(listener.redirect_uri()),
            urlencoding::encode(&csrf_state),
            urlencoding::encode(&pkce.challenge),
            if scope.is_empty() { String::new() } else { format!("&scope={}", urlencoding::encode(&scope)) },
        );

        *guard = OAuthFlowState::AwaitingCode {
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
            code_verifier: pkce.verifier.clone(),
            csrf_state: csrf_state.clone(),
            redirect_uri: listener.redirect_uri().to_string(),
        };
        drop(guard);

        // Keep the verifier visible in the store only across this window.
        self.persist_pending_verifier(&pkce.verifier).await?;

        on_redirect(&auth_url);

        let received = listener.wait_for_code(DEFAULT_OAUTH_TIMEOUT).await;
        let Some((code, received_state)) = received else {
            self.mark_failed(FailureReason::NetworkError).await;
            return Err(OAuthError::failed(OAuthStage::Redirect, FailureReason::NetworkError, "oauth callback timed out"));
        };
        if received_state != csrf_state {
            self.mark_failed(FailureReason::UserDenied).await;
            return Err(OAuthError::failed(OAuthStage::Exchange, FailureReason::UserDenied, "csrf state mismatch"));
        }

        let exchange = self
            .exchange_code(&code, &pkce.verifier, &client_id, client_secret.as_deref(), listener.redirect_uri())
            .await;

        match exchange {
            Ok(tokens) => {
                self.persist_authenticated(client_id, client_secret, tokens).await?;
                *self.state.lock().await = OAuthFlowState::Authenticated;
                info!(server = %self.mcp_name, "oauth: authenticated");
                Ok(())
            }
            Err(err) => {
                self.mark_failed(FailureReason::ExchangeFailed).await;
                Err(err)
            }
        }
    }

    async fn resolve_client_info(&self) -> Result<(String, Option<String>), OAuthError> {
        if let Some(id) = &self.client_config.client_id {
            return Ok((id.clone(), self.client_config.client_secret.clone()));
        }
        if let Some(stored) = self.store.get(&self.mcp_name).await? {
            if let Some(info) = stored.client_info {
                return Ok((info.client_id, info.client_secret));
            }
        }
        let Some(registration_endpoint) = &self.metadata.registration_endpoint else {
            return Err(OAuthError::failed(
                OAuthStage::Registration,
                FailureReason::RegistrationRequired,
                "no client_id configured and server advertises no registration endpoint",
            ));
        };
        // Registration needs a redirect URI but the listener isn't bound yet;
        // the generic localhost callback path is stable across runs.
        let redirect_uri = "http://127.0.0.1/callback";
        let registration = register_client(&self.http, registration_endpoint, redirect_uri, "forge-runtime")
            .await?;
        let mut record = self.store.get(&self.mcp_name).await?.unwrap_or_default();
        record.client_info = Some(StoredClientInfo {
            client_id: registration.client_id.clone(),
            client_secret: registration.client_secret.clone(),
            client_secret_expires_at: registration.client_secret_expires_at,
        });
        self.store.set(&self.mcp_name, &record).await?;
        Ok((registration.client_id, registration.client_secret))
    }

    async fn persist_pending_verifier(&self, verifier: &str) -> Result<(), OAuthError> {
        let mut record = self.store.get(&self.mcp_name).await?.unwrap_or_default();
        record.code_verifier = Some(verifier.to_string());
        self.store.set(&self.mcp_name, &record).await?;
        Ok(())
    }

    async fn persist_authenticated(
        &self,
        client_id: String,
        client_secret: Option<String>,
        tokens: StoredTokens,
    ) -> Result<(), OAuthError> {
        let mut record = self.store.get(&self.mcp_name).await?.unwrap_or_default();
        record.tokens = Some(tokens);
        record.client_info = Some(StoredClientInfo { client_id, client_secret, client_secret_expires_at: None });
        record.code_verifier = None;
        self.store.set(&self.mcp_name, &record).await?;
        Ok(())
    }

    async fn mark_failed(&self, reason: FailureReason) {
        *self.state.lock().await = OAuthFlowState::Failed(reason);
        if let Ok(Some(mut record)) = self.store.get(&self.mcp_name).await {
            record.code_verifier = None;
            let _ = self.store.set(&self.mcp_name, &record).await;
        }
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        client_id: &str,
        client_secret: Option<&str>,
        redirect_uri: &str,
    ) -> Result<StoredTokens, OAuthError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", client_id),
            ("code_verifier", code_verifier),
        ];
        if let Some(secret) = client_secret {
            form.push(("client_secret", secret));
        }
        let resp = self.http.post(&self.metadata.token_endpoint).form(&form).send().await.map_err(|err| {
            OAuthError::failed(OAuthStage::Exchange, FailureReason::NetworkError, err.to_string())
        })?;
        let status = resp.status();
        let body: TokenResponse = resp.json().await.map_err(|err| {
            OAuthError::failed(OAuthStage::Exchange, FailureReason::ExchangeFailed, err.to_string())
        })?;
        if !status.is_success() || body.error.is_some() {
            let cause = body.error.unwrap_or_else(|| format!("token endpoint returned {status}"));
            return Err(OAuthError::failed(OAuthStage::Exchange, FailureReason::ExchangeFailed, cause));
        }
        Ok(StoredTokens {
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            expires_at: body.expires_in.map(|secs| chrono::Utc::now().timestamp() + secs),
        })
    }

    /// Lazily attempted on any request that receives `401`. A second
    /// consecutive `401` after refresh must escalate to `needs_auth` —
    /// callers detect that by checking whether this returns `Ok` with fresh
    /// tokens in the store versus an `Err` that clears them.
    pub async fn refresh(&self) -> Result<(), OAuthError> {
        let Some(record) = self.store.get(&self.mcp_name).await? else {
            return Err(OAuthError::failed(OAuthStage::Refresh, FailureReason::UserDenied, "no stored record"));
        };
        let Some(tokens) = &record.tokens else {
            return Err(OAuthError::failed(OAuthStage::Refresh, FailureReason::UserDenied, "no stored tokens"));
        };
        let Some(refresh_token) = &tokens.refresh_token else {
            return Err(OAuthError::failed(OAuthStage::Refresh, FailureReason::UserDenied, "no refresh token"));
        };
        let (client_id, client_secret) = record
            .client_info
            .as_ref()
            .map(|c| (c.client_id.clone(), c.client_secret.clone()))
            .unwrap_or((self.client_config.client_id.clone().unwrap_or_default(), self.client_config.client_secret.clone()));

        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", client_id.as_str()),
        ];
        if let Some(secret) = &client_secret {
            form.push(("client_secret", secret.as_str()));
        }
        let resp = self.http.post(&self.metadata.token_endpoint).form(&form).send().await.map_err(|err| {
            OAuthError::failed(OAuthStage::Refresh, FailureReason::NetworkError, err.to_string())
        })?;
        let status = resp.status();
        let body: TokenResponse = resp.json().await.unwrap_or(TokenResponse {
            access_token: String::new(),
            refresh_token: None,
            expires_in: None,
            error: Some(format!("refresh endpoint returned {status} with unparseable body")),
        });

        if status == reqwest::StatusCode::BAD_REQUEST || body.error.as_deref() == Some("invalid_grant") {
            warn!(server = %self.mcp_name, "oauth: refresh token rejected, escalating to needs_auth");
            let mut record = record;
            record.tokens = None;
            self.store.set(&self.mcp_name, &record).await?;
            return Err(OAuthError::failed(OAuthStage::Refresh, FailureReason::UserDenied, "invalid_grant"));
        }
        if !status.is_success() {
            return Err(OAuthError::failed(
                OAuthStage::Refresh,
                FailureReason::NetworkError,
                format!("refresh endpoint returned {status}"),
            ));
        }

        let mut record = record;
        record.tokens = Some(StoredTokens {
            access_token: body.access_token,
            refresh_token: body.refresh_token.or_else(|| Some(refresh_token.clone())),
            expires_at: body.expires_in.map(|secs| chrono::Utc::now().timestamp() + secs),
        });
        self.store.set(&self.mcp_name, &record).await?;
        Ok(())
    }
}
