use std::sync::Arc;

use forge_credentials::CredentialStore;
use forge_oauth::{OAuthClientConfig, OAuthProvider};
use forge_protocol::mcp::{McpAuthRecord, StoredClientInfo, StoredTokens};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn provider_with_expired_tokens(server: &MockServer) -> (Arc<CredentialStore>, OAuthProvider) {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(CredentialStore::new(dir.path()));
    store
        .set(
            "serverA",
            &McpAuthRecord {
                tokens: Some(StoredTokens {
                    access_token: "stale".into(),
                    refresh_token: Some("refresh-abc".into()),
                    expires_at: Some(0),
                }),
                client_info: Some(StoredClientInfo {
                    client_id: "client-1".into(),
                    client_secret: None,
                    client_secret_expires_at: None,
                }),
                code_verifier: None,
            },
        )
        .await
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/.well-known/oauth-authorization-server"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "issuer": server.uri(),
            "authorization_endpoint": format!("{}/authorize", server.uri()),
            "token_endpoint": format!("{}/token", server.uri()),
        })))
        .mount(server)
        .await;

    let provider = OAuthProvider::discover(
        "serverA",
        server.uri(),
        OAuthClientConfig::default(),
        Arc::clone(&store),
        reqwest::Client::new(),
    )
    .await
    .unwrap();

    (store, provider)
}

#[tokio::test]
async fn refresh_success_persists_new_tokens() {
    let server = MockServer::start().await;
    let (store, provider) = provider_with_expired_tokens(&server).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "fresh",
            "refresh_token": "refresh-def",
            "expires_in": 3600,
        })))
        .mount(&server)
        .await;

    provider.refresh().await.unwrap();

    let record = store.get("serverA").await.unwrap().unwrap();
    assert_eq!(record.tokens.unwrap().access_token, "fresh");
}

#[tokio::test]
async fn invalid_grant_escalates_to_needs_auth() {
    let server = MockServer::start().await;
    let (store, provider) = provider_with_expired_tokens(&server).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
        })))
        .mount(&server)
        .await;

    let err = provider.refresh().await.unwrap_err();
    assert!(err.to_string().contains("invalid_grant"));

    let record = store.get("serverA").await.unwrap().unwrap();
    assert!(record.tokens.is_none(), "tokens must be cleared so the manager reports needs_auth");
}
