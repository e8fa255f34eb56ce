use forge_providers::discovery::owiseman::discover_owiseman_models;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn owiseman_discovery_sends_both_auth_headers_and_parses_data_ids() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .and(header("authorization", "Bearer sk-test"))
        .and(header("api-key", "sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"id": "owise-large"}, {"id": "owise-small"}],
        })))
        .mount(&server)
        .await;

    let models = discover_owiseman_models(&reqwest::Client::new(), &server.uri(), Some("sk-test")).await;

    let ids: Vec<_> = models.iter().map(|m| m.model_id.clone()).collect();
    assert_eq!(ids, vec!["owise-large".to_string(), "owise-small".to_string()]);
    assert!(models.iter().all(|m| m.provider_id == "owiseman"));
}

#[tokio::test]
async fn owiseman_discovery_on_http_error_yields_no_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).and(path("/v1/models")).respond_with(ResponseTemplate::new(500)).mount(&server).await;

    let models = discover_owiseman_models(&reqwest::Client::new(), &server.uri(), Some("sk-test")).await;
    assert!(models.is_empty());
}
