use forge_protocol::RuntimeConfig;
use forge_runtime::{RegistryInputs, Runtime};

#[tokio::test]
async fn default_config_boots_with_bundled_registry_and_no_mcp_entries() {
    let runtime = Runtime::new(RuntimeConfig::default(), RegistryInputs::default()).await.expect("runtime boots");

    assert!(runtime.registry.providers().count() > 0);
    assert!(runtime.mcp.status().await.is_empty());
    assert!(runtime.pty.list().await.is_empty());
}

#[tokio::test]
async fn handle_for_resolves_the_default_model() {
    // With no env/stored/plugin credentials supplied, every bundled provider
    // except Ollama (a local endpoint with no declared env vars) is filtered
    // out of the registry, so the default model resolves to an Ollama model
    // and building its driver needs no API key.
    let runtime = Runtime::new(RuntimeConfig::default(), RegistryInputs::default()).await.expect("runtime boots");
    let handle = runtime.handle_for(None).await;
    assert!(handle.is_ok());
}
