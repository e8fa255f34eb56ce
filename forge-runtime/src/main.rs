use std::collections::HashMap;

use forge_protocol::RuntimeConfig;
use forge_runtime::{RegistryInputs, Runtime};

/// Minimal process entry point: parsing a real on-disk config and exposing
/// a client-facing transport are both out of scope for this crate. This
/// binary exists to prove the wiring boots: default config,
/// environment-sourced credentials, no discovery inputs.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    forge_runtime::logging::init();

    let config = RuntimeConfig::default();
    let inputs = RegistryInputs { env: std::env::vars().collect::<HashMap<_, _>>(), ..Default::default() };

    let runtime = Runtime::new(config, inputs).await?;
    tracing::info!(providers = runtime.registry.providers().count(), "runtime ready");

    Ok(())
}
