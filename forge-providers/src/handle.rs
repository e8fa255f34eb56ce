//! The backend-handle cache ("Model/SDK cache" in the concurrency model):
//! readers common, writer single, keyed by a canonical hash of provider id,
//! model id, and options. Memoized handles are `Arc<dyn LanguageModel>` and
//! are themselves safe for concurrent `do_generate`/`do_stream` calls.

use std::collections::HashMap;
use std::sync::Arc;

use forge_protocol::model::{Model, Provider};
use tokio::sync::RwLock;

use crate::backend::{build_driver, LanguageModel};
use crate::error::ProviderError;
use crate::memo::cache_key;

#[derive(Default)]
pub struct AdapterRegistry {
    http: reqwest::Client,
    handles: RwLock<HashMap<String, Arc<dyn LanguageModel>>>,
}

impl AdapterRegistry {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http, handles: RwLock::new(HashMap::new()) }
    }

    pub async fn handle_for(&self, provider: &Provider, model: &Model) -> Result<Arc<dyn LanguageModel>, ProviderError> {
        let key = cache_key(&provider.id, &model.model_id, &model.options);

        if let Some(handle) = self.handles.read().await.get(&key) {
            return Ok(handle.clone());
        }

        let mut handles = self.handles.write().await;
        if let Some(handle) = handles.get(&key) {
            return Ok(handle.clone());
        }

        let driver = build_driver(self.http.clone(), provider, model)?;
        handles.insert(key, driver.clone());
        Ok(driver)
    }
}
