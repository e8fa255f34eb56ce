use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use forge_protocol::McpAuthRecord;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::CredentialStoreError;

const FILE_NAME: &str = "mcp-auth.json";

/// Durable key-value map of MCP OAuth auth records, one JSON document at
/// `<data-dir>/mcp-auth.json`. Writes are atomic (write-to-temp + rename)
/// and serialized per process via an internal lock; reads may race with
/// writes but always observe some committed version.
///
/// Unknown keys within a stored record, and records for servers this
/// process doesn't know about, are preserved verbatim across rewrites: the
/// store round-trips through `serde_json::Value`, not a struct that would
/// silently drop fields it doesn't recognize.
pub struct CredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CredentialStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(FILE_NAME),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<BTreeMap<String, serde_json::Value>, CredentialStoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                if bytes.is_empty() {
                    return Ok(BTreeMap::new());
                }
                serde_json::from_slice(&bytes).map_err(|source| CredentialStoreError::Parse {
                    path: self.path.clone(),
                    source,
                })
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(source) => Err(CredentialStoreError::Read { path: self.path.clone(), source }),
        }
    }

    async fn write_document(
        &self,
        doc: &BTreeMap<String, serde_json::Value>,
    ) -> Result<(), CredentialStoreError> {
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let path = self.path.clone();
        let body = serde_json::to_vec_pretty(doc).map_err(|source| CredentialStoreError::Parse {
            path: path.clone(),
            source,
        })?;
        tokio::task::spawn_blocking(move || -> Result<(), CredentialStoreError> {
            std::fs::create_dir_all(&dir).map_err(|source| CredentialStoreError::Write {
                path: path.clone(),
                source,
            })?;
            let mut tmp = NamedTempFile::new_in(&dir).map_err(|source| CredentialStoreError::Write {
                path: path.clone(),
                source,
            })?;
            use std::io::Write as _;
            tmp.write_all(&body).map_err(|source| CredentialStoreError::Write {
                path: path.clone(),
                source,
            })?;
            tmp.persist(&path)
                .map_err(|err| CredentialStoreError::Write { path: path.clone(), source: err.error })?;
            Ok(())
        })
        .await
        .unwrap_or_else(|join_err| {
            Err(CredentialStoreError::Write {
                path: self.path.clone(),
                source: std::io::Error::other(join_err),
            })
        })
    }

    pub async fn get(&self, name: &str) -> Result<Option<McpAuthRecord>, CredentialStoreError> {
        let _guard = self.lock.lock().await;
        let doc = self.read_document().await?;
        match doc.get(name) {
            Some(value) => {
                let record = serde_json::from_value(value.clone()).map_err(|source| {
                    CredentialStoreError::Parse { path: self.path.clone(), source }
                })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    pub async fn set(&self, name: &str, record: &McpAuthRecord) -> Result<(), CredentialStoreError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_document().await?;
        let value = serde_json::to_value(record)
            .map_err(|source| CredentialStoreError::Parse { path: self.path.clone(), source })?;
        doc.insert(name.to_string(), value);
        self.write_document(&doc).await?;
        debug!(server = name, "credential store: record written");
        Ok(())
    }

    pub async fn remove(&self, name: &str) -> Result<(), CredentialStoreError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_document().await?;
        if doc.remove(name).is_some() {
            self.write_document(&doc).await?;
            debug!(server = name, "credential store: record removed");
        } else {
            warn!(server = name, "credential store: remove on absent record is a no-op");
        }
        Ok(())
    }

    pub async fn all(&self) -> Result<BTreeMap<String, McpAuthRecord>, CredentialStoreError> {
        let _guard = self.lock.lock().await;
        let doc = self.read_document().await?;
        let mut out = BTreeMap::new();
        for (name, value) in doc {
            let record = serde_json::from_value(value).map_err(|source| {
                CredentialStoreError::Parse { path: self.path.clone(), source }
            })?;
            out.insert(name, record);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_protocol::mcp::{StoredClientInfo, StoredTokens};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn tokens(access: &str) -> McpAuthRecord {
        McpAuthRecord {
            tokens: Some(StoredTokens { access_token: access.to_string(), refresh_token: None, expires_at: None }),
            client_info: None,
            code_verifier: None,
        }
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path());
        let record = tokens("abc");
        store.set("serverA", &record).await.unwrap();
        assert_eq!(store.get("serverA").await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn set_then_remove_then_get_is_none() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path());
        store.set("serverA", &tokens("abc")).await.unwrap();
        store.remove("serverA").await.unwrap();
        assert_eq!(store.get("serverA").await.unwrap(), None);
    }

    #[tokio::test]
    async fn remove_on_absent_record_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path());
        store.remove("nope").await.unwrap();
    }

    #[tokio::test]
    async fn logout_leaves_other_entries_untouched() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path());
        store.set("serverA", &tokens("a")).await.unwrap();
        store
            .set(
                "serverB",
                &McpAuthRecord {
                    tokens: Some(StoredTokens { access_token: "b".into(), refresh_token: None, expires_at: None }),
                    client_info: Some(StoredClientInfo {
                        client_id: "client-b".into(),
                        client_secret: None,
                        client_secret_expires_at: None,
                    }),
                    code_verifier: None,
                },
            )
            .await
            .unwrap();

        store.remove("serverA").await.unwrap();

        let all = store.all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all.contains_key("serverB"));
    }

    #[tokio::test]
    async fn unknown_keys_in_document_are_preserved_across_rewrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mcp-auth.json");
        tokio::fs::write(&path, r#"{"legacyServer": {"tokens": {"accessToken": "z"}}}"#)
            .await
            .unwrap();

        let store = CredentialStore::new(dir.path());
        store.set("serverA", &tokens("a")).await.unwrap();

        let all = store.all().await.unwrap();
        assert!(all.contains_key("legacyServer"));
        assert!(all.contains_key("serverA"));
    }

    #[tokio::test]
    async fn writes_are_atomic_via_temp_and_rename() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path());
        store.set("serverA", &tokens("a")).await.unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        // only the final file should remain; no leftover temp file.
        assert_eq!(entries.len(), 1);
    }
}
