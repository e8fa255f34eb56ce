use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CredentialStoreError {
    #[error("failed to read credential store at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse credential store at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to persist credential store at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to resolve data directory: {0}")]
    DataDir(std::io::Error),
}
