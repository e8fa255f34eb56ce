use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("config_invalid: {0}")]
    ConfigInvalid(String),

    #[error("failed to resolve the data directory: {0}")]
    DataDir(#[from] std::io::Error),
}
