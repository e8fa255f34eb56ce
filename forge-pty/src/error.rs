#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    #[error("failed to spawn pty process: {0}")]
    Spawn(#[from] anyhow::Error),
    #[error("pty session {0} not found")]
    NotFound(String),
}
