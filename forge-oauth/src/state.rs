use crate::error::FailureReason;

/// Per-`authenticate()`-call state machine.
///
/// `idle -> pending_auth -> awaiting_code -> authenticated`, with any step
/// able to transition to `failed(reason)`.
#[derive(Debug, Clone, PartialEq)]
pub enum OAuthFlowState {
    Idle,
    PendingAuth {
        client_id: String,
        client_secret: Option<String>,
    },
    AwaitingCode {
        client_id: String,
        client_secret: Option<String>,
        code_verifier: String,
        csrf_state: String,
        redirect_uri: String,
    },
    Authenticated,
    Failed(FailureReason),
}

impl OAuthFlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OAuthFlowState::Authenticated | OAuthFlowState::Failed(_))
    }
}
