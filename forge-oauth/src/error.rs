#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthStage {
    Discovery,
    Registration,
    Redirect,
    Exchange,
    Refresh,
}

impl std::fmt::Display for OAuthStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OAuthStage::Discovery => "discovery",
            OAuthStage::Registration => "registration",
            OAuthStage::Redirect => "redirect",
            OAuthStage::Exchange => "exchange",
            OAuthStage::Refresh => "refresh",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    RegistrationRequired,
    UserDenied,
    ExchangeFailed,
    NetworkError,
}

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("oauth {stage} failed ({reason:?}): {cause}")]
    Failed {
        stage: OAuthStage,
        reason: FailureReason,
        cause: String,
    },
    #[error("credential store error: {0}")]
    Store(#[from] forge_credentials::CredentialStoreError),
}

impl OAuthError {
    pub fn failed(stage: OAuthStage, reason: FailureReason, cause: impl Into<String>) -> Self {
        OAuthError::Failed { stage, reason, cause: cause.into() }
    }
}
