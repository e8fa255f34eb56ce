use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;

/// Composes an external cancellation signal with an optional timeout via
/// `any`-of-signals semantics: whichever fires first wins, and both map to
/// `upstream_cancelled` for the caller: an explicit cancel and a configured
/// timeout firing are indistinguishable to the rest of the stack.
pub async fn run_with_cancellation<F, T, E>(fut: F, cancel: &CancellationToken, timeout: Option<Duration>) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, E>>,
    ProviderError: From<E>,
{
    let timed = async {
        let result: Result<T, E> = match timeout {
            Some(duration) => match tokio::time::timeout(duration, fut).await {
                Ok(inner) => inner,
                Err(_) => return Err(ProviderError::UpstreamCancelled),
            },
            None => fut.await,
        };
        result.map_err(ProviderError::from)
    };

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ProviderError::UpstreamCancelled),
        result = timed => result,
    }
}
