use std::sync::Arc;

use tiny_http::{Response, Server};
use tokio::sync::oneshot;
use urlencoding::decode;

/// Unblocks the listening `tiny_http::Server` on drop so the background
/// accept loop exits even if no callback ever arrives.
pub struct CallbackServerGuard {
    server: Arc<Server>,
}

impl Drop for CallbackServerGuard {
    fn drop(&mut self) {
        self.server.unblock();
    }
}

pub struct OauthCallbackResult {
    pub code: String,
    pub state: String,
}

pub enum CallbackOutcome {
    Success(OauthCallbackResult),
    Error(String),
    Invalid,
}

pub fn parse_oauth_callback(path: &str, expected_callback_path: &str) -> CallbackOutcome {
    let Some((route, query)) = path.split_once('?') else {
        return CallbackOutcome::Invalid;
    };
    if route != expected_callback_path {
        return CallbackOutcome::Invalid;
    }

    let mut code = None;
    let mut state = None;
    let mut error_description = None;

    for pair in query.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let Ok(decoded) = decode(value) else {
            continue;
        };
        let decoded = decoded.into_owned();
        match key {
            "code" => code = Some(decoded),
            "state" => state = Some(decoded),
            "error_description" => error_description = Some(decoded),
            _ => {}
        }
    }

    if let (Some(code), Some(state)) = (code, state) {
        return CallbackOutcome::Success(OauthCallbackResult { code, state });
    }
    if let Some(description) = error_description {
        return CallbackOutcome::Error(description);
    }
    CallbackOutcome::Invalid
}

/// Binds a single-request loopback listener. The port must appear verbatim
/// in the registered redirect URI, so callers read it back via
/// [`LoopbackListener::redirect_uri`] rather than hard-coding it.
pub struct LoopbackListener {
    guard: CallbackServerGuard,
    redirect_uri: String,
    rx: oneshot::Receiver<(String, String)>,
}

impl LoopbackListener {
    pub fn bind(callback_path: &str) -> std::io::Result<Self> {
        let server = Server::http("127.0.0.1:0").map_err(std::io::Error::other)?;
        let server = Arc::new(server);
        let addr = match server.server_addr() {
            tiny_http::ListenAddr::IP(std::net::SocketAddr::V4(addr)) => addr.to_string(),
            tiny_http::ListenAddr::IP(std::net::SocketAddr::V6(addr)) => addr.to_string(),
            #[allow(unreachable_patterns)]
            _ => return Err(std::io::Error::other("unable to determine callback address")),
        };
        let redirect_uri = format!("http://{addr}{callback_path}");

        let (tx, rx) = oneshot::channel();
        let expected_path = callback_path.to_string();
        let server_for_task = Arc::clone(&server);
        tokio::task::spawn_blocking(move || {
            while let Ok(request) = server_for_task.recv() {
                let path = request.url().to_string();
                match parse_oauth_callback(&path, &expected_path) {
                    CallbackOutcome::Success(OauthCallbackResult { code, state }) => {
                        let response =
                            Response::from_string("Authentication complete. You may close this window.");
                        let _ = request.respond(response);
                        let _ = tx.send((code, state));
                        break;
                    }
                    CallbackOutcome::Error(description) => {
                        let response =
                            Response::from_string(format!("OAuth error: {description}")).with_status_code(400);
                        let _ = request.respond(response);
                    }
                    CallbackOutcome::Invalid => {
                        let response = Response::from_string("Invalid OAuth callback").with_status_code(400);
                        let _ = request.respond(response);
                    }
                }
            }
        });

        Ok(Self { guard: CallbackServerGuard { server }, redirect_uri, rx })
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub async fn wait_for_code(self, timeout: std::time::Duration) -> Option<(String, String)> {
        let result = tokio::time::timeout(timeout, self.rx).await.ok()?.ok();
        drop(self.guard);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_default_path() {
        let parsed = parse_oauth_callback("/callback?code=abc&state=xyz", "/callback");
        assert!(matches!(parsed, CallbackOutcome::Success(_)));
    }

    #[test]
    fn accepts_custom_path() {
        let parsed = parse_oauth_callback("/oauth/callback?code=abc&state=xyz", "/oauth/callback");
        assert!(matches!(parsed, CallbackOutcome::Success(_)));
    }

    #[test]
    fn rejects_wrong_path() {
        let parsed = parse_oauth_callback("/callback?code=abc&state=xyz", "/oauth/callback");
        assert!(matches!(parsed, CallbackOutcome::Invalid));
    }

    #[test]
    fn surfaces_error_description() {
        let parsed = parse_oauth_callback("/callback?error=access_denied&error_description=nope", "/callback");
        assert!(matches!(parsed, CallbackOutcome::Error(description) if description == "nope"));
    }
}
