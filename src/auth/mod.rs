//! Interactive OAuth authorization-code flow
//!
//! One attempt walks through `AuthPhase`:
//! `Idle -> Listening -> AwaitingRedirect -> Validating -> Authenticated | Failed`.
//!
//! A short-lived local HTTP listener receives the browser redirect, checks the
//! echoed `state` against the nonce generated for this attempt and exchanges
//! the code for a token. The waiting caller is released exactly once, by the
//! first handled callback, whether it succeeded or not. The listener is shut
//! down as soon as that callback has been answered.

mod callback;
mod oauth;

pub use oauth::Authenticator;

use crate::spotify::Token;
use async_trait::async_trait;
use callback::CallbackContext;
use rand::Rng;
use rand::distr::Alphanumeric;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Path the authorization server redirects the browser to
pub const CALLBACK_PATH: &str = "/callback";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("failed to start callback listener on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("callback state does not match the authorization request")]
    StateMismatch,

    #[error("authorization was denied: {0}")]
    Denied(String),

    #[error("token exchange failed ({status}): {message}")]
    Exchange { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no browser callback within {0:?}")]
    TimedOut(Duration),

    #[error("callback listener stopped before any callback was handled")]
    ListenerClosed,
}

/// Authorization server operations the flow depends on
#[async_trait]
pub trait OAuthProvider: Send + Sync + 'static {
    /// URL the user is sent to for consent
    fn authorize_url(&self, state: &AuthState, redirect_uri: &str) -> Result<String, AuthError>;

    /// Trade an authorization code for an access token
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<Token, AuthError>;
}

/// Anti-forgery nonce for one authorization attempt
#[derive(Clone, PartialEq, Eq)]
pub struct AuthState(String);

impl AuthState {
    pub const LEN: usize = 16;

    pub fn generate() -> Self {
        let nonce = rand::rng()
            .sample_iter(Alphanumeric)
            .take(Self::LEN)
            .map(char::from)
            .collect();
        Self(nonce)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exact comparison against the value echoed by the redirect
    pub fn matches(&self, echoed: &str) -> bool {
        self.0 == echoed
    }
}

impl fmt::Debug for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthState(..)")
    }
}

/// Progress of one authorization attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Idle,
    Listening,
    AwaitingRedirect,
    Validating,
    Authenticated,
    Failed,
}

/// Shared phase cell, written by both the caller and the callback handler
#[derive(Debug, Clone)]
struct PhaseTracker(Arc<Mutex<AuthPhase>>);

impl PhaseTracker {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(AuthPhase::Idle)))
    }

    fn get(&self) -> AuthPhase {
        *self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn advance(&self, to: AuthPhase) {
        let mut phase = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if matches!(*phase, AuthPhase::Authenticated | AuthPhase::Failed) {
            return;
        }
        debug!(from = ?*phase, ?to, "auth phase");
        *phase = to;
    }
}

/// Redirect URI registered for a listener on `port`
pub fn callback_url(port: u16) -> String {
    format!("http://127.0.0.1:{port}{CALLBACK_PATH}")
}

/// One interactive authentication attempt
pub struct AuthSession<P> {
    provider: Arc<P>,
    port: u16,
    timeout: Option<Duration>,
    phase: PhaseTracker,
}

impl<P: OAuthProvider> AuthSession<P> {
    pub fn new(provider: P, port: u16) -> Self {
        Self {
            provider: Arc::new(provider),
            port,
            timeout: None,
            phase: PhaseTracker::new(),
        }
    }

    /// Bound the wait for the browser callback
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[allow(dead_code)] // Inspected by tests
    pub fn phase(&self) -> AuthPhase {
        self.phase.get()
    }

    /// Run the flow and return the access token.
    ///
    /// `open_browser` is called once with the authorization URL. If it fails,
    /// the URL is logged and the wait continues so the user can open it by hand.
    pub async fn run<F>(&self, open_browser: F) -> Result<Token, AuthError>
    where
        F: FnOnce(&str) -> std::io::Result<()>,
    {
        let result = self.authenticate(open_browser).await;
        match &result {
            Ok(token) => {
                self.phase.advance(AuthPhase::Authenticated);
                info!(
                    scope = %token.scope,
                    refreshable = token.refresh_token.is_some(),
                    "successfully authenticated"
                );
            }
            Err(e) => {
                self.phase.advance(AuthPhase::Failed);
                error!("authentication failed: {e}");
            }
        }
        result
    }

    async fn authenticate<F>(&self, open_browser: F) -> Result<Token, AuthError>
    where
        F: FnOnce(&str) -> std::io::Result<()>,
    {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| AuthError::Bind {
                port: self.port,
                source,
            })?;
        let port = listener
            .local_addr()
            .map_err(|source| AuthError::Bind {
                port: self.port,
                source,
            })?
            .port();
        self.phase.advance(AuthPhase::Listening);

        let nonce = AuthState::generate();
        let redirect_uri = callback_url(port);
        let url = self.provider.authorize_url(&nonce, &redirect_uri)?;

        let (done_tx, done_rx) = oneshot::channel();
        let context = CallbackContext::new(
            Arc::clone(&self.provider),
            nonce,
            redirect_uri,
            self.phase.clone(),
            done_tx,
        );
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, callback::router(context))
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!("performing Spotify API authentication");
        self.phase.advance(AuthPhase::AwaitingRedirect);
        if let Err(e) = open_browser(&url) {
            warn!("could not open a browser ({e}); open this URL to continue: {url}");
        }

        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, done_rx)
                .await
                .unwrap_or(Ok(Err(AuthError::TimedOut(limit)))),
            None => done_rx.await,
        };

        // Graceful shutdown lets the callback response reach the browser first
        let _ = shutdown_tx.send(());
        match server.await {
            Ok(Ok(())) => debug!("callback listener stopped"),
            Ok(Err(e)) => warn!("callback listener failed: {e}"),
            Err(e) => warn!("callback listener task failed: {e}"),
        }

        outcome.unwrap_or(Err(AuthError::ListenerClosed))
    }
}

#[cfg(test)]
mod tests {
    use super::oauth::SCOPES;
    use super::*;
    use assert2::assert;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider whose "authorization server" redirects straight back to the
    /// callback, echoing `echo_state` (or the real nonce when `None`).
    struct MockProvider {
        echo_state: Option<String>,
        exchange_ok: bool,
        exchanges: Arc<AtomicUsize>,
    }

    impl MockProvider {
        fn new(echo_state: Option<&str>, exchange_ok: bool) -> (Self, Arc<AtomicUsize>) {
            let exchanges = Arc::new(AtomicUsize::new(0));
            let provider = Self {
                echo_state: echo_state.map(str::to_string),
                exchange_ok,
                exchanges: Arc::clone(&exchanges),
            };
            (provider, exchanges)
        }
    }

    #[async_trait]
    impl OAuthProvider for MockProvider {
        fn authorize_url(&self, state: &AuthState, redirect_uri: &str) -> Result<String, AuthError> {
            let echoed = self.echo_state.as_deref().unwrap_or(state.as_str());
            Ok(format!("{redirect_uri}?code=test-code&state={echoed}"))
        }

        async fn exchange_code(&self, code: &str, _redirect_uri: &str) -> Result<Token, AuthError> {
            self.exchanges.fetch_add(1, Ordering::SeqCst);
            assert!(code == "test-code");
            if !self.exchange_ok {
                return Err(AuthError::Exchange {
                    status: 400,
                    message: "invalid_grant".to_string(),
                });
            }
            Ok(Token {
                access_token: "access".to_string(),
                token_type: "Bearer".to_string(),
                expires_in: 3600,
                refresh_token: None,
                scope: SCOPES.join(" "),
            })
        }
    }

    /// Browser stand-in: follows the authorization URL and reports the response
    fn browser() -> (
        impl FnOnce(&str) -> std::io::Result<()>,
        oneshot::Receiver<(u16, String)>,
    ) {
        let (tx, rx) = oneshot::channel();
        let open = move |url: &str| {
            let url = url.to_string();
            tokio::spawn(async move {
                let response = reqwest::get(url).await.unwrap();
                let status = response.status().as_u16();
                let body = response.text().await.unwrap();
                let _ = tx.send((status, body));
            });
            Ok(())
        };
        (open, rx)
    }

    #[test]
    fn test_nonce_shape() {
        let nonce = AuthState::generate();
        assert!(nonce.as_str().len() >= 10);
        assert!(nonce.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_nonces_differ() {
        assert!(AuthState::generate() != AuthState::generate());
    }

    #[test]
    fn test_nonce_matches_exactly() {
        let nonce = AuthState::generate();
        let echoed = nonce.as_str().to_string();
        assert!(nonce.matches(&echoed));
        assert!(!nonce.matches(&echoed[1..]));
        assert!(!nonce.matches(&format!("{echoed}x")));
        assert!(!nonce.matches(""));
    }

    #[tokio::test]
    async fn test_successful_flow() {
        let (provider, exchanges) = MockProvider::new(None, true);
        let session = AuthSession::new(provider, 0);
        let (open, response) = browser();

        let token = session.run(open).await.unwrap();
        assert!(token.access_token == "access");
        assert!(session.phase() == AuthPhase::Authenticated);
        assert!(exchanges.load(Ordering::SeqCst) == 1);

        let (status, body) = response.await.unwrap();
        assert!(status == 200);
        assert!(body.contains("window.close()"));
    }

    #[tokio::test]
    async fn test_state_mismatch_is_not_found() {
        let (provider, exchanges) = MockProvider::new(Some("forged-state"), true);
        let session = AuthSession::new(provider, 0);
        let (open, response) = browser();

        let result = session.run(open).await;
        assert!(let Err(AuthError::StateMismatch) = result);
        assert!(session.phase() == AuthPhase::Failed);
        // No token is requested for a forged callback
        assert!(exchanges.load(Ordering::SeqCst) == 0);

        let (status, _) = response.await.unwrap();
        assert!(status == 404);
    }

    #[tokio::test]
    async fn test_exchange_failure_is_forbidden() {
        let (provider, exchanges) = MockProvider::new(None, false);
        let session = AuthSession::new(provider, 0);
        let (open, response) = browser();

        let result = session.run(open).await;
        assert!(let Err(AuthError::Exchange { .. }) = result);
        assert!(session.phase() == AuthPhase::Failed);
        assert!(exchanges.load(Ordering::SeqCst) == 1);

        let (status, _) = response.await.unwrap();
        assert!(status == 403);
    }

    #[tokio::test]
    async fn test_unanswered_consent_times_out() {
        let (provider, _) = MockProvider::new(None, true);
        let session =
            AuthSession::new(provider, 0).with_timeout(Some(Duration::from_millis(50)));

        let result = session.run(|_| Ok(())).await;
        assert!(let Err(AuthError::TimedOut(_)) = result);
        assert!(session.phase() == AuthPhase::Failed);
    }

    #[tokio::test]
    async fn test_browser_launch_failure_keeps_waiting() {
        let (provider, _) = MockProvider::new(None, true);
        let session =
            AuthSession::new(provider, 0).with_timeout(Some(Duration::from_millis(50)));

        let result = session
            .run(|_| Err(std::io::Error::other("no browser")))
            .await;
        // Still waited for a callback rather than failing on the launch error
        assert!(let Err(AuthError::TimedOut(_)) = result);
    }

    #[tokio::test]
    async fn test_port_in_use_is_bind_error() {
        let taken = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = taken.local_addr().unwrap().port();
        let (provider, _) = MockProvider::new(None, true);
        let session = AuthSession::new(provider, port);

        let result = session.run(|_| Ok(())).await;
        assert!(let Err(AuthError::Bind { .. }) = result);
    }

    #[test]
    fn test_callback_url() {
        assert!(callback_url(49152) == "http://127.0.0.1:49152/callback");
    }
}
