//! Browser redirect handler
//!
//! Serves `GET /callback` only. The first request to arrive takes the
//! completion sender, so the waiting caller is released exactly once and any
//! later callback for the same attempt is refused without a second exchange.

use super::{AuthError, AuthPhase, AuthState, CALLBACK_PATH, OAuthProvider, PhaseTracker};
use crate::spotify::Token;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Page shown in the browser once the token has been obtained
const SUCCESS_PAGE: &str = "<html><body>Browser window can be closed now.\
<script>window.close()</script></body></html>";

type Completion = oneshot::Sender<Result<Token, AuthError>>;

/// Query parameters of the authorization redirect
#[derive(Debug, Default, Deserialize)]
pub(super) struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    /// Set instead of `code` when the user declines consent
    error: Option<String>,
}

pub(super) struct CallbackContext<P> {
    provider: Arc<P>,
    nonce: AuthState,
    redirect_uri: String,
    phase: PhaseTracker,
    completion: Mutex<Option<Completion>>,
}

impl<P: OAuthProvider> CallbackContext<P> {
    pub(super) fn new(
        provider: Arc<P>,
        nonce: AuthState,
        redirect_uri: String,
        phase: PhaseTracker,
        completion: Completion,
    ) -> Arc<Self> {
        Arc::new(Self {
            provider,
            nonce,
            redirect_uri,
            phase,
            completion: Mutex::new(Some(completion)),
        })
    }

    fn take_completion(&self) -> Option<Completion> {
        self.completion
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    /// Check the echoed state, then exchange the code
    async fn validate(&self, params: CallbackParams) -> Result<Token, AuthError> {
        let echoed = params.state.unwrap_or_default();
        if !self.nonce.matches(&echoed) {
            return Err(AuthError::StateMismatch);
        }
        if let Some(reason) = params.error {
            return Err(AuthError::Denied(reason));
        }
        let code = params
            .code
            .ok_or_else(|| AuthError::Denied("redirect carried no authorization code".to_string()))?;

        self.provider.exchange_code(&code, &self.redirect_uri).await
    }
}

pub(super) fn router<P: OAuthProvider>(context: Arc<CallbackContext<P>>) -> Router {
    Router::new()
        .route(CALLBACK_PATH, get(handle_callback::<P>))
        .with_state(context)
}

pub(super) async fn handle_callback<P: OAuthProvider>(
    State(context): State<Arc<CallbackContext<P>>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let Some(completion) = context.take_completion() else {
        warn!("ignoring repeated authorization callback");
        return (StatusCode::NOT_FOUND, "Authorization already handled").into_response();
    };
    context.phase.advance(AuthPhase::Validating);

    let result = context.validate(params).await;
    let response = match &result {
        Ok(_) => Html(SUCCESS_PAGE).into_response(),
        Err(AuthError::StateMismatch) => {
            warn!("callback state mismatch");
            (StatusCode::NOT_FOUND, "State mismatch").into_response()
        }
        Err(e) => {
            warn!("could not obtain token: {e}");
            (StatusCode::FORBIDDEN, "Couldn't get token").into_response()
        }
    };

    if completion.send(result).is_err() {
        debug!("authorization caller stopped waiting");
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingProvider {
        exchanges: AtomicUsize,
    }

    #[async_trait]
    impl OAuthProvider for CountingProvider {
        fn authorize_url(&self, _: &AuthState, redirect_uri: &str) -> Result<String, AuthError> {
            Ok(redirect_uri.to_string())
        }

        async fn exchange_code(&self, _: &str, _: &str) -> Result<Token, AuthError> {
            self.exchanges.fetch_add(1, Ordering::SeqCst);
            Ok(Token {
                access_token: "access".to_string(),
                token_type: "Bearer".to_string(),
                expires_in: 3600,
                refresh_token: Some("refresh".to_string()),
                scope: String::new(),
            })
        }
    }

    fn context() -> (
        Arc<CallbackContext<CountingProvider>>,
        oneshot::Receiver<Result<Token, AuthError>>,
    ) {
        let (tx, rx) = oneshot::channel();
        let context = CallbackContext::new(
            Arc::new(CountingProvider::default()),
            AuthState::generate(),
            "http://127.0.0.1:49152/callback".to_string(),
            PhaseTracker::new(),
            tx,
        );
        (context, rx)
    }

    fn params(context: &CallbackContext<CountingProvider>) -> CallbackParams {
        CallbackParams {
            code: Some("code".to_string()),
            state: Some(context.nonce.as_str().to_string()),
            error: None,
        }
    }

    #[tokio::test]
    async fn test_signals_exactly_once() {
        let (context, mut rx) = context();

        let first = handle_callback(State(Arc::clone(&context)), Query(params(&context))).await;
        assert!(first.status() == StatusCode::OK);
        assert!(let Ok(Ok(_)) = rx.try_recv());

        // A replayed redirect is refused and never reaches the token endpoint
        let second = handle_callback(State(Arc::clone(&context)), Query(params(&context))).await;
        assert!(second.status() == StatusCode::NOT_FOUND);
        assert!(context.provider.exchanges.load(Ordering::SeqCst) == 1);
    }

    #[tokio::test]
    async fn test_missing_state_is_mismatch() {
        let (context, mut rx) = context();
        let params = CallbackParams {
            code: Some("code".to_string()),
            ..Default::default()
        };

        let response = handle_callback(State(Arc::clone(&context)), Query(params)).await;
        assert!(response.status() == StatusCode::NOT_FOUND);
        assert!(let Ok(Err(AuthError::StateMismatch)) = rx.try_recv());
        assert!(context.provider.exchanges.load(Ordering::SeqCst) == 0);
    }

    #[tokio::test]
    async fn test_denied_consent_is_forbidden() {
        let (context, mut rx) = context();
        let params = CallbackParams {
            code: None,
            state: Some(context.nonce.as_str().to_string()),
            error: Some("access_denied".to_string()),
        };

        let response = handle_callback(State(Arc::clone(&context)), Query(params)).await;
        assert!(response.status() == StatusCode::FORBIDDEN);
        assert!(let Ok(Err(AuthError::Denied(_))) = rx.try_recv());
    }

    #[tokio::test]
    async fn test_success_advances_to_validating() {
        let (context, _rx) = context();
        let _ = handle_callback(State(Arc::clone(&context)), Query(params(&context))).await;
        // The caller, not the handler, settles the terminal phase
        assert!(context.phase.get() == AuthPhase::Validating);
    }
}
