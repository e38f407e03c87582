//! OAuth2 bearer token middleware.
//!
//! Two layers share a [`TokenStore`]:
//!
//! - [`OAuth2AuthorizationLayer`] sets `Authorization` from the cached token,
//!   obtaining one first if needed;
//! - [`AuthorizationChallengeLayer`] watches responses for a challenge
//!   (401 by default), refreshes the token and replays the request once.
//!
//! Put the challenge handler outside the injector so replays carry the new
//! token:
//!
//! ```ignore
//! use tether::middleware::{AuthorizationChallengeLayer, OAuth2AuthorizationLayer};
//! use tether::{Pipeline, TokenStore};
//!
//! let store = TokenStore::builder().generate_token(issue_token).build();
//! let pipeline = Pipeline::builder()
//!     .layer(AuthorizationChallengeLayer::new(store.clone()))
//!     .layer(OAuth2AuthorizationLayer::new(store))
//!     .build();
//! ```

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};
use tower::{Layer, Service, ServiceExt};
use tracing::{debug, info};

use super::{HandlerFuture, Terminal};
use crate::{Error, RequestConfig, Response, Result, TokenStore};

type Predicate = Arc<dyn Fn(&Response) -> BoxFuture<'static, bool> + Send + Sync>;

// ============================================================================
// Token injection
// ============================================================================

/// Layer that sets the `Authorization` header from a [`TokenStore`].
#[derive(Debug, Clone)]
pub struct OAuth2AuthorizationLayer {
    store: TokenStore,
}

impl OAuth2AuthorizationLayer {
    /// Create a new injector backed by `store`.
    #[must_use]
    pub fn new(store: TokenStore) -> Self {
        Self { store }
    }
}

impl<S> Layer<S> for OAuth2AuthorizationLayer {
    type Service = OAuth2Authorization<S>;

    fn layer(&self, inner: S) -> Self::Service {
        OAuth2Authorization {
            inner,
            store: self.store.clone(),
        }
    }
}

/// Service that sets the `Authorization` header before calling the inner service.
#[derive(Debug, Clone)]
pub struct OAuth2Authorization<S> {
    inner: S,
    store: TokenStore,
}

impl<S> Service<RequestConfig> for OAuth2Authorization<S>
where
    S: Service<RequestConfig, Response = Response, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = Error;
    type Future = HandlerFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, config: RequestConfig) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let store = self.store.clone();

        Box::pin(async move {
            let token = store.get_token().await?;
            inner.call(config.set_access_token(&token)).await
        })
    }
}

// ============================================================================
// Challenge handling
// ============================================================================

/// Layer that refreshes the token and replays once when a response is a challenge.
#[derive(Clone)]
pub struct AuthorizationChallengeLayer {
    store: TokenStore,
    predicate: Predicate,
}

impl fmt::Debug for AuthorizationChallengeLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationChallengeLayer")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl AuthorizationChallengeLayer {
    /// Create a challenge handler backed by `store`, triggered by 401 responses.
    #[must_use]
    pub fn new(store: TokenStore) -> Self {
        Self {
            store,
            predicate: Arc::new(|response: &Response| {
                future::ready(response.is_unauthorized()).boxed()
            }),
        }
    }

    /// Replace the challenge predicate.
    ///
    /// The predicate receives the response of the first attempt and resolves
    /// to `true` when the token should be refreshed and the request replayed.
    #[must_use]
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Response) -> BoxFuture<'static, bool> + Send + Sync + 'static,
    {
        self.predicate = Arc::new(predicate);
        self
    }
}

impl<S> Layer<S> for AuthorizationChallengeLayer {
    type Service = AuthorizationChallenge<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthorizationChallenge {
            inner,
            store: self.store.clone(),
            predicate: Arc::clone(&self.predicate),
        }
    }
}

/// Service that handles authorization challenges.
#[derive(Clone)]
pub struct AuthorizationChallenge<S> {
    inner: S,
    store: TokenStore,
    predicate: Predicate,
}

impl<S: fmt::Debug> fmt::Debug for AuthorizationChallenge<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationChallenge")
            .field("inner", &self.inner)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl<S> Service<RequestConfig> for AuthorizationChallenge<S>
where
    S: Service<RequestConfig, Response = Response, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = Error;
    type Future = HandlerFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, config: RequestConfig) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let fallback = inner.clone();
        let store = self.store.clone();
        let predicate = Arc::clone(&self.predicate);
        let original = config.clone();

        Box::pin(async move {
            let response = inner.call(config).await?;
            if !predicate(&response).await {
                return Ok(response);
            }

            info!(
                uri = original.uri(),
                www_authenticate = response.header("WWW-Authenticate"),
                "authorization challenge received, refreshing token"
            );
            let token = store.refresh_token().await?;
            let replay = original.set_access_token(&token);

            let result = match original.extensions().get::<Terminal>().cloned() {
                Some(terminal) => terminal.send(replay).await,
                None => {
                    debug!("no terminal transport attached, replaying through inner service");
                    fallback.oneshot(replay).await
                }
            };

            match &result {
                Ok(response) => info!(status = response.status(), "replayed request completed"),
                Err(err) => info!(error = %err, "replayed request failed"),
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert2::{check, let_assert};
    use bytes::Bytes;
    use tower::service_fn;
    use tower::util::BoxCloneService;

    use super::*;
    use crate::Token;
    use crate::middleware::{Handler, SharedHandler};

    const VALID: &str = "Bearer abc123";

    fn generating(calls: &Arc<AtomicUsize>, token: &'static str) -> TokenStore {
        let calls = Arc::clone(calls);
        TokenStore::builder()
            .initial_token(Token::bearer("expired"))
            .generate_token(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(Token::bearer(token)) }
            })
            .build()
    }

    /// Protected resource: 200 with the valid token, 401 otherwise.
    fn secured(sent: &Arc<AtomicUsize>) -> Handler {
        let sent = Arc::clone(sent);
        BoxCloneService::new(service_fn(move |config: RequestConfig| {
            sent.fetch_add(1, Ordering::SeqCst);
            let authorized = config.header("Authorization") == Some(VALID);
            async move {
                let response = if authorized {
                    Response::new(200, HashMap::new(), Bytes::from_static(b"{\"data\":\"foo\"}"))
                } else {
                    let headers = HashMap::from([(
                        "www-authenticate".to_string(),
                        "Bearer realm=\"example\"".to_string(),
                    )]);
                    Response::new(401, headers, Bytes::new())
                };
                Ok::<_, Error>(response)
            }
        }))
    }

    #[tokio::test]
    async fn injects_cached_token() {
        let sent = Arc::new(AtomicUsize::new(0));
        let store = TokenStore::builder().initial_token(Token::bearer("abc123")).build();

        let response = OAuth2AuthorizationLayer::new(store)
            .layer(secured(&sent))
            .oneshot(RequestConfig::new("/secured", Default::default()))
            .await
            .expect("response");

        check!(response.status() == 200);
        check!(sent.load(Ordering::SeqCst) == 1);
    }

    #[tokio::test]
    async fn token_failure_skips_inner_service() {
        let sent = Arc::new(AtomicUsize::new(0));
        let store = TokenStore::builder().build();

        let result = OAuth2AuthorizationLayer::new(store)
            .layer(secured(&sent))
            .oneshot(RequestConfig::default())
            .await;

        let_assert!(Err(Error::GenerateUnsupported) = result);
        check!(sent.load(Ordering::SeqCst) == 0);
    }

    #[tokio::test]
    async fn challenge_refreshes_and_replays_once() {
        let sent = Arc::new(AtomicUsize::new(0));
        let generated = Arc::new(AtomicUsize::new(0));
        let store = generating(&generated, "abc123");

        let service = AuthorizationChallengeLayer::new(store.clone())
            .layer(OAuth2AuthorizationLayer::new(store.clone()).layer(secured(&sent)));
        let response = service
            .oneshot(RequestConfig::new("/secured", Default::default()))
            .await
            .expect("response");

        check!(response.status() == 200);
        check!(response.text().expect("text") == "{\"data\":\"foo\"}");
        check!(generated.load(Ordering::SeqCst) == 1);
        check!(sent.load(Ordering::SeqCst) == 2);
        check!(store.current_token() == Some(Token::bearer("abc123")));
    }

    #[tokio::test]
    async fn second_challenge_is_returned_unchanged() {
        let sent = Arc::new(AtomicUsize::new(0));
        let generated = Arc::new(AtomicUsize::new(0));
        let store = generating(&generated, "still-wrong");

        let service = AuthorizationChallengeLayer::new(store.clone())
            .layer(OAuth2AuthorizationLayer::new(store).layer(secured(&sent)));
        let response = service
            .oneshot(RequestConfig::new("/secured", Default::default()))
            .await
            .expect("response");

        check!(response.status() == 401);
        check!(response.header("WWW-Authenticate") == Some("Bearer realm=\"example\""));
        check!(generated.load(Ordering::SeqCst) == 1);
        check!(sent.load(Ordering::SeqCst) == 2);
    }

    #[tokio::test]
    async fn non_challenge_passes_through() {
        let generated = Arc::new(AtomicUsize::new(0));
        let store = generating(&generated, "abc123");
        let not_found = service_fn(|_config: RequestConfig| async {
            Ok::<_, Error>(Response::new(404, HashMap::new(), Bytes::new()))
        });

        let response = AuthorizationChallengeLayer::new(store)
            .layer(not_found)
            .oneshot(RequestConfig::default())
            .await
            .expect("response");

        check!(response.status() == 404);
        check!(generated.load(Ordering::SeqCst) == 0);
    }

    #[tokio::test]
    async fn custom_predicate_triggers_replay() {
        let generated = Arc::new(AtomicUsize::new(0));
        let store = generating(&generated, "abc123");
        let sent = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&sent);
        let forbidden_first = service_fn(move |_config: RequestConfig| {
            let status = if counter.fetch_add(1, Ordering::SeqCst) == 0 { 403 } else { 200 };
            async move { Ok::<_, Error>(Response::new(status, HashMap::new(), Bytes::new())) }
        });

        let response = AuthorizationChallengeLayer::new(store)
            .with_predicate(|response: &Response| {
                future::ready(response.status() == 403).boxed()
            })
            .layer(forbidden_first)
            .oneshot(RequestConfig::default())
            .await
            .expect("response");

        check!(response.status() == 200);
        check!(generated.load(Ordering::SeqCst) == 1);
    }

    #[tokio::test]
    async fn replay_uses_terminal_extension() {
        let generated = Arc::new(AtomicUsize::new(0));
        let store = generating(&generated, "abc123");
        let terminal_calls = Arc::new(AtomicUsize::new(0));
        let terminal = Terminal(SharedHandler::new(secured(&terminal_calls)));

        // The inner service always challenges; only the terminal can succeed.
        let inner_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&inner_calls);
        let always_401 = service_fn(move |_config: RequestConfig| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Error>(Response::new(401, HashMap::new(), Bytes::new())) }
        });

        let response = AuthorizationChallengeLayer::new(store)
            .layer(always_401)
            .oneshot(RequestConfig::default().with_extension(terminal))
            .await
            .expect("response");

        check!(response.status() == 200);
        check!(inner_calls.load(Ordering::SeqCst) == 1);
        check!(terminal_calls.load(Ordering::SeqCst) == 1);
    }

    #[tokio::test]
    async fn terminal_replay_failure_is_surfaced() {
        let generated = Arc::new(AtomicUsize::new(0));
        let store = generating(&generated, "abc123");
        let unreachable: Handler = BoxCloneService::new(service_fn(|_config: RequestConfig| async {
            Err::<Response, _>(Error::connection("connection refused"))
        }));
        let terminal = Terminal(SharedHandler::new(unreachable));

        let inner_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&inner_calls);
        let always_401 = service_fn(move |_config: RequestConfig| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Error>(Response::new(401, HashMap::new(), Bytes::new())) }
        });

        let result = AuthorizationChallengeLayer::new(store)
            .layer(always_401)
            .oneshot(RequestConfig::default().with_extension(terminal))
            .await;

        let_assert!(Err(err) = result);
        check!(err.is_connection());
        check!(generated.load(Ordering::SeqCst) == 1);
        check!(inner_calls.load(Ordering::SeqCst) == 1);
    }

    #[tokio::test]
    async fn inner_replay_failure_is_surfaced() {
        let generated = Arc::new(AtomicUsize::new(0));
        let store = generating(&generated, "abc123");
        let sent = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&sent);
        let challenge_then_drop = service_fn(move |_config: RequestConfig| {
            let first = counter.fetch_add(1, Ordering::SeqCst) == 0;
            async move {
                if first {
                    Ok(Response::new(401, HashMap::new(), Bytes::new()))
                } else {
                    Err(Error::connection("connection reset"))
                }
            }
        });

        let result = AuthorizationChallengeLayer::new(store)
            .layer(challenge_then_drop)
            .oneshot(RequestConfig::default())
            .await;

        let_assert!(Err(err) = result);
        check!(err.is_connection());
        check!(generated.load(Ordering::SeqCst) == 1);
        check!(sent.load(Ordering::SeqCst) == 2);
    }

    #[tokio::test]
    async fn refresh_failure_is_surfaced() {
        let sent = Arc::new(AtomicUsize::new(0));
        let store = TokenStore::builder()
            .initial_token(Token::bearer("expired"))
            .generate_token(|| async { Err(Error::http(503, "authority down")) })
            .build();

        let result = AuthorizationChallengeLayer::new(store.clone())
            .layer(OAuth2AuthorizationLayer::new(store).layer(secured(&sent)))
            .oneshot(RequestConfig::default())
            .await;

        let_assert!(Err(err) = result);
        check!(err.status() == Some(503));
        check!(sent.load(Ordering::SeqCst) == 1);
    }
}
