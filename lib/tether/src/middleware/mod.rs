//! Middleware composition.
//!
//! A [`Handler`] turns a [`RequestConfig`] into a [`Response`]. A
//! [`Middleware`] wraps a handler ("next") into a new handler that may
//! transform the config before forwarding it, and may inspect, replace or
//! recover the result afterwards.
//!
//! Any Tower [`Layer`] over [`Handler`] is a [`Middleware`], so middleware is
//! written the Tower way: a `Layer` plus a `Service`. Closures can be lifted
//! with [`tower::layer::layer_fn`], [`map_config`] or [`from_fn`].
//!
//! # Order
//!
//! A [`MiddlewareChain`] composes right to left: the first middleware pushed
//! is the outermost one.
//!
//! ```text
//! config → M1 → M2 → M3 → transport
//! result ← M1 ← M2 ← M3 ← transport
//! ```
//!
//! # Available Layers
//!
//! - [`OAuth2AuthorizationLayer`] - Injects the cached token as `Authorization`
//! - [`AuthorizationChallengeLayer`] - Refreshes the token and replays once on 401
//! - [`LoggingLayer`] - Logs requests/responses using `tracing`
//! - [`MapConfigLayer`] - Async config pre-processing from a closure
//! - [`FromFnLayer`] - Full request/response wrapping from a closure

mod from_fn;
mod logging;
mod map_config;
mod oauth2;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use tower::ServiceExt;
use tower::util::BoxCloneService;
use tower_service::Service;

use crate::{Error, RequestConfig, Response, Result};

pub use from_fn::{FromFn, FromFnLayer, Next, from_fn};
pub use logging::{LogLevel, Logging, LoggingLayer};
pub use map_config::{MapConfig, MapConfigLayer, map_config};
pub use oauth2::{
    AuthorizationChallenge, AuthorizationChallengeLayer, OAuth2Authorization,
    OAuth2AuthorizationLayer,
};

// Re-export tower types for convenience
pub use tower::Layer;
pub use tower::layer::layer_fn;

/// Type-erased, cloneable request handler.
pub type Handler = BoxCloneService<RequestConfig, Response, Error>;

/// Future returned by handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Response>> + Send + 'static>>;

/// A transform from the next handler to a new handler.
///
/// Implemented for every Tower [`Layer`] over [`Handler`] whose service is
/// `Clone + Send`.
pub trait Middleware: Send + Sync + 'static {
    /// Wrap `next` into a new handler.
    fn apply(&self, next: Handler) -> Handler;
}

impl<L> Middleware for L
where
    L: Layer<Handler> + Send + Sync + 'static,
    L::Service: Service<RequestConfig, Response = Response, Error = Error> + Clone + Send + 'static,
    <L::Service as Service<RequestConfig>>::Future: Send + 'static,
{
    fn apply(&self, next: Handler) -> Handler {
        BoxCloneService::new(self.layer(next))
    }
}

/// Ordered list of middleware.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("len", &self.middlewares.len())
            .finish()
    }
}

impl MiddlewareChain {
    /// Empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware; it runs inside every middleware already pushed.
    pub fn push<M: Middleware>(&mut self, middleware: M) {
        self.middlewares.push(Arc::new(middleware));
    }

    /// Builder-style [`MiddlewareChain::push`].
    #[must_use]
    pub fn with<M: Middleware>(mut self, middleware: M) -> Self {
        self.push(middleware);
        self
    }

    /// Number of middleware in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Returns `true` if the chain has no middleware.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Build a single handler, with the first middleware outermost.
    #[must_use]
    pub fn compose(&self, terminal: Handler) -> Handler {
        self.middlewares
            .iter()
            .rev()
            .fold(terminal, |next, middleware| middleware.apply(next))
    }
}

/// Thread-safe handle on a [`Handler`].
///
/// [`Handler`] is `Send` but not `Sync`; this wrapper clones the handler out
/// of a mutex on each call so it can be shared freely.
#[derive(Clone)]
pub struct SharedHandler {
    inner: Arc<Mutex<Handler>>,
}

impl fmt::Debug for SharedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedHandler").finish_non_exhaustive()
    }
}

impl SharedHandler {
    /// Wrap a handler.
    #[must_use]
    pub fn new(handler: Handler) -> Self {
        Self {
            inner: Arc::new(Mutex::new(handler)),
        }
    }

    /// Run the handler on `config`.
    pub fn call(&self, config: RequestConfig) -> HandlerFuture {
        // Lock, clone the handler, and release the lock immediately
        let handler = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        Box::pin(handler.oneshot(config))
    }
}

/// The bare transport of a pipeline, attached to every [`RequestConfig`] it runs.
///
/// Lets a middleware re-send a request without going through the chain
/// again (see [`AuthorizationChallengeLayer`]).
#[derive(Debug, Clone)]
pub struct Terminal(pub SharedHandler);

impl Terminal {
    /// Send `config` straight to the transport.
    pub fn send(&self, config: RequestConfig) -> HandlerFuture {
        self.0.call(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use bytes::Bytes;
    use tower::service_fn;

    use super::*;

    /// Handler that answers 200 and echoes the URI in the body.
    fn echo() -> Handler {
        BoxCloneService::new(service_fn(|config: RequestConfig| async move {
            Ok::<_, Error>(Response::new(
                200,
                HashMap::new(),
                Bytes::from(config.uri().to_string()),
            ))
        }))
    }

    /// Middleware that records `pre:<name>` and `post:<name>` around `next`.
    fn recording(name: &'static str, log: Arc<Mutex<Vec<String>>>) -> impl Middleware {
        from_fn(move |config, next: Next| {
            let log = Arc::clone(&log);
            async move {
                log.lock().expect("lock").push(format!("pre:{name}"));
                let result = next.run(config).await;
                log.lock().expect("lock").push(format!("post:{name}"));
                result
            }
        })
    }

    #[tokio::test]
    async fn empty_chain_is_terminal() {
        let chain = MiddlewareChain::new();
        assert!(chain.is_empty());

        let response = chain
            .compose(echo())
            .oneshot(RequestConfig::new("/request", Default::default()))
            .await
            .expect("response");
        assert_eq!(response.text().expect("text"), "/request");
    }

    #[tokio::test]
    async fn first_middleware_is_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = MiddlewareChain::new()
            .with(recording("a", Arc::clone(&log)))
            .with(recording("b", Arc::clone(&log)))
            .with(recording("c", Arc::clone(&log)));
        assert_eq!(chain.len(), 3);

        chain
            .compose(echo())
            .oneshot(RequestConfig::default())
            .await
            .expect("response");

        let log = log.lock().expect("lock").clone();
        assert_eq!(
            log,
            ["pre:a", "pre:b", "pre:c", "post:c", "post:b", "post:a"]
        );
    }

    #[tokio::test]
    async fn config_transforms_apply_in_declared_order() {
        let chain = MiddlewareChain::new()
            .with(map_config(|config: RequestConfig| async move {
                Ok(config.update_uri(|uri| format!("{uri}/a")))
            }))
            .with(map_config(|config: RequestConfig| async move {
                Ok(config.update_uri(|uri| format!("{uri}/b")))
            }));

        let response = chain
            .compose(echo())
            .oneshot(RequestConfig::default())
            .await
            .expect("response");
        assert_eq!(response.text().expect("text"), "/a/b");
    }

    #[tokio::test]
    async fn layer_fn_is_middleware() {
        let chain = MiddlewareChain::new().with(layer_fn(|next: Handler| {
            service_fn(move |config: RequestConfig| {
                next.clone().oneshot(config.update_uri(|_| "/rewritten".to_string()))
            })
        }));

        let response = chain
            .compose(echo())
            .oneshot(RequestConfig::default())
            .await
            .expect("response");
        assert_eq!(response.text().expect("text"), "/rewritten");
    }

    #[tokio::test]
    async fn shared_handler_can_be_called_concurrently() {
        let shared = SharedHandler::new(echo());
        let (a, b) = tokio::join!(
            shared.call(RequestConfig::new("/a", Default::default())),
            shared.call(RequestConfig::new("/b", Default::default()))
        );

        assert_eq!(a.expect("a").text().expect("text"), "/a");
        assert_eq!(b.expect("b").text().expect("text"), "/b");
    }
}
