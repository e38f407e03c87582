//! Middleware from an async closure.

use std::fmt;
use std::future::Future;
use std::task::{Context, Poll};

use tower::{Layer, Service, ServiceExt};

use super::{Handler, HandlerFuture};
use crate::{Error, RequestConfig, Response, Result};

/// Build a middleware from a closure receiving the config and the rest of the chain.
///
/// The closure decides whether and how to call [`Next::run`], and can
/// transform, replace or recover whatever it returns.
///
/// # Example
///
/// ```ignore
/// use tether::middleware::{Next, from_fn};
///
/// // Recover from any error with a synthetic 503.
/// let fallback = from_fn(|config, next: Next| async move {
///     match next.run(config).await {
///         Ok(response) => Ok(response),
///         Err(_) => Ok(Response::new(503, HashMap::new(), Bytes::new())),
///     }
/// });
/// ```
pub fn from_fn<F, Fut>(f: F) -> FromFnLayer<F>
where
    F: Fn(RequestConfig, Next) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    FromFnLayer { f }
}

/// The remainder of the chain, as seen from a [`from_fn`] middleware.
pub struct Next {
    inner: Handler,
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").finish_non_exhaustive()
    }
}

impl Next {
    /// Run the rest of the chain.
    pub async fn run(self, config: RequestConfig) -> Result<Response> {
        self.inner.oneshot(config).await
    }
}

/// Layer produced by [`from_fn`].
#[derive(Debug, Clone)]
pub struct FromFnLayer<F> {
    f: F,
}

impl<F: Clone> Layer<Handler> for FromFnLayer<F> {
    type Service = FromFn<F>;

    fn layer(&self, inner: Handler) -> Self::Service {
        FromFn {
            inner,
            f: self.f.clone(),
        }
    }
}

/// Service that delegates to a [`from_fn`] closure.
#[derive(Clone)]
pub struct FromFn<F> {
    inner: Handler,
    f: F,
}

impl<F> fmt::Debug for FromFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FromFn").finish_non_exhaustive()
    }
}

impl<F, Fut> Service<RequestConfig> for FromFn<F>
where
    F: Fn(RequestConfig, Next) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    type Response = Response;
    type Error = Error;
    type Future = HandlerFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        // Readiness of the inner handler is driven by `Next::run`
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, config: RequestConfig) -> Self::Future {
        let next = Next {
            inner: self.inner.clone(),
        };
        Box::pin((self.f)(config, next))
    }
}
