//! Asynchronous config pre-processing.

use std::future::Future;
use std::task::{Context, Poll};

use tower::{Layer, Service};

use super::HandlerFuture;
use crate::{Error, RequestConfig, Response, Result};

/// Build a middleware that rewrites the config before forwarding it.
///
/// The closure may be asynchronous (wait on a timer, look something up) and
/// may fail, in which case the inner handler is never called.
///
/// # Example
///
/// ```ignore
/// use tether::middleware::map_config;
///
/// let add_host = map_config(|config| async move {
///     Ok(config.update_uri(|uri| format!("http://localhost:8080{uri}")))
/// });
/// ```
pub fn map_config<F, Fut>(f: F) -> MapConfigLayer<F>
where
    F: Fn(RequestConfig) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<RequestConfig>> + Send + 'static,
{
    MapConfigLayer { f }
}

/// Layer produced by [`map_config`].
#[derive(Debug, Clone)]
pub struct MapConfigLayer<F> {
    f: F,
}

impl<S, F: Clone> Layer<S> for MapConfigLayer<F> {
    type Service = MapConfig<S, F>;

    fn layer(&self, inner: S) -> Self::Service {
        MapConfig {
            inner,
            f: self.f.clone(),
        }
    }
}

/// Service that rewrites the config before calling the inner service.
#[derive(Debug, Clone)]
pub struct MapConfig<S, F> {
    inner: S,
    f: F,
}

impl<S, F, Fut> Service<RequestConfig> for MapConfig<S, F>
where
    S: Service<RequestConfig, Response = Response, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
    F: Fn(RequestConfig) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<RequestConfig>> + Send + 'static,
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
        let pending = (self.f)(config);

        Box::pin(async move {
            let config = pending.await?;
            inner.call(config).await
        })
    }
}
