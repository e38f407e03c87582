//! Pipeline entry point.
//!
//! A [`Pipeline`] is a [`MiddlewareChain`] bound to a [`Transport`]. Every
//! call builds a [`RequestConfig`], runs it through the chain, and hands it
//! to the transport.

use std::fmt;
use std::task::{Context, Poll};
use std::time::Duration;

use tower::util::BoxCloneService;
use tower_service::Service;

use crate::middleware::{
    Handler, HandlerFuture, Middleware, MiddlewareChain, SharedHandler, Terminal,
};
use crate::transport::{HyperTransportBuilder, TransportService};
use crate::{Error, RequestConfig, RequestOptions, Response, Result, Transport};

/// Composed middleware chain plus transport.
///
/// Cloning is cheap; clones share the chain and the transport.
///
/// # Example
///
/// ```ignore
/// use tether::{Method, Pipeline, RequestOptions};
/// use tether::middleware::LoggingLayer;
///
/// let pipeline = Pipeline::builder().layer(LoggingLayer::new()).build();
/// let response = pipeline
///     .fetch("https://example.com/secured", RequestOptions::new(Method::Get))
///     .await?;
/// ```
#[derive(Clone)]
pub struct Pipeline {
    handler: SharedHandler,
    terminal: Terminal,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create a new pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Pipeline without middleware over `transport`.
    #[must_use]
    pub fn new<T: Transport>(transport: T) -> Self {
        Self::builder().transport(transport).build()
    }

    /// Send a request described by `uri` and `opts` through the chain.
    pub fn fetch(&self, uri: impl Into<String>, opts: RequestOptions) -> HandlerFuture {
        self.execute(RequestConfig::new(uri, opts))
    }

    /// Send a pre-built config through the chain.
    ///
    /// The [`Terminal`] extension is attached so middleware can re-send the
    /// request straight to the transport.
    pub fn execute(&self, config: RequestConfig) -> HandlerFuture {
        self.handler.call(config.with_extension(self.terminal.clone()))
    }
}

impl Service<RequestConfig> for Pipeline {
    type Response = Response;
    type Error = Error;
    type Future = HandlerFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        // The shared handler is polled when called
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, config: RequestConfig) -> Self::Future {
        self.execute(config)
    }
}

/// Builder for [`Pipeline`].
///
/// Middleware is applied in order: first added = outermost.
#[derive(Default)]
pub struct PipelineBuilder {
    chain: MiddlewareChain,
    transport: Option<Handler>,
    hyper: HyperTransportBuilder,
}

impl fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("chain", &self.chain)
            .field("custom_transport", &self.transport.is_some())
            .field("hyper", &self.hyper)
            .finish()
    }
}

impl PipelineBuilder {
    /// Add a middleware to the chain.
    #[must_use]
    pub fn layer<M: Middleware>(mut self, middleware: M) -> Self {
        self.chain.push(middleware);
        self
    }

    /// Alias for [`PipelineBuilder::layer`].
    #[must_use]
    pub fn with<M: Middleware>(self, middleware: M) -> Self {
        self.layer(middleware)
    }

    /// Use a pre-built chain, replacing any middleware added so far.
    #[must_use]
    pub fn chain(mut self, chain: MiddlewareChain) -> Self {
        self.chain = chain;
        self
    }

    /// Use a custom transport instead of [`HyperTransport`](crate::HyperTransport).
    ///
    /// The timeout and pool settings below are then ignored.
    #[must_use]
    pub fn transport<T: Transport>(mut self, transport: T) -> Self {
        self.transport = Some(BoxCloneService::new(TransportService::new(transport)));
        self
    }

    // ========================================================================
    // Default transport settings
    // ========================================================================

    /// Set the request timeout of the default [`HyperTransport`](crate::HyperTransport).
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.hyper = self.hyper.timeout(timeout);
        self
    }

    /// Set the connection timeout of the default transport.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.hyper = self.hyper.connect_timeout(timeout);
        self
    }

    /// Set the maximum idle connections per host of the default transport.
    #[must_use]
    pub fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.hyper = self.hyper.pool_idle_per_host(count);
        self
    }

    /// Set the idle connection timeout of the default transport.
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.hyper = self.hyper.pool_idle_timeout(timeout);
        self
    }

    /// Build the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        let transport = self
            .transport
            .unwrap_or_else(|| BoxCloneService::new(TransportService::new(self.hyper.build())));

        let terminal = Terminal(SharedHandler::new(transport.clone()));
        let handler = SharedHandler::new(self.chain.compose(transport));

        Pipeline { handler, terminal }
    }
}

/// Bind `chain` to `transport`.
///
/// Shorthand for `Pipeline::builder().chain(chain).transport(transport).build()`.
#[must_use]
pub fn fetch_with_middleware<T: Transport>(chain: MiddlewareChain, transport: T) -> Pipeline {
    Pipeline::builder().chain(chain).transport(transport).build()
}
