//! Request/response logging middleware.
//!
//! This middleware logs every config passing through the chain using the
//! `tracing` crate. `Authorization` values are never logged.

use std::collections::BTreeMap;
use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{Instrument, Level, debug, info, span, warn};

use super::HandlerFuture;
use crate::{Error, RequestConfig, Response, Result};

/// Layer that adds request/response logging.
///
/// # Example
///
/// ```ignore
/// use tether::middleware::{LoggingLayer, MiddlewareChain};
///
/// let chain = MiddlewareChain::new().with(LoggingLayer::debug());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingLayer {
    level: LogLevel,
}

/// Log level for the logging middleware.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// Log at debug level (method, URI and headers).
    Debug,
    /// Log at info level (summary only).
    #[default]
    Info,
}

impl LoggingLayer {
    /// Create a new logging layer with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a logging layer that logs at debug level.
    #[must_use]
    pub fn debug() -> Self {
        Self {
            level: LogLevel::Debug,
        }
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = Logging<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Logging {
            inner,
            level: self.level,
        }
    }
}

/// Service that logs configs and their outcome.
#[derive(Debug, Clone)]
pub struct Logging<S> {
    inner: S,
    level: LogLevel,
}

/// Headers with credentials masked.
fn redacted_headers(config: &RequestConfig) -> BTreeMap<String, String> {
    config
        .opts()
        .headers
        .iter()
        .map(|(name, value)| {
            let value = if name.eq_ignore_ascii_case("authorization") {
                "<redacted>".to_string()
            } else {
                value.clone()
            };
            (name.clone(), value)
        })
        .collect()
}

impl<S> Service<RequestConfig> for Logging<S>
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
        let method = config.method();
        let uri = config.uri().to_string();
        let level = self.level;

        let span = span!(Level::INFO, "http_request", %method, %uri);

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(
            async move {
                let start = Instant::now();

                match level {
                    LogLevel::Debug => {
                        debug!(
                            method = %method,
                            uri = %uri,
                            headers = ?redacted_headers(&config),
                            "sending request"
                        );
                    }
                    LogLevel::Info => {
                        info!(method = %method, uri = %uri, "sending request");
                    }
                }

                let result = inner.call(config).await;
                let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

                match &result {
                    Ok(response) if response.ok() => {
                        info!(status = response.status(), elapsed_ms, "request completed");
                    }
                    Ok(response) => {
                        warn!(
                            status = response.status(),
                            elapsed_ms, "request completed with HTTP error"
                        );
                    }
                    Err(err) => {
                        warn!(error = %err, elapsed_ms, "request failed");
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use bytes::Bytes;
    use tower::{ServiceExt, service_fn};

    use super::*;
    use crate::{Method, RequestOptions};

    #[test]
    fn logging_layer_default() {
        let layer = LoggingLayer::new();
        assert_eq!(layer.level, LogLevel::Info);
    }

    #[test]
    fn logging_layer_debug() {
        let layer = LoggingLayer::debug();
        assert_eq!(layer.level, LogLevel::Debug);
    }

    #[test]
    fn authorization_is_redacted() {
        let config = RequestConfig::new(
            "/secured",
            RequestOptions::new(Method::Get)
                .header("authorization", "Bearer abc123")
                .header("Accept", "application/json"),
        );

        let headers = redacted_headers(&config);
        assert_eq!(headers["authorization"], "<redacted>");
        assert_eq!(headers["Accept"], "application/json");
    }

    #[tokio::test]
    async fn passes_result_through() {
        let service = LoggingLayer::debug().layer(service_fn(|_config: RequestConfig| async {
            Ok::<_, Error>(Response::new(404, HashMap::new(), Bytes::from_static(b"missing")))
        }));

        let response = service
            .oneshot(RequestConfig::new("/missing", RequestOptions::default()))
            .await
            .expect("response");
        assert_eq!(response.status(), 404);
        assert_eq!(response.text().expect("text"), "missing");
    }
}
