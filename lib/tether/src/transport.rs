//! HTTP transport using hyper-util.
//!
//! [`HyperTransport`] is the default terminal of a [`Pipeline`](crate::Pipeline):
//! it turns a [`RequestConfig`] into an HTTP exchange over a pooled
//! hyper-util client with rustls.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use tower_service::Service;
use tracing::trace;

use crate::middleware::HandlerFuture;
use crate::{Error, RequestConfig, Response, Result, Transport};

/// Create an HTTPS connector with rustls.
///
/// Supports HTTP/1.1 and HTTP/2, with the Mozilla root certificates. Plain
/// `http://` URIs are accepted too.
fn https_connector(connect_timeout: Duration) -> HttpsConnector<HttpConnector> {
    let root_store: rustls::RootCertStore =
        webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();

    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_connect_timeout(Some(connect_timeout));

    HttpsConnectorBuilder::new()
        .with_tls_config(tls_config)
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .wrap_connector(http)
}

/// Builder for [`HyperTransport`].
///
/// Unset values keep their defaults: 30s request timeout, 10s connect
/// timeout, 32 idle connections per host kept for 90s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HyperTransportBuilder {
    timeout: Duration,
    connect_timeout: Duration,
    pool_idle_per_host: usize,
    pool_idle_timeout: Duration,
}

impl Default for HyperTransportBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(90),
        }
    }
}

impl HyperTransportBuilder {
    /// Set the request timeout, from sending to a fully read body.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the maximum idle connections per host.
    #[must_use]
    pub const fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.pool_idle_per_host = count;
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub const fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = timeout;
        self
    }

    /// Build the transport and its connection pool.
    #[must_use]
    pub fn build(self) -> HyperTransport {
        let inner = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(self.pool_idle_timeout)
            .pool_max_idle_per_host(self.pool_idle_per_host)
            .build(https_connector(self.connect_timeout));

        HyperTransport {
            inner,
            timeout: self.timeout,
        }
    }
}

/// [`Transport`] backed by a pooled hyper-util client.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use tether::HyperTransport;
///
/// let transport = HyperTransport::builder()
///     .timeout(Duration::from_secs(5))
///     .build();
/// ```
#[derive(Clone)]
pub struct HyperTransport {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    timeout: Duration,
}

impl fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperTransport")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperTransport {
    /// Create a transport with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a new transport builder.
    #[must_use]
    pub fn builder() -> HyperTransportBuilder {
        HyperTransportBuilder::default()
    }

    /// Request timeout applied to every exchange.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build a hyper request from a config.
    ///
    /// The credentials mode is ignored: this transport keeps no cookie jar.
    fn build_hyper_request(config: RequestConfig) -> Result<http::Request<Full<Bytes>>> {
        let (uri, opts, _extensions) = config.into_parts();
        let url = url::Url::parse(&uri)?;

        let mut builder = http::Request::builder()
            .method(http::Method::from(opts.method))
            .uri(url.as_str());

        for (name, value) in &opts.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let body = opts.body.map_or_else(Full::default, Full::new);
        builder
            .body(body)
            .map_err(|err| Error::invalid_request(err.to_string()))
    }

    /// Extract response headers as a `HashMap`.
    ///
    /// Repeated headers keep the last value; non UTF-8 values are skipped.
    fn extract_headers(headers: &http::HeaderMap) -> HashMap<String, String> {
        headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect()
    }

    async fn execute(&self, config: RequestConfig) -> Result<Response> {
        let hyper_request = Self::build_hyper_request(config)?;
        trace!(method = %hyper_request.method(), uri = %hyper_request.uri(), "sending");

        let exchange = async {
            let response = self
                .inner
                .request(hyper_request)
                .await
                .map_err(Self::map_hyper_error)?;

            let status = response.status().as_u16();
            let headers = Self::extract_headers(response.headers());
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|err| Error::connection(err.to_string()))?
                .to_bytes();

            Ok(Response::new(status, headers, body))
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| Error::Timeout)?
    }

    #[allow(clippy::needless_pass_by_value)]
    fn map_hyper_error(err: hyper_util::client::legacy::Error) -> Error {
        let msg = format!("{err:?}");

        if msg.contains("ssl") || msg.contains("tls") || msg.contains("certificate") {
            return Error::tls(msg);
        }

        Error::connection(msg)
    }
}

impl Transport for HyperTransport {
    async fn send(&self, config: RequestConfig) -> Result<Response> {
        self.execute(config).await
    }
}

/// Tower service over a shared [`Transport`].
///
/// Terminal handler of a pipeline; never calls anything else.
pub struct TransportService<T> {
    transport: Arc<T>,
}

impl<T> TransportService<T> {
    /// Wrap a transport.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }
}

impl<T> Clone for TransportService<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for TransportService<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportService")
            .field("transport", &self.transport)
            .finish()
    }
}

impl<T: Transport> Service<RequestConfig> for TransportService<T> {
    type Response = Response;
    type Error = Error;
    type Future = HandlerFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, config: RequestConfig) -> Self::Future {
        let transport = Arc::clone(&self.transport);
        Box::pin(async move { transport.send(config).await })
    }
}
