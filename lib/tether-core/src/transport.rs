//! Transport trait.
//!
//! A [`Transport`] is the terminal step of a pipeline: it turns a fully
//! processed [`RequestConfig`] into a [`Response`]. Middleware never talks to
//! the network directly.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;

use crate::{RequestConfig, Response, Result};

/// Executes a request described by a [`RequestConfig`].
///
/// Implement this trait to plug a different HTTP stack (or a test double)
/// under the pipeline.
pub trait Transport: Send + Sync + 'static {
    /// Send the request and return the buffered response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails for any reason:
    /// - Invalid URI
    /// - Network errors
    /// - TLS errors
    /// - Timeouts
    fn send(&self, config: RequestConfig) -> impl Future<Output = Result<Response<Bytes>>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    fn send(&self, config: RequestConfig) -> impl Future<Output = Result<Response<Bytes>>> + Send {
        T::send(self, config)
    }
}
