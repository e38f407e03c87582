//! Deduplication of concurrent async calls.
//!
//! A [`RaceGuard`] wraps a zero-argument async producer. While one call is in
//! flight, every other caller joins it instead of starting a new one, and all
//! of them observe the same outcome. Once the call settles the slot is
//! cleared, so the next call starts a fresh invocation.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tracing::trace;

use crate::Result;

type Producer<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;
type Pending<T> = Shared<BoxFuture<'static, Result<T>>>;

/// At most one in-flight invocation of an async producer.
///
/// Clones share the same pending slot.
///
/// # Example
///
/// ```ignore
/// use tether::RaceGuard;
///
/// let guard = RaceGuard::new(|| async { fetch_token().await });
///
/// // Both callers share one call to `fetch_token`.
/// let (a, b) = tokio::join!(guard.call(), guard.call());
/// ```
pub struct RaceGuard<T> {
    producer: Producer<T>,
    pending: Arc<Mutex<Option<Pending<T>>>>,
}

impl<T> Clone for RaceGuard<T> {
    fn clone(&self) -> Self {
        Self {
            producer: Arc::clone(&self.producer),
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<T> fmt::Debug for RaceGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        f.debug_struct("RaceGuard")
            .field("pending", &pending)
            .finish_non_exhaustive()
    }
}

impl<T> RaceGuard<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Wrap a producer.
    ///
    /// The producer must not call back into the same guard synchronously.
    pub fn new<F, Fut>(producer: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            producer: Arc::new(move || producer().boxed()),
            pending: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns `true` while an invocation is in flight.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Start the producer, or join the invocation already in flight.
    ///
    /// If every caller drops its future before the invocation settles, the
    /// next caller resumes that same invocation.
    pub fn call(&self) -> impl Future<Output = Result<T>> + Send + 'static {
        let mut slot = self.pending.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(pending) = slot.as_ref() {
            trace!("joining in-flight call");
            return pending.clone();
        }

        trace!("starting new call");
        let invocation = (self.producer)();
        let weak = Arc::downgrade(&self.pending);

        let shared = async move {
            let result = invocation.await;
            if let Some(pending) = weak.upgrade() {
                *pending.lock().unwrap_or_else(PoisonError::into_inner) = None;
            }
            result
        }
        .boxed()
        .shared();

        *slot = Some(shared.clone());
        shared
    }
}
