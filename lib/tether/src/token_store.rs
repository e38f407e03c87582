//! In-memory OAuth2 token cache.
//!
//! [`TokenStore`] owns the current [`Token`] and knows how to obtain a new
//! one. Two optional producers back it:
//!
//! - `fetch_token` retrieves an existing token from the authority;
//! - `generate_token` asks the authority to issue a new one.
//!
//! Each producer is wrapped in its own [`RaceGuard`], so concurrent callers
//! share one in-flight fetch and one in-flight generation.
//!
//! # Example
//!
//! ```ignore
//! use tether::{Token, TokenStore};
//!
//! let store = TokenStore::builder()
//!     .initial_token(Token::bearer("abc123"))
//!     .fetch_token(|| async { fetch_from_server().await })
//!     .generate_token(|| async { issue_on_server().await })
//!     .build();
//!
//! let token = store.get_token().await?;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use crate::{Error, RaceGuard, Result, Token};

struct Inner {
    token: Mutex<Option<Token>>,
    fetch: RaceGuard<Token>,
    generate: RaceGuard<Token>,
}

/// Cached OAuth2 token with on-demand fetch, generation and refresh.
///
/// Cloning is cheap; clones share the cached token and the in-flight calls.
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<Inner>,
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore")
            .field("has_token", &self.current_token().is_some())
            .field("fetch", &self.inner.fetch)
            .field("generate", &self.inner.generate)
            .finish()
    }
}

impl TokenStore {
    /// Create a new store builder.
    #[must_use]
    pub fn builder() -> TokenStoreBuilder {
        TokenStoreBuilder::default()
    }

    /// The cached token, without any I/O.
    #[must_use]
    pub fn current_token(&self) -> Option<Token> {
        self.inner
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drop the cached token.
    pub fn clear(&self) {
        *self.inner.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn store(&self, token: &Token) {
        *self.inner.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
    }

    /// Return the cached token, or obtain one.
    ///
    /// Without a cached token, the store fetches one; if the fetch fails for
    /// any reason it falls back to generating one. The token obtained either
    /// way is cached. When both fail, the generator's error is returned.
    pub async fn get_token(&self) -> Result<Token> {
        if let Some(token) = self.current_token() {
            debug!("using cached token");
            return Ok(token);
        }

        let token = match self.inner.fetch.call().await {
            Ok(token) => {
                debug!("fetched token");
                token
            }
            Err(err) => {
                if !matches!(err, Error::FetchUnsupported) {
                    warn!(error = %err, "fetching token failed, generating a new one");
                }
                let token = self.inner.generate.call().await?;
                debug!("generated token");
                token
            }
        };

        self.store(&token);
        Ok(token)
    }

    /// Discard the cached token and generate a new one.
    ///
    /// A refresh never tries to fetch: it always asks for a fresh issuance.
    pub async fn refresh_token(&self) -> Result<Token> {
        self.clear();
        debug!("refreshing token");

        let token = self.inner.generate.call().await?;
        self.store(&token);
        Ok(token)
    }
}

/// Builder for [`TokenStore`].
#[derive(Debug, Default)]
pub struct TokenStoreBuilder {
    initial_token: Option<Token>,
    fetch: Option<RaceGuard<Token>>,
    generate: Option<RaceGuard<Token>>,
}

impl TokenStoreBuilder {
    /// Seed the cache with a token.
    #[must_use]
    pub fn initial_token(mut self, token: Token) -> Self {
        self.initial_token = Some(token);
        self
    }

    /// Set how an existing token is retrieved from the authority.
    #[must_use]
    pub fn fetch_token<F, Fut>(mut self, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Token>> + Send + 'static,
    {
        self.fetch = Some(RaceGuard::new(fetch));
        self
    }

    /// Set how a new token is issued by the authority.
    #[must_use]
    pub fn generate_token<F, Fut>(mut self, generate: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Token>> + Send + 'static,
    {
        self.generate = Some(RaceGuard::new(generate));
        self
    }

    /// Build the store.
    #[must_use]
    pub fn build(self) -> TokenStore {
        let fetch = self
            .fetch
            .unwrap_or_else(|| RaceGuard::new(|| async { Err(Error::FetchUnsupported) }));
        let generate = self
            .generate
            .unwrap_or_else(|| RaceGuard::new(|| async { Err(Error::GenerateUnsupported) }));

        TokenStore {
            inner: Arc::new(Inner {
                token: Mutex::new(self.initial_token),
                fetch,
                generate,
            }),
        }
    }
}
