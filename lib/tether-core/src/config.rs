//! Immutable request configuration.
//!
//! A [`RequestConfig`] describes one outgoing call: a URI string and a set of
//! [`RequestOptions`]. Middleware never mutates a config in place; every
//! transform returns a new value and leaves the original untouched.
//!
//! # Example
//!
//! ```
//! use tether_core::{RequestConfig, RequestOptions, Token, Method};
//!
//! let config = RequestConfig::new("/secured", RequestOptions::new(Method::Get));
//! let authorized = config
//!     .set_access_token(&Token::bearer("abc123"))
//!     .update_uri(|uri| format!("http://localhost:8080{uri}"));
//!
//! assert_eq!(authorized.uri(), "http://localhost:8080/secured");
//! assert_eq!(authorized.header("Authorization"), Some("Bearer abc123"));
//! assert_eq!(config.header("Authorization"), None);
//! ```

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::{Method, Token};

/// Credentials mode, mirroring the fetch `credentials` option.
///
/// Transports that have no cookie jar ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Credentials {
    /// Never send cookies.
    Omit,
    /// Send cookies for same-origin requests.
    SameOrigin,
    /// Always send cookies.
    Include,
}

/// Options of a request: method, headers, body and credentials mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// HTTP method.
    pub method: Method,
    /// Request headers.
    pub headers: BTreeMap<String, String>,
    /// Request body.
    pub body: Option<Bytes>,
    /// Credentials mode.
    pub credentials: Option<Credentials>,
}

impl RequestOptions {
    /// Options with the given method and nothing else.
    #[must_use]
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        insert_header(&mut self.headers, name.into(), value.into());
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets the credentials mode.
    #[must_use]
    pub const fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets a JSON body and the matching `Content-Type`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn json<T: serde::Serialize>(self, value: &T) -> crate::Result<Self> {
        let body = crate::to_json(value)?;
        Ok(self.header("Content-Type", "application/json").body(body))
    }

    /// Single header value by name (case-insensitive).
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Header names are case-insensitive: drop any spelling of `name` first.
fn insert_header(headers: &mut BTreeMap<String, String>, name: String, value: String) {
    headers.retain(|key, _| !key.eq_ignore_ascii_case(&name));
    headers.insert(name, value);
}

/// An immutable description of an HTTP call.
///
/// Alongside the URI and options, a config carries [`http::Extensions`] for
/// typed data attached by the pipeline. Extensions do not take part in
/// equality.
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    uri: String,
    opts: RequestOptions,
    extensions: http::Extensions,
}

impl PartialEq for RequestConfig {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri && self.opts == other.opts
    }
}

impl Eq for RequestConfig {}

impl RequestConfig {
    /// Creates a config from a URI and options.
    #[must_use]
    pub fn new(uri: impl Into<String>, opts: RequestOptions) -> Self {
        Self {
            uri: uri.into(),
            opts,
            extensions: http::Extensions::new(),
        }
    }

    /// Request URI, as given (not parsed).
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Request options.
    #[must_use]
    pub const fn opts(&self) -> &RequestOptions {
        &self.opts
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.opts.method
    }

    /// Single header value by name (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.opts.get_header(name)
    }

    /// Typed extensions attached to this config.
    #[must_use]
    pub const fn extensions(&self) -> &http::Extensions {
        &self.extensions
    }

    /// Returns a copy with `headers[name] = value`; everything else is preserved.
    #[must_use]
    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        insert_header(&mut next.opts.headers, name.into(), value.into());
        next
    }

    /// Returns a copy with `Authorization: {token_type} {access_token}`.
    #[must_use]
    pub fn set_access_token(&self, token: &Token) -> Self {
        self.set_header("Authorization", token.authorization())
    }

    /// Returns a copy whose URI is `f(uri)`; options are unchanged.
    #[must_use]
    pub fn update_uri<F>(&self, f: F) -> Self
    where
        F: FnOnce(&str) -> String,
    {
        Self {
            uri: f(&self.uri),
            opts: self.opts.clone(),
            extensions: self.extensions.clone(),
        }
    }

    /// Returns a copy with a different method.
    #[must_use]
    pub fn with_method(&self, method: Method) -> Self {
        let mut next = self.clone();
        next.opts.method = method;
        next
    }

    /// Returns a copy with a different body.
    #[must_use]
    pub fn with_body(&self, body: impl Into<Bytes>) -> Self {
        let mut next = self.clone();
        next.opts.body = Some(body.into());
        next
    }

    /// Returns a copy carrying the given extension value.
    #[must_use]
    pub fn with_extension<T>(&self, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut next = self.clone();
        next.extensions.insert(value);
        next
    }

    /// Consume into (uri, options, extensions).
    #[must_use]
    pub fn into_parts(self) -> (String, RequestOptions, http::Extensions) {
        (self.uri, self.opts, self.extensions)
    }
}
