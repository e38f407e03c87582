//! OAuth2 bearer credential.

use serde::{Deserialize, Serialize};

/// An OAuth2 access token as returned by a token endpoint.
///
/// Only the two fields needed to build an `Authorization` header are kept;
/// anything else in the token response is ignored on deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    /// Token type, usually `Bearer`.
    pub token_type: String,
    /// Opaque access token value.
    pub access_token: String,
}

impl Token {
    /// Creates a token of the given type.
    #[must_use]
    pub fn new(token_type: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            token_type: token_type.into(),
            access_token: access_token.into(),
        }
    }

    /// Creates a `Bearer` token.
    #[must_use]
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self::new("Bearer", access_token)
    }

    /// Value of the `Authorization` header: `"{token_type} {access_token}"`.
    #[must_use]
    pub fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}
