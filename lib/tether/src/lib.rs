//! Composable async HTTP middleware pipeline with transparent OAuth2 token handling.
//!
//! A [`Pipeline`] sends a [`RequestConfig`] through an ordered
//! [`MiddlewareChain`](middleware::MiddlewareChain) to a [`Transport`]. The
//! OAuth2 middleware keeps a bearer token in a [`TokenStore`], injects it on
//! every request, and refreshes it once when the server answers with a
//! challenge.
//!
//! # Example
//!
//! ```ignore
//! use tether::prelude::*;
//! use tether::middleware::{AuthorizationChallengeLayer, OAuth2AuthorizationLayer};
//!
//! let authority = Pipeline::builder().build();
//! let store = TokenStore::builder()
//!     .fetch_token({
//!         let authority = authority.clone();
//!         move || {
//!             let authority = authority.clone();
//!             async move {
//!                 authority
//!                     .fetch("https://auth.example.com/token", RequestOptions::default())
//!                     .await?
//!                     .error_for_status("Token not found")?
//!                     .json::<Token>()
//!             }
//!         }
//!     })
//!     .build();
//!
//! let api = Pipeline::builder()
//!     .layer(AuthorizationChallengeLayer::new(store.clone()))
//!     .layer(OAuth2AuthorizationLayer::new(store))
//!     .build();
//!
//! let response = api
//!     .fetch("https://api.example.com/secured", RequestOptions::default())
//!     .await?;
//! ```

pub mod middleware;
mod pipeline;
pub mod prelude;
mod race_guard;
mod token_store;
mod transport;

pub use pipeline::{Pipeline, PipelineBuilder, fetch_with_middleware};
pub use race_guard::RaceGuard;
pub use token_store::{TokenStore, TokenStoreBuilder};
pub use transport::{HyperTransport, HyperTransportBuilder, TransportService};

// Re-export tower for middleware composition
pub use tower;

// Re-export core types
pub use tether_core::{
    Credentials, Error, Method, RequestConfig, RequestOptions, Response, Result, Token, Transport,
    from_json, to_json,
};
