//! Prelude module for convenient imports.
//!
//! ```ignore
//! use tether::prelude::*;
//! ```

pub use crate::middleware::{Middleware, MiddlewareChain};
pub use crate::{
    Credentials, Error, HyperTransport, Method, Pipeline, RequestConfig, RequestOptions, Response,
    Result, Token, TokenStore, Transport,
};
