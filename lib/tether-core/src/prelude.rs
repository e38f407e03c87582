//! Prelude module for convenient imports.
//!
//! ```ignore
//! use tether_core::prelude::*;
//! ```

pub use crate::{
    Credentials, Error, Method, RequestConfig, RequestOptions, Response, Result, Token, Transport,
    from_json, to_json,
};
