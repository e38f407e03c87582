//! Core types and traits for the tether request pipeline.
//!
//! This crate provides the foundational value types used by tether:
//! - [`RequestConfig`] and [`RequestOptions`] - Immutable request description
//! - [`Method`] - HTTP method enum
//! - [`Response`] - Buffered HTTP response
//! - [`Token`] - OAuth2 bearer credential
//! - [`Error`] and [`Result`] - Error handling
//! - [`Transport`] - Terminal request execution

mod body;
mod config;
mod error;
mod method;
pub mod prelude;
mod response;
mod token;
mod transport;

pub use body::{from_json, to_json};
pub use config::{Credentials, RequestConfig, RequestOptions};
pub use error::{Error, Result};
pub use method::Method;
pub use response::Response;
pub use token::Token;
pub use transport::Transport;
