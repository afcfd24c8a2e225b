//! Shared library for NVA API Gateway Lambda functions.
//!
//! This crate provides request parsing, content negotiation, authorization
//! and response envelopes used by every handler behind API Gateway.

pub mod access_right;
pub mod authorization;
pub mod config;
pub mod error;
pub mod media_types;
pub mod request_info;
pub mod response;
pub mod singleton;

pub use access_right::AccessRightEntry;
pub use authorization::AuthorizationResolver;
pub use config::Config;
pub use error::{Error, Result};
pub use media_types::{negotiate, negotiate_request, MediaType, SupportedMediaTypes};
pub use request_info::RequestInfo;
pub use response::GatewayResponse;
pub use singleton::{SingletonError, SingletonExt};
