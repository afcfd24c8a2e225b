//! Error types for API Gateway handlers.

use thiserror::Error;

use crate::media_types::MediaType;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while handling an API Gateway request.
#[derive(Error, Debug)]
pub enum Error {
    /// None of the media types in the Accept header can be produced
    #[error("Unsupported Accept header: [{}]. Supported media types: [{}]", join(.requested), join(.supported))]
    UnsupportedMediaType {
        requested: Vec<MediaType>,
        supported: Vec<MediaType>,
    },

    /// Required header is missing
    #[error("Missing from headers: {0}")]
    MissingHeader(String),

    /// Required query parameter is missing
    #[error("Missing from query parameters: {0}")]
    MissingQueryParameter(String),

    /// Required path parameter is missing
    #[error("Missing from path parameters: {0}")]
    MissingPathParameter(String),

    /// Required request context value is missing
    #[error("Missing from request context: {0}")]
    MissingRequestContextParameter(String),

    /// Validation error
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Caller identity could not be established
    #[error("Unauthorized")]
    Unauthorized,

    /// Caller lacks the required access right
    #[error("Forbidden")]
    Forbidden,

    /// A value expected to exist is not there
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Identity service error
    #[error("Identity service error: {0}")]
    Auth(#[from] auth::Error),
}

impl Error {
    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::UnsupportedMediaType { .. } => 415,
            Error::MissingHeader(_)
            | Error::MissingQueryParameter(_)
            | Error::MissingPathParameter(_)
            | Error::MissingRequestContextParameter(_)
            | Error::BadRequest(_) => 400,
            Error::Unauthorized => 401,
            Error::Forbidden => 403,
            Error::Auth(_) => 502,
            _ => 500,
        }
    }

    /// Short human readable title for problem responses.
    pub fn title(&self) -> &'static str {
        match self.status_code() {
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            415 => "Unsupported Media Type",
            502 => "Bad Gateway",
            _ => "Internal Server Error",
        }
    }
}

fn join(media_types: &[MediaType]) -> String {
    media_types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
