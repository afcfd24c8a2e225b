//! Configuration management for API Gateway handlers.

use std::env;

use auth::secrets::DEFAULT_BACKEND_SECRET_NAME;
use url::Url;

use crate::{Error, Result};

/// Handler configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Cognito domain serving the user-info endpoint
    pub cognito_uri: Url,
    /// User-info endpoint used by end-to-end tests, tried after Cognito
    pub e2e_user_info_uri: Option<Url>,
    /// Issuer of tokens for third-party clients
    pub external_user_pool_uri: Option<String>,
    /// Value of `Access-Control-Allow-Origin`
    pub allowed_origin: String,
    /// Secret holding the backend client credentials
    pub backend_secret_name: String,
    /// Cognito domain issuing backend tokens
    pub backend_auth_uri: Option<Url>,
    /// AWS region
    pub aws_region: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let cognito_host = var("COGNITO_HOST")
            .ok_or_else(|| Error::Config("COGNITO_HOST not set".to_string()))?;

        Ok(Self {
            cognito_uri: parse_uri("COGNITO_HOST", &cognito_host)?,
            e2e_user_info_uri: var("E2E_TESTING_USER_INFO_ENDPOINT")
                .map(|value| parse_uri("E2E_TESTING_USER_INFO_ENDPOINT", &value))
                .transpose()?,
            external_user_pool_uri: var("EXTERNAL_USER_POOL_URI"),
            allowed_origin: var("ALLOWED_ORIGIN").unwrap_or_else(|| "*".to_string()),
            backend_secret_name: var("BACKEND_CLIENT_SECRET_NAME")
                .unwrap_or_else(|| DEFAULT_BACKEND_SECRET_NAME.to_string()),
            backend_auth_uri: var("BACKEND_CLIENT_AUTH_URL")
                .map(|value| parse_uri("BACKEND_CLIENT_AUTH_URL", &value))
                .transpose()?,
            aws_region: var("AWS_REGION").unwrap_or_else(|| "eu-west-1".to_string()),
        })
    }
}

/// Parse a URI, accepting a bare host name as `https://host`.
fn parse_uri(name: &str, value: &str) -> Result<Url> {
    let value = value.trim();
    let with_scheme = if value.contains("://") {
        value.to_string()
    } else {
        format!("https://{}", value)
    };
    Url::parse(&with_scheme).map_err(|e| Error::Config(format!("{} is not a valid URI: {}", name, e)))
}
