//! Identity-service clients for NVA Lambda functions.
//!
//! This crate talks to Cognito on behalf of API Gateway handlers: looking up
//! user information for a caller's token, and authorizing calls to other
//! backend services.

pub mod backend_client;
pub mod error;
pub mod secrets;
pub mod user_info;

#[cfg(test)]
mod testing;

pub use backend_client::AuthorizedBackendClient;
pub use error::{single_line, Error, Result};
pub use secrets::{get_backend_credentials, BackendClientCredentials};
pub use user_info::{CognitoUserInfo, CognitoUserInfoClient, FetchUserInfo};

use url::Url;

/// Resolve `path` below a Cognito domain, keeping any path the domain URI already has.
pub(crate) fn cognito_endpoint(cognito_uri: &Url, path: &str) -> Result<Url> {
    let mut base = cognito_uri.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path)
        .map_err(|e| Error::Config(format!("Invalid Cognito URI {}: {}", cognito_uri, e)))
}
