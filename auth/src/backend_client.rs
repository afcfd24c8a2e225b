//! HTTP client that authorizes outgoing requests with a bearer token.
//!
//! The token is either the caller's own access token, forwarded as-is, or a
//! backend token obtained through the OAuth2 client-credentials grant.

use aws_sdk_secretsmanager::Client as SecretsClient;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::AUTHORIZATION;
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::secrets::{get_backend_credentials, BackendClientCredentials};
use crate::{Error, Result};

/// Path of the OAuth2 token endpoint below a Cognito domain.
pub const TOKEN_PATH: &str = "oauth2/token";

const BEARER_PREFIX: &str = "Bearer ";

/// Tokens are refreshed this long before Cognito considers them expired.
const EXPIRY_MARGIN_SECONDS: i64 = 60;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// A lifetime chrono cannot represent makes the token expire immediately.
    fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        let expires_at = Duration::try_seconds(
            response.expires_in.saturating_sub(EXPIRY_MARGIN_SECONDS),
        )
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or_else(|| {
            debug!(expires_in = response.expires_in, "Token lifetime out of range");
            now
        });
        Self {
            access_token: response.access_token,
            expires_at,
        }
    }

    fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug)]
enum TokenSource {
    User(String),
    Backend {
        token_uri: Url,
        credentials: BackendClientCredentials,
        cached: Mutex<Option<CachedToken>>,
    },
}

/// Client injecting an `Authorization: Bearer ...` header into every request.
#[derive(Debug, Clone)]
pub struct AuthorizedBackendClient {
    http_client: reqwest::Client,
    token_source: Arc<TokenSource>,
}

impl AuthorizedBackendClient {
    /// Forward the caller's token. A missing `Bearer ` prefix is added.
    pub fn with_user_credentials(http_client: reqwest::Client, bearer_token: &str) -> Self {
        let token = bearer_token.trim();
        let header = if token.starts_with(BEARER_PREFIX) {
            token.to_string()
        } else {
            format!("{}{}", BEARER_PREFIX, token)
        };
        Self {
            http_client,
            token_source: Arc::new(TokenSource::User(header)),
        }
    }

    /// Authenticate as a backend client against the Cognito domain at `cognito_uri`.
    pub fn with_backend_credentials(
        http_client: reqwest::Client,
        cognito_uri: &Url,
        credentials: BackendClientCredentials,
    ) -> Result<Self> {
        Ok(Self {
            http_client,
            token_source: Arc::new(TokenSource::Backend {
                token_uri: token_uri(cognito_uri)?,
                credentials,
                cached: Mutex::new(None),
            }),
        })
    }

    /// Like [`Self::with_backend_credentials`], with the credentials read from
    /// the Secrets Manager secret `secret_name`.
    pub async fn from_secrets_manager(
        http_client: reqwest::Client,
        secrets_client: &SecretsClient,
        cognito_uri: &Url,
        secret_name: &str,
    ) -> Result<Self> {
        let credentials = get_backend_credentials(secrets_client, secret_name).await?;
        Self::with_backend_credentials(http_client, cognito_uri, credentials)
    }

    /// The underlying client, for building requests.
    pub fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }

    /// Attach the authorization header to a request.
    pub async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let header = self.authorization_header().await?;
        Ok(request.header(AUTHORIZATION, header))
    }

    /// Authorize and send a request.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authorize(request).await?.send().await?;
        Ok(response)
    }

    async fn authorization_header(&self) -> Result<String> {
        match self.token_source.as_ref() {
            TokenSource::User(header) => Ok(header.clone()),
            TokenSource::Backend {
                token_uri,
                credentials,
                cached,
            } => {
                let mut cached = cached.lock().await;
                let now = Utc::now();
                if let Some(token) = cached.as_ref().filter(|t| t.is_valid_at(now)) {
                    return Ok(format!("{}{}", BEARER_PREFIX, token.access_token));
                }

                debug!(token_uri = %token_uri, "Fetching backend access token");
                let token = self.fetch_backend_token(token_uri, credentials).await?;
                let header = format!("{}{}", BEARER_PREFIX, token.access_token);
                *cached = Some(token);
                Ok(header)
            }
        }
    }

    async fn fetch_backend_token(
        &self,
        token_uri: &Url,
        credentials: &BackendClientCredentials,
    ) -> Result<CachedToken> {
        let response = self
            .http_client
            .post(token_uri.clone())
            .basic_auth(&credentials.id, Some(&credentials.secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = serde_json::from_str(&body)?;
        info!(expires_in = token.expires_in, "Obtained backend access token");
        Ok(CachedToken::from_response(token, Utc::now()))
    }
}

/// Build the token endpoint for a Cognito domain.
pub fn token_uri(cognito_uri: &Url) -> Result<Url> {
    crate::cognito_endpoint(cognito_uri, TOKEN_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CannedServer;

    const TOKEN_RESPONSE: &str =
        r#"{"access_token":"fresh-token","expires_in":3600,"token_type":"Bearer"}"#;

    fn credentials() -> BackendClientCredentials {
        BackendClientCredentials {
            id: "backend-client".to_string(),
            secret: "s3cr3t".to_string(),
        }
    }

    fn authorization_of(request: RequestBuilder) -> String {
        let request = request.build().unwrap();
        request
            .headers()
            .get(AUTHORIZATION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_user_token_is_forwarded() {
        let http_client = reqwest::Client::new();
        let client = AuthorizedBackendClient::with_user_credentials(http_client, "Bearer abc.def");
        let request = client
            .authorize(client.http_client().get("https://example.org/resource"))
            .await
            .unwrap();
        assert_eq!(authorization_of(request), "Bearer abc.def");
    }

    #[tokio::test]
    async fn test_user_token_gets_bearer_prefix() {
        let client =
            AuthorizedBackendClient::with_user_credentials(reqwest::Client::new(), "abc.def");
        let request = client
            .authorize(client.http_client().get("https://example.org/resource"))
            .await
            .unwrap();
        assert_eq!(authorization_of(request), "Bearer abc.def");
    }

    #[tokio::test]
    async fn test_cached_backend_token_is_reused() {
        let cognito = Url::parse("https://auth.example.org").unwrap();
        let client = AuthorizedBackendClient::with_backend_credentials(
            reqwest::Client::new(),
            &cognito,
            credentials(),
        )
        .unwrap();
        if let TokenSource::Backend { cached, .. } = client.token_source.as_ref() {
            *cached.lock().await = Some(CachedToken {
                access_token: "cached-token".to_string(),
                expires_at: Utc::now() + Duration::minutes(10),
            });
        }

        let request = client
            .authorize(client.http_client().get("https://example.org/resource"))
            .await
            .unwrap();
        assert_eq!(authorization_of(request), "Bearer cached-token");
    }

    #[test]
    fn test_token_expiry_has_margin() {
        let now = Utc::now();
        let token = CachedToken::from_response(
            TokenResponse {
                access_token: "t".to_string(),
                expires_in: 3600,
            },
            now,
        );
        assert!(token.is_valid_at(now + Duration::seconds(3500)));
        assert!(!token.is_valid_at(now + Duration::seconds(3545)));
    }

    #[tokio::test]
    async fn test_backend_token_is_fetched_once() {
        let server = CannedServer::start(vec![(200, TOKEN_RESPONSE)]).await;
        let client = AuthorizedBackendClient::with_backend_credentials(
            reqwest::Client::new(),
            server.uri(),
            credentials(),
        )
        .unwrap();

        for _ in 0..2 {
            let request = client
                .authorize(client.http_client().get("https://example.org/resource"))
                .await
                .unwrap();
            assert_eq!(authorization_of(request), "Bearer fresh-token");
        }

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("POST /oauth2/token "));
        assert!(requests[0].to_lowercase().contains("authorization: basic "));
        assert!(requests[0].ends_with("grant_type=client_credentials"));
    }

    #[tokio::test]
    async fn test_expired_token_is_refetched() {
        let server = CannedServer::start(vec![(200, TOKEN_RESPONSE)]).await;
        let client = AuthorizedBackendClient::with_backend_credentials(
            reqwest::Client::new(),
            server.uri(),
            credentials(),
        )
        .unwrap();
        if let TokenSource::Backend { cached, .. } = client.token_source.as_ref() {
            *cached.lock().await = Some(CachedToken {
                access_token: "stale-token".to_string(),
                expires_at: Utc::now() - Duration::seconds(1),
            });
        }

        let request = client
            .authorize(client.http_client().get("https://example.org/resource"))
            .await
            .unwrap();
        assert_eq!(authorization_of(request), "Bearer fresh-token");
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_token_endpoint_rejection() {
        let server = CannedServer::start(vec![(400, r#"{"error":"invalid_client"}"#)]).await;
        let client = AuthorizedBackendClient::with_backend_credentials(
            reqwest::Client::new(),
            server.uri(),
            credentials(),
        )
        .unwrap();

        let result = client
            .authorize(client.http_client().get("https://example.org/resource"))
            .await;
        match result {
            Err(Error::Status { status, body }) => {
                assert_eq!(status, 400);
                assert!(body.contains("invalid_client"));
            }
            other => panic!("expected status error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_unrepresentable_lifetime_expires_immediately() {
        let now = Utc::now();
        for expires_in in [i64::MAX, i64::MIN] {
            let token = CachedToken::from_response(
                TokenResponse {
                    access_token: "t".to_string(),
                    expires_in,
                },
                now,
            );
            assert!(!token.is_valid_at(now));
        }
    }

    #[test]
    fn test_token_uri() {
        let cognito = Url::parse("https://auth.example.org").unwrap();
        assert_eq!(
            token_uri(&cognito).unwrap().as_str(),
            "https://auth.example.org/oauth2/token"
        );
    }
}
