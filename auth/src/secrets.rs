//! Backend client credentials stored in AWS Secrets Manager.

use aws_sdk_secretsmanager::Client as SecretsClient;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use tokio::sync::RwLock;
use tracing::info;

use crate::{Error, Result};

/// Default name of the secret holding the backend Cognito client.
pub const DEFAULT_BACKEND_SECRET_NAME: &str = "BackendCognitoClientCredentials";

/// Credentials already read by this Lambda instance, by secret name.
type CredentialsCache = RwLock<HashMap<String, BackendClientCredentials>>;

static BACKEND_CREDENTIALS: OnceLock<CredentialsCache> = OnceLock::new();

/// OAuth2 client used for machine-to-machine calls between backend services.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackendClientCredentials {
    pub id: String,
    pub secret: String,
}

impl std::fmt::Debug for BackendClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClientCredentials")
            .field("id", &self.id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Read the backend client credentials stored under `secret_name`.
///
/// The secret is read from Secrets Manager once per Lambda instance.
pub async fn get_backend_credentials(
    client: &SecretsClient,
    secret_name: &str,
) -> Result<BackendClientCredentials> {
    let cache = BACKEND_CREDENTIALS.get_or_init(CredentialsCache::default);
    if let Some(credentials) = cache.read().await.get(secret_name) {
        return Ok(credentials.clone());
    }

    let credentials = parse_backend_credentials(&read_secret_string(client, secret_name).await?)?;
    info!(secret_name, client_id = %credentials.id, "Loaded backend client credentials");
    cache
        .write()
        .await
        .insert(secret_name.to_string(), credentials.clone());
    Ok(credentials)
}

async fn read_secret_string(client: &SecretsClient, secret_name: &str) -> Result<String> {
    let output = client
        .get_secret_value()
        .secret_id(secret_name)
        .send()
        .await
        .map_err(|e| Error::Aws(format!("Could not read secret {}: {}", secret_name, e)))?;

    output
        .secret_string()
        .map(str::to_string)
        .ok_or_else(|| Error::Aws(format!("Secret {} is not a string secret", secret_name)))
}

fn parse_backend_credentials(secret_string: &str) -> Result<BackendClientCredentials> {
    serde_json::from_str(secret_string)
        .map_err(|e| Error::Aws(format!("Malformed backend client credentials: {}", e)))
}
