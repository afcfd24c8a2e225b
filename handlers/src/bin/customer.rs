//! Customer Lambda - Returns the customer the caller acts on behalf of.
//!
//! Endpoints:
//! - GET /customer/current - The caller's current customer, read from the customer service
//!
//! The customer service is called with backend client credentials from Secrets Manager.

use std::sync::Arc;

use apigateway::media_types::negotiate_request;
use apigateway::response::default_headers;
use apigateway::{
    AuthorizationResolver, Config, GatewayResponse, MediaType, RequestInfo, SupportedMediaTypes,
};
use auth::{AuthorizedBackendClient, CognitoUserInfoClient};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_secretsmanager::Client as SecretsClient;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state
struct AppState {
    config: Config,
    user_info_client: CognitoUserInfoClient,
    backend_client: AuthorizedBackendClient,
    supported_media_types: SupportedMediaTypes,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env()?;
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.aws_region.clone()))
            .load()
            .await;
        let secrets_client = SecretsClient::new(&aws_config);

        let http_client = reqwest::Client::new();
        let user_info_client = CognitoUserInfoClient::new(
            http_client.clone(),
            &config.cognito_uri,
            config.e2e_user_info_uri.clone(),
        )?;
        let backend_auth_uri = config
            .backend_auth_uri
            .as_ref()
            .unwrap_or(&config.cognito_uri);
        let backend_client = AuthorizedBackendClient::from_secrets_manager(
            http_client,
            &secrets_client,
            backend_auth_uri,
            &config.backend_secret_name,
        )
        .await?;

        Ok(Self {
            config,
            user_info_client,
            backend_client,
            supported_media_types: SupportedMediaTypes::new(MediaType::json_utf_8())
                .with(MediaType::json_ld()),
        })
    }
}

async fn current_customer(state: &AppState, event: Value) -> apigateway::Result<GatewayResponse> {
    let request = RequestInfo::from_value(event)
        .map_err(|e| apigateway::Error::BadRequest(format!("Invalid request: {}", e)))?;
    let content_type = negotiate_request(&request, &state.supported_media_types)?;

    let mut resolver = AuthorizationResolver::new(&request, &state.user_info_client);
    if let Some(external) = &state.config.external_user_pool_uri {
        resolver = resolver.with_external_user_pool_uri(external.clone());
    }

    // Third-party clients act without a logged-in user.
    if resolver.client_is_third_party() {
        return Err(apigateway::Error::Forbidden);
    }
    let customer = resolver.current_customer().await?;

    info!(customer = %customer, "Fetching current customer");
    let response = state
        .backend_client
        .send(state.backend_client.http_client().get(customer))
        .await?;
    let status = response.status();
    let body = response.text().await.map_err(auth::Error::from)?;
    if !status.is_success() {
        return Err(auth::Error::Status {
            status: status.as_u16(),
            body,
        }
        .into());
    }

    Ok(GatewayResponse::text(
        body,
        default_headers(&content_type, &state.config.allowed_origin),
        200,
    ))
}

async fn handler(state: Arc<AppState>, event: LambdaEvent<Value>) -> Result<GatewayResponse, Error> {
    let request_id = event.context.request_id.clone();
    info!("RequestId: {}", request_id);

    let result = current_customer(&state, event.payload).await;
    Ok(GatewayResponse::from_result(
        result,
        &request_id,
        &state.config.allowed_origin,
    ))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let state = Arc::new(AppState::new().await?);

    run(service_fn(move |event| {
        let state = Arc::clone(&state);
        async move { handler(state, event).await }
    }))
    .await
}
