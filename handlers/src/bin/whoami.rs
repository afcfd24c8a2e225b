//! Who-am-I Lambda - Reports the caller's identity as resolved from the request.
//!
//! Endpoints:
//! - GET /whoami - User name, customer and client classification of the caller

use std::sync::Arc;

use apigateway::media_types::negotiate_request;
use apigateway::response::default_headers;
use apigateway::{
    AuthorizationResolver, Config, GatewayResponse, MediaType, RequestInfo, SupportedMediaTypes,
};
use auth::CognitoUserInfoClient;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde::Serialize;
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Identity response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WhoAmIResponse {
    user_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_customer: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    feide_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_level_org_cristin_id: Option<Url>,
    is_application_admin: bool,
    client_is_internal_backend: bool,
    client_is_third_party: bool,
}

/// Application state
struct AppState {
    config: Config,
    user_info_client: CognitoUserInfoClient,
    supported_media_types: SupportedMediaTypes,
}

impl AppState {
    fn new() -> Result<Self, Error> {
        let config = Config::from_env()?;
        let user_info_client = CognitoUserInfoClient::new(
            reqwest::Client::new(),
            &config.cognito_uri,
            config.e2e_user_info_uri.clone(),
        )?;

        Ok(Self {
            config,
            user_info_client,
            supported_media_types: SupportedMediaTypes::new(MediaType::json_utf_8())
                .with(MediaType::json_ld()),
        })
    }
}

async fn who_am_i(state: &AppState, event: Value) -> apigateway::Result<GatewayResponse> {
    let request = RequestInfo::from_value(event)
        .map_err(|e| apigateway::Error::BadRequest(format!("Invalid request: {}", e)))?;
    let content_type = negotiate_request(&request, &state.supported_media_types)?;

    let mut resolver = AuthorizationResolver::new(&request, &state.user_info_client);
    if let Some(external) = &state.config.external_user_pool_uri {
        resolver = resolver.with_external_user_pool_uri(external.clone());
    }

    let response = WhoAmIResponse {
        user_name: resolver.user_name().await?,
        current_customer: resolver.current_customer().await.ok(),
        feide_id: resolver.feide_id().await,
        top_level_org_cristin_id: resolver.top_level_org_cristin_id().await,
        is_application_admin: resolver.user_is_application_admin().await,
        client_is_internal_backend: resolver.client_is_internal_backend(),
        client_is_third_party: resolver.client_is_third_party(),
    };

    GatewayResponse::json(
        &response,
        default_headers(&content_type, &state.config.allowed_origin),
        200,
    )
}

async fn handler(state: Arc<AppState>, event: LambdaEvent<Value>) -> Result<GatewayResponse, Error> {
    let request_id = event.context.request_id.clone();
    info!("RequestId: {}", request_id);

    let result = who_am_i(&state, event.payload).await;
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

    let state = Arc::new(AppState::new()?);

    run(service_fn(move |event| {
        let state = Arc::clone(&state);
        async move { handler(state, event).await }
    }))
    .await
}
