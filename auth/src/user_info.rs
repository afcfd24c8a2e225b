//! Cognito user-info lookups.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;
use url::Url;

use crate::{Error, Result};

/// Path of the OAuth2 user-info endpoint below a Cognito domain.
pub const USER_INFO_PATH: &str = "oauth2/userInfo";

/// User information returned by the Cognito user-info endpoint.
///
/// Every attribute is optional; the identity service omits attributes the user
/// does not have, and unknown attributes are ignored. A URI attribute that does
/// not parse is treated as missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CognitoUserInfo {
    /// NVA username
    #[serde(rename = "custom:nvaUsername", default)]
    pub user_name: Option<String>,
    /// Feide ID
    #[serde(rename = "custom:feideId", default)]
    pub feide_id: Option<String>,
    /// Top level organization Cristin ID
    #[serde(rename = "custom:topOrgCristinId", default, deserialize_with = "lenient_uri")]
    pub top_org_cristin_id: Option<Url>,
    /// Person Cristin ID
    #[serde(rename = "custom:cristinId", default, deserialize_with = "lenient_uri")]
    pub person_cristin_id: Option<Url>,
    /// National identity number
    #[serde(rename = "custom:nin", default)]
    pub person_nin: Option<String>,
    /// Customer the user selected when logging in
    #[serde(rename = "custom:customerId", default, deserialize_with = "lenient_uri")]
    pub current_customer: Option<Url>,
    /// Comma-separated `right@customer` entries
    #[serde(rename = "custom:accessRights", default)]
    pub access_rights: Option<String>,
}

fn lenient_uri<'de, D>(deserializer: D) -> std::result::Result<Option<Url>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(value) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    match Url::parse(&value) {
        Ok(uri) => Ok(Some(uri)),
        Err(e) => {
            debug!(value = %value, error = %e, "Ignoring user attribute that is not a URI");
            Ok(None)
        }
    }
}

/// Source of user information for a bearer token.
#[async_trait]
pub trait FetchUserInfo: Send + Sync {
    /// Fetch user information for the caller identified by `authorization_header`.
    async fn fetch(&self, authorization_header: &str) -> Result<CognitoUserInfo>;
}

/// Fetches user information from one or more Cognito user-info endpoints.
///
/// Endpoints are tried in order and the first successful answer wins.
#[derive(Debug, Clone)]
pub struct CognitoUserInfoClient {
    http_client: reqwest::Client,
    user_info_uris: Vec<Url>,
}

impl CognitoUserInfoClient {
    /// Create a client for the given Cognito domain, with an optional fallback
    /// endpoint used by end-to-end tests.
    pub fn new(
        http_client: reqwest::Client,
        cognito_uri: &Url,
        e2e_user_info_uri: Option<Url>,
    ) -> Result<Self> {
        let mut user_info_uris = vec![user_info_uri(cognito_uri)?];
        user_info_uris.extend(e2e_user_info_uri);
        Ok(Self {
            http_client,
            user_info_uris,
        })
    }

    /// Endpoints in the order they are tried.
    pub fn user_info_uris(&self) -> &[Url] {
        &self.user_info_uris
    }

    async fn fetch_from(&self, uri: &Url, authorization_header: &str) -> Result<CognitoUserInfo> {
        let response = self
            .http_client
            .get(uri.clone())
            .header(AUTHORIZATION, authorization_header)
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

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl FetchUserInfo for CognitoUserInfoClient {
    async fn fetch(&self, authorization_header: &str) -> Result<CognitoUserInfo> {
        let mut last_error = Error::Config("No user-info endpoint configured".to_string());
        for uri in &self.user_info_uris {
            match self.fetch_from(uri, authorization_header).await {
                Ok(user_info) => return Ok(user_info),
                Err(e) => {
                    debug!(uri = %uri, error = %e, "User-info endpoint failed");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

/// Build the user-info endpoint for a Cognito domain.
pub fn user_info_uri(cognito_uri: &Url) -> Result<Url> {
    crate::cognito_endpoint(cognito_uri, USER_INFO_PATH)
}
