//! Who is calling, and what may they do.
//!
//! Identity attributes are read from the authorizer claims API Gateway put in
//! the request context ("offline"). When a claim is missing, the attribute is
//! looked up at the identity service with the caller's own token ("online").
//! The lookup happens at most once per [`AuthorizationResolver`].
//!
//! The current customer is the exception: the identity service is asked first
//! and the `cognito:groups` claim is the fallback.

use std::future::Future;

use auth::{single_line, CognitoUserInfo, FetchUserInfo};
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use url::Url;

use crate::access_right::{AccessRightEntry, ADMINISTRATE_APPLICATION};
use crate::request_info::RequestInfo;
use crate::singleton::SingletonExt;
use crate::{Error, Result};

pub const USER_NAME_CLAIM: &str = "/authorizer/claims/custom:nvaUsername";
pub const FEIDE_ID_CLAIM: &str = "/authorizer/claims/custom:feideId";
pub const TOP_LEVEL_ORG_CRISTIN_ID_CLAIM: &str = "/authorizer/claims/custom:topOrgCristinId";
pub const PERSON_CRISTIN_ID_CLAIM: &str = "/authorizer/claims/custom:cristinId";
pub const PERSON_NIN_CLAIM: &str = "/authorizer/claims/custom:nin";
pub const PERSON_GROUPS_CLAIM: &str = "/authorizer/claims/cognito:groups";
pub const SCOPES_CLAIM: &str = "/authorizer/claims/scope";
pub const ISSUER_CLAIM: &str = "/authorizer/claims/iss";
pub const CLIENT_ID_CLAIM: &str = "/authorizer/claims/client_id";

/// Scope granted to backend clients by the identity service.
pub const BACKEND_SCOPE: &str = "https://api.nva.unit.no/scopes/backend";

/// Resolves identity attributes and authorization decisions for one request.
pub struct AuthorizationResolver<'a> {
    request: &'a RequestInfo,
    user_info_source: &'a dyn FetchUserInfo,
    external_user_pool_uri: Option<String>,
    user_info: OnceCell<Option<CognitoUserInfo>>,
}

impl<'a> AuthorizationResolver<'a> {
    pub fn new(request: &'a RequestInfo, user_info_source: &'a dyn FetchUserInfo) -> Self {
        Self {
            request,
            user_info_source,
            external_user_pool_uri: None,
            user_info: OnceCell::new(),
        }
    }

    /// Issuer of tokens minted for third-party clients.
    pub fn with_external_user_pool_uri(mut self, uri: impl Into<String>) -> Self {
        self.external_user_pool_uri = Some(uri.into());
        self
    }

    pub async fn user_name(&self) -> Result<String> {
        offline_then_online(self.claim(USER_NAME_CLAIM), async {
            self.user_info().await.and_then(|info| info.user_name.clone())
        })
        .await
        .ok_or(Error::Unauthorized)
    }

    pub async fn feide_id(&self) -> Option<String> {
        offline_then_online(self.claim(FEIDE_ID_CLAIM), async {
            self.user_info().await.and_then(|info| info.feide_id.clone())
        })
        .await
    }

    pub async fn top_level_org_cristin_id(&self) -> Option<Url> {
        offline_then_online(self.uri_claim(TOP_LEVEL_ORG_CRISTIN_ID_CLAIM), async {
            self.user_info()
                .await
                .and_then(|info| info.top_org_cristin_id.clone())
        })
        .await
    }

    pub async fn person_cristin_id(&self) -> Result<Url> {
        offline_then_online(self.uri_claim(PERSON_CRISTIN_ID_CLAIM), async {
            self.user_info()
                .await
                .and_then(|info| info.person_cristin_id.clone())
        })
        .await
        .ok_or(Error::Unauthorized)
    }

    /// National identity number. Absence is an illegal state rather than
    /// `Unauthorized`: every logged-in person has one.
    pub async fn person_nin(&self) -> Result<String> {
        offline_then_online(self.claim(PERSON_NIN_CLAIM), async {
            self.user_info().await.and_then(|info| info.person_nin.clone())
        })
        .await
        .ok_or_else(|| Error::IllegalState("National identity number not found".to_string()))
    }

    /// The customer the user acts on behalf of.
    ///
    /// Unlike the other attributes the identity service is consulted first.
    pub async fn current_customer(&self) -> Result<Url> {
        online_then_offline(self.online_customer(), || self.customer_from_groups())
            .await
            .ok_or(Error::Unauthorized)
    }

    pub fn client_id(&self) -> Option<String> {
        self.claim(CLIENT_ID_CLAIM)
    }

    /// True if the user holds `access_right` at their current customer,
    /// according to either the identity service or the request's own claims.
    pub async fn is_authorized(&self, access_right: &str) -> bool {
        self.is_authorized_online(access_right).await
            || self.is_authorized_offline(access_right).await
    }

    pub async fn user_is_application_admin(&self) -> bool {
        self.is_authorized(ADMINISTRATE_APPLICATION).await
    }

    pub fn client_is_internal_backend(&self) -> bool {
        self.claim(SCOPES_CLAIM)
            .map_or(false, |scopes| scopes.contains(BACKEND_SCOPE))
    }

    pub fn client_is_third_party(&self) -> bool {
        match (self.claim(ISSUER_CLAIM), &self.external_user_pool_uri) {
            (Some(issuer), Some(external)) => &issuer == external,
            _ => false,
        }
    }

    async fn is_authorized_online(&self, access_right: &str) -> bool {
        let Some(customer) = self.online_customer().await else {
            return false;
        };
        let required = AccessRightEntry::new(access_right, customer);
        self.online_access_rights().await.contains(&required)
    }

    async fn is_authorized_offline(&self, access_right: &str) -> bool {
        let customer = offline_then_online(self.customer_from_groups(), self.online_customer()).await;
        match customer {
            Some(customer) => {
                let required = AccessRightEntry::new(access_right, customer);
                self.offline_access_rights().contains(&required)
            }
            None => {
                warn!(access_right, "Authorization failed: current customer could not be resolved");
                false
            }
        }
    }

    async fn online_customer(&self) -> Option<Url> {
        self.user_info()
            .await
            .and_then(|info| info.current_customer.clone())
    }

    async fn online_access_rights(&self) -> Vec<AccessRightEntry> {
        self.user_info()
            .await
            .and_then(|info| info.access_rights.as_deref())
            .map(AccessRightEntry::from_csv)
            .unwrap_or_default()
    }

    fn offline_access_rights(&self) -> Vec<AccessRightEntry> {
        self.claim(PERSON_GROUPS_CLAIM)
            .map(|groups| AccessRightEntry::from_csv(&groups))
            .unwrap_or_default()
    }

    /// The single customer marked as selected upon login in `cognito:groups`.
    fn customer_from_groups(&self) -> Option<Url> {
        self.offline_access_rights()
            .into_iter()
            .filter(AccessRightEntry::describes_customer_upon_login)
            .map(|entry| entry.customer_id().clone())
            .singleton()
    }

    fn claim(&self, pointer: &str) -> Option<String> {
        self.request.request_context_parameter_opt(pointer)
    }

    fn uri_claim(&self, pointer: &str) -> Option<Url> {
        let value = self.claim(pointer)?;
        match Url::parse(&value) {
            Ok(uri) => Some(uri),
            Err(e) => {
                debug!(claim = pointer, error = %e, "Ignoring claim that is not a URI");
                None
            }
        }
    }

    async fn user_info(&self) -> Option<&CognitoUserInfo> {
        self.user_info
            .get_or_init(|| async {
                match self.fetch_user_info().await {
                    Ok(user_info) => Some(user_info),
                    Err(e) => {
                        warn!(
                            error = %single_line(&e),
                            "Could not fetch user information from Cognito"
                        );
                        None
                    }
                }
            })
            .await
            .as_ref()
    }

    async fn fetch_user_info(&self) -> Result<CognitoUserInfo> {
        let authorization = self.request.auth_header()?;
        Ok(self.user_info_source.fetch(authorization).await?)
    }
}

async fn offline_then_online<T, F>(offline: Option<T>, online: F) -> Option<T>
where
    F: Future<Output = Option<T>>,
{
    match offline {
        Some(value) => Some(value),
        None => online.await,
    }
}

async fn online_then_offline<T, F, O>(online: F, offline: O) -> Option<T>
where
    F: Future<Output = Option<T>>,
    O: FnOnce() -> Option<T>,
{
    match online.await {
        Some(value) => Some(value),
        None => offline(),
    }
}
