//! API Gateway proxy responses.

use std::collections::HashMap;

use http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, warn};

use crate::media_types::MediaType;
use crate::{Error, Result};

/// The `{statusCode, headers, body}` envelope API Gateway expects back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    status_code: u16,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    body: String,
}

impl GatewayResponse {
    /// Response with `body` serialized as JSON.
    pub fn json<T: Serialize + ?Sized>(
        body: &T,
        headers: HashMap<String, String>,
        status_code: u16,
    ) -> Result<Self> {
        Ok(Self {
            status_code,
            headers,
            body: serde_json::to_string(body)?,
        })
    }

    /// Response with a body that is already rendered.
    pub fn text(body: impl Into<String>, headers: HashMap<String, String>, status_code: u16) -> Self {
        Self {
            status_code,
            headers,
            body: body.into(),
        }
    }

    /// RFC 7807 problem response describing `error`.
    pub fn problem(error: &Error, request_id: &str, allowed_origin: &str) -> Self {
        let status = error.status_code();
        let body = json!({
            "title": error.title(),
            "status": status,
            "detail": error.to_string(),
            "requestId": request_id,
        });
        Self::text(
            body.to_string(),
            default_headers(&MediaType::problem_json(), allowed_origin),
            status,
        )
    }

    /// The handler's response, or a problem response for its error.
    ///
    /// Server-side failures are logged at ERROR, client errors at WARN.
    pub fn from_result(result: Result<Self>, request_id: &str, allowed_origin: &str) -> Self {
        match result {
            Ok(response) => response,
            Err(e) => {
                let status = e.status_code();
                if status >= 500 {
                    error!(error = %auth::single_line(&e), status, "Unexpected failure");
                } else {
                    warn!(error = %e, status, "Request failed");
                }
                Self::problem(&e, request_id, allowed_origin)
            }
        }
    }

    /// Parse a serialized response, e.g. the output of a handler under test.
    pub fn from_json(response: &str) -> Result<Self> {
        Ok(serde_json::from_str(response)?)
    }

    /// Deserialize the body.
    pub fn body_object<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

/// `Content-Type` and CORS headers shared by all responses.
pub fn default_headers(content_type: &MediaType, allowed_origin: &str) -> HashMap<String, String> {
    HashMap::from([
        (CONTENT_TYPE.to_string(), content_type.to_string()),
        (ACCESS_CONTROL_ALLOW_ORIGIN.to_string(), allowed_origin.to_string()),
    ])
}
