//! The API Gateway proxy event as seen by a handler.

use std::collections::HashMap;

use http::header::AUTHORIZATION;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::{Error, Result};

const DOMAIN_NAME: &str = "/domainName";
const HTTPS: &str = "https";

/// Headers, parameters and request context of an API Gateway proxy event.
///
/// Fields this type does not model are kept in `other_properties` and written
/// back when the request is serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestInfo {
    #[serde(default, deserialize_with = "null_as_default")]
    headers: HashMap<String, String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    path_parameters: HashMap<String, String>,
    #[serde(
        rename = "queryStringParameters",
        default,
        deserialize_with = "null_as_default"
    )]
    query_parameters: HashMap<String, String>,
    #[serde(default = "empty_object", deserialize_with = "null_as_empty_object")]
    request_context: Value,
    #[serde(default)]
    method_arn: Option<String>,
    #[serde(flatten)]
    other_properties: Map<String, Value>,
}

impl Default for RequestInfo {
    fn default() -> Self {
        Self {
            headers: HashMap::new(),
            path: None,
            path_parameters: HashMap::new(),
            query_parameters: HashMap::new(),
            request_context: empty_object(),
            method_arn: None,
            other_properties: Map::new(),
        }
    }
}

impl RequestInfo {
    /// Build from a raw proxy event.
    pub fn from_value(event: Value) -> Result<Self> {
        Ok(serde_json::from_value(event)?)
    }

    /// Parse a raw proxy event.
    pub fn from_json(event: &str) -> Result<Self> {
        Ok(serde_json::from_str(event)?)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_path_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_query_parameter(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.query_parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_request_context(mut self, request_context: Value) -> Self {
        self.request_context = match request_context {
            Value::Null => empty_object(),
            context => context,
        };
        self
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn path_parameters(&self) -> &HashMap<String, String> {
        &self.path_parameters
    }

    pub fn query_parameters(&self) -> &HashMap<String, String> {
        &self.query_parameters
    }

    pub fn request_context(&self) -> &Value {
        &self.request_context
    }

    pub fn method_arn(&self) -> Option<&str> {
        self.method_arn.as_deref()
    }

    /// Event fields without a dedicated accessor.
    pub fn other_properties(&self) -> &Map<String, Value> {
        &self.other_properties
    }

    /// Header value; an exact name match wins over a case-insensitive one.
    pub fn header_opt(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .or_else(|| {
                self.headers
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value)
            })
            .map(String::as_str)
    }

    pub fn header(&self, name: &str) -> Result<&str> {
        self.header_opt(name)
            .ok_or_else(|| Error::MissingHeader(name.to_string()))
    }

    pub fn auth_header(&self) -> Result<&str> {
        self.header(AUTHORIZATION.as_str())
    }

    pub fn query_parameter_opt(&self, name: &str) -> Option<&str> {
        self.query_parameters.get(name).map(String::as_str)
    }

    pub fn query_parameter(&self, name: &str) -> Result<&str> {
        self.query_parameter_opt(name)
            .ok_or_else(|| Error::MissingQueryParameter(name.to_string()))
    }

    pub fn path_parameter_opt(&self, name: &str) -> Option<&str> {
        self.path_parameters.get(name).map(String::as_str)
    }

    pub fn path_parameter(&self, name: &str) -> Result<&str> {
        self.path_parameter_opt(name)
            .ok_or_else(|| Error::MissingPathParameter(name.to_string()))
    }

    /// Look up a value in the request context by JSON pointer,
    /// e.g. `/authorizer/claims/custom:customerId`.
    ///
    /// Missing and `null` values are `None`. Numbers and booleans are rendered
    /// as text; objects and arrays are not values and give `None`.
    pub fn request_context_parameter_opt(&self, pointer: &str) -> Option<String> {
        match self.request_context.pointer(pointer)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn request_context_parameter(&self, pointer: &str) -> Result<String> {
        self.request_context_parameter_opt(pointer)
            .ok_or_else(|| Error::MissingRequestContextParameter(pointer.to_string()))
    }

    pub fn domain_name(&self) -> Result<String> {
        self.request_context_parameter(DOMAIN_NAME)
    }

    /// The URI the client called, rebuilt from domain name, path and query.
    pub fn request_uri(&self) -> Result<Url> {
        let domain_name = self.domain_name()?;
        let mut uri = Url::parse(&format!("{}://{}", HTTPS, domain_name))
            .map_err(|e| Error::BadRequest(format!("Invalid domain name {}: {}", domain_name, e)))?;
        if let Some(path) = self.path() {
            uri.set_path(path);
        }
        if !self.query_parameters.is_empty() {
            let mut parameters: Vec<_> = self.query_parameters.iter().collect();
            parameters.sort();
            uri.query_pairs_mut().extend_pairs(parameters);
        }
        Ok(uri)
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_empty_object<'de, D>(deserializer: D) -> std::result::Result<Value, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.unwrap_or_else(empty_object))
}
