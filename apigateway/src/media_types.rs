//! Media types and `Accept` header negotiation.
//!
//! A handler declares the media types it can produce, most preferred first.
//! [`negotiate`] picks the response media type from the client's `Accept`
//! header values:
//!
//! - tokens that do not parse are ignored,
//! - `*/*` stands for the handler's most preferred media type,
//! - the client's order decides between several supported candidates,
//! - only UTF-8 is accepted as charset, and it is the default when none is given.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use http::header::ACCEPT;
use thiserror::Error;
use tracing::debug;

use crate::request_info::RequestInfo;
use crate::{Error, Result};

const WILDCARD: &str = "*";
const CHARSET: &str = "charset";
const QUALITY: &str = "q";
const UTF_8: &str = "utf-8";

/// Reasons a media type string is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseMediaTypeError {
    #[error("Empty media type")]
    Empty,
    #[error("Missing subtype in media type: {0}")]
    MissingSubtype(String),
    #[error("Invalid token in media type: {0}")]
    InvalidToken(String),
    #[error("Wildcard type with concrete subtype: {0}")]
    WildcardType(String),
    #[error("Invalid parameter in media type: {0}")]
    InvalidParameter(String),
}

/// A media type such as `application/json; charset=utf-8`.
///
/// Type, subtype and parameter names are case-insensitive and stored in lower
/// case. Parameters are kept sorted, so equality does not depend on the order
/// they were written in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaType {
    type_: String,
    subtype: String,
    parameters: BTreeMap<String, String>,
}

impl MediaType {
    /// Create a media type without parameters.
    pub fn new(type_: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            type_: type_.into().to_ascii_lowercase(),
            subtype: subtype.into().to_ascii_lowercase(),
            parameters: BTreeMap::new(),
        }
    }

    /// `application/json; charset=utf-8`
    pub fn json_utf_8() -> Self {
        Self::new("application", "json").with_charset(UTF_8)
    }

    /// `application/ld+json; charset=utf-8`
    pub fn json_ld() -> Self {
        Self::new("application", "ld+json").with_charset(UTF_8)
    }

    /// `application/problem+json; charset=utf-8`
    pub fn problem_json() -> Self {
        Self::new("application", "problem+json").with_charset(UTF_8)
    }

    /// `text/plain; charset=utf-8`
    pub fn plain_text_utf_8() -> Self {
        Self::new("text", "plain").with_charset(UTF_8)
    }

    /// `text/html; charset=utf-8`
    pub fn html_utf_8() -> Self {
        Self::new("text", "html").with_charset(UTF_8)
    }

    /// `*/*`
    pub fn any() -> Self {
        Self::new(WILDCARD, WILDCARD)
    }

    /// Parse a single media type. The quality parameter `q` is discarded.
    pub fn parse(s: &str) -> std::result::Result<Self, ParseMediaTypeError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseMediaTypeError::Empty);
        }

        let mut parts = s.split(';');
        let essence = parts.next().unwrap_or_default();
        let (type_, subtype) = essence
            .split_once('/')
            .ok_or_else(|| ParseMediaTypeError::MissingSubtype(s.to_string()))?;
        let (type_, subtype) = (type_.trim(), subtype.trim());
        if !is_token(type_) || !is_token(subtype) {
            return Err(ParseMediaTypeError::InvalidToken(s.to_string()));
        }
        if type_ == WILDCARD && subtype != WILDCARD {
            return Err(ParseMediaTypeError::WildcardType(s.to_string()));
        }

        let mut media_type = Self::new(type_, subtype);
        for parameter in parts.map(str::trim).filter(|p| !p.is_empty()) {
            let (name, value) = parameter
                .split_once('=')
                .ok_or_else(|| ParseMediaTypeError::InvalidParameter(parameter.to_string()))?;
            let name = name.trim().to_ascii_lowercase();
            let value = unquote(value.trim());
            if !is_token(&name) || value.is_empty() {
                return Err(ParseMediaTypeError::InvalidParameter(parameter.to_string()));
            }
            if name == QUALITY {
                continue;
            }
            media_type = media_type.with_parameter(name, value);
        }
        Ok(media_type)
    }

    /// Return a copy with the parameter set.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into().to_ascii_lowercase();
        let mut value = value.into();
        if name == CHARSET {
            value = value.to_ascii_lowercase();
        }
        self.parameters.insert(name, value);
        self
    }

    /// Return a copy with the charset set.
    pub fn with_charset(self, charset: &str) -> Self {
        self.with_parameter(CHARSET, charset)
    }

    /// Return a copy with all parameters removed.
    pub fn without_parameters(&self) -> Self {
        Self::new(self.type_.clone(), self.subtype.clone())
    }

    pub fn type_(&self) -> &str {
        &self.type_
    }

    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    pub fn charset(&self) -> Option<&str> {
        self.parameters.get(CHARSET).map(String::as_str)
    }

    /// `*/*`, with or without parameters.
    pub fn is_any(&self) -> bool {
        self.type_ == WILDCARD && self.subtype == WILDCARD
    }

    /// True if the type or subtype is a wildcard.
    pub fn is_range(&self) -> bool {
        self.type_ == WILDCARD || self.subtype == WILDCARD
    }

    /// Compare type and subtype, letting a wildcard on either side match anything.
    /// Parameters are ignored.
    pub fn matches(&self, other: &MediaType) -> bool {
        let type_matches =
            self.type_ == WILDCARD || other.type_ == WILDCARD || self.type_ == other.type_;
        let subtype_matches = self.subtype == WILDCARD
            || other.subtype == WILDCARD
            || self.subtype == other.subtype;
        type_matches && subtype_matches
    }

    /// True when no charset is given or the charset is UTF-8.
    pub fn has_utf_8_or_no_charset(&self) -> bool {
        self.charset().map_or(true, is_utf_8)
    }

    /// Return a copy with charset UTF-8 unless a charset is already set.
    pub fn with_default_charset(self) -> Self {
        if self.charset().is_some() {
            self
        } else {
            self.with_charset(UTF_8)
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_, self.subtype)?;
        for (name, value) in &self.parameters {
            write!(f, "; {}={}", name, value)?;
        }
        Ok(())
    }
}

impl FromStr for MediaType {
    type Err = ParseMediaTypeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Media types a handler can produce, most preferred first. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedMediaTypes(Vec<MediaType>);

impl SupportedMediaTypes {
    /// Start a list with its most preferred media type.
    pub fn new(most_preferred: MediaType) -> Self {
        Self(vec![most_preferred])
    }

    /// Append a media type with lower preference than the ones already listed.
    pub fn with(mut self, media_type: MediaType) -> Self {
        self.0.push(media_type);
        self
    }

    pub fn most_preferred(&self) -> &MediaType {
        &self.0[0]
    }

    pub fn as_slice(&self) -> &[MediaType] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MediaType> {
        self.0.iter()
    }
}

impl Default for SupportedMediaTypes {
    fn default() -> Self {
        Self::new(MediaType::json_utf_8())
    }
}

impl TryFrom<Vec<MediaType>> for SupportedMediaTypes {
    type Error = Error;

    fn try_from(media_types: Vec<MediaType>) -> Result<Self> {
        if media_types.is_empty() {
            return Err(Error::Config(
                "A handler must support at least one media type".to_string(),
            ));
        }
        Ok(Self(media_types))
    }
}

/// Pick the response media type for the given `Accept` header values.
///
/// Each value may hold several comma-separated media types. Fails with
/// [`Error::UnsupportedMediaType`] when no requested media type is supported.
pub fn negotiate<S: AsRef<str>>(
    accepted: &[S],
    supported: &SupportedMediaTypes,
) -> Result<MediaType> {
    let requested: Vec<MediaType> = accepted
        .iter()
        .flat_map(|value| value.as_ref().split(','))
        .filter_map(|token| parse_requested(token, supported.most_preferred()))
        .collect();

    let negotiated = requested
        .iter()
        .filter(|media_type| media_type.has_utf_8_or_no_charset())
        .find_map(|media_type| resolve(media_type, supported))
        .map(MediaType::with_default_charset);

    negotiated.ok_or_else(|| Error::UnsupportedMediaType {
        requested,
        supported: supported.as_slice().to_vec(),
    })
}

/// Negotiate against the request's `Accept` header.
///
/// A request without the header gets the most preferred media type.
pub fn negotiate_request(
    request: &RequestInfo,
    supported: &SupportedMediaTypes,
) -> Result<MediaType> {
    match request.header_opt(ACCEPT.as_str()) {
        Some(accept) => negotiate(&[accept], supported),
        None => Ok(supported.most_preferred().clone().with_default_charset()),
    }
}

fn parse_requested(token: &str, most_preferred: &MediaType) -> Option<MediaType> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    match MediaType::parse(token) {
        Ok(media_type) if media_type.is_any() => Some(most_preferred.clone()),
        Ok(media_type) => Some(media_type),
        Err(e) => {
            debug!(token, error = %e, "Ignoring unparseable Accept header entry");
            None
        }
    }
}

/// The media type to answer with when `requested` is supported.
///
/// A concrete request is answered as requested. A range such as `text/*` is
/// answered with the first supported media type inside it.
fn resolve(requested: &MediaType, supported: &SupportedMediaTypes) -> Option<MediaType> {
    let candidate = supported.iter().find(|s| s.matches(requested))?;
    if !requested.is_range() {
        return Some(requested.clone());
    }
    let resolved = candidate.without_parameters();
    Some(match requested.charset() {
        Some(charset) => resolved.with_charset(charset),
        None => resolved,
    })
}

fn is_utf_8(charset: &str) -> bool {
    charset.eq_ignore_ascii_case(UTF_8) || charset.eq_ignore_ascii_case("utf8")
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| {
            c.is_ascii_graphic() && !"()<>@,;:\\\"/[]?={}".contains(c)
        })
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json() -> MediaType {
        MediaType::new("application", "json")
    }

    fn plain_text() -> MediaType {
        MediaType::new("text", "plain")
    }

    #[test]
    fn test_parse_media_type() {
        let media_type = MediaType::parse(" Application/JSON ; Charset=UTF-8 ").unwrap();
        assert_eq!(media_type.type_(), "application");
        assert_eq!(media_type.subtype(), "json");
        assert_eq!(media_type.charset(), Some("utf-8"));
        assert_eq!(media_type, MediaType::json_utf_8());
    }

    #[test]
    fn test_parse_ignores_parameter_order_and_quality() {
        let a = MediaType::parse("text/plain; format=flowed; charset=utf-8; q=0.5").unwrap();
        let b = MediaType::parse("text/plain;charset=\"utf-8\";format=flowed").unwrap();
        assert_eq!(a, b);
        assert!(a.parameters().get("q").is_none());
    }

    #[test]
    fn test_parse_rejects_malformed_media_types() {
        assert_eq!(MediaType::parse(""), Err(ParseMediaTypeError::Empty));
        assert!(matches!(
            MediaType::parse("json"),
            Err(ParseMediaTypeError::MissingSubtype(_))
        ));
        assert!(matches!(
            MediaType::parse("*/json"),
            Err(ParseMediaTypeError::WildcardType(_))
        ));
        assert!(matches!(
            MediaType::parse("text/plain; charset"),
            Err(ParseMediaTypeError::InvalidParameter(_))
        ));
        assert!(matches!(
            MediaType::parse("text/pl ain"),
            Err(ParseMediaTypeError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(MediaType::json_ld().to_string(), "application/ld+json; charset=utf-8");
        assert_eq!(MediaType::any().to_string(), "*/*");
    }

    #[test]
    fn test_wildcards_match_either_side() {
        let text_range = MediaType::new("text", "*");
        assert!(text_range.matches(&plain_text()));
        assert!(plain_text().matches(&text_range));
        assert!(MediaType::any().matches(&json()));
        assert!(!text_range.matches(&json()));
        assert!(json().matches(&MediaType::json_utf_8()));
    }

    #[test]
    fn test_supported_media_types_cannot_be_empty() {
        let result = SupportedMediaTypes::try_from(Vec::new());
        assert!(matches!(result, Err(Error::Config(_))));

        let supported = SupportedMediaTypes::try_from(vec![json(), plain_text()]).unwrap();
        assert_eq!(supported.most_preferred(), &json());
    }

    #[test]
    fn test_any_type_resolves_to_most_preferred_with_utf_8() {
        let supported = SupportedMediaTypes::new(json()).with(plain_text());
        let result = negotiate(&["*/*"], &supported).unwrap();
        assert_eq!(result, MediaType::json_utf_8());
    }

    #[test]
    fn test_non_utf_8_charset_is_not_acceptable() {
        let supported = SupportedMediaTypes::new(json());
        let result = negotiate(&["application/json;charset=ISO-8859-1"], &supported);
        assert!(matches!(result, Err(Error::UnsupportedMediaType { .. })));
    }

    #[test]
    fn test_client_order_wins_over_server_preference() {
        let supported = SupportedMediaTypes::new(json()).with(plain_text());
        let result = negotiate(&["text/plain", "application/json"], &supported).unwrap();
        assert_eq!(result, MediaType::plain_text_utf_8());

        let result = negotiate(&["text/plain, application/json"], &supported).unwrap();
        assert_eq!(result, MediaType::plain_text_utf_8());
    }

    #[test]
    fn test_explicit_utf_8_charset_is_kept() {
        let supported = SupportedMediaTypes::new(json());
        let result = negotiate(&["application/json; charset=UTF8"], &supported).unwrap();
        assert_eq!(result.charset(), Some("utf8"));
    }

    #[test]
    fn test_unparseable_entries_are_skipped() {
        let supported = SupportedMediaTypes::new(json());
        let result = negotiate(&["not a media type, ,application/json;q=0.8"], &supported).unwrap();
        assert_eq!(result, MediaType::json_utf_8());
    }

    #[test]
    fn test_non_utf_8_entry_falls_through_to_next_entry() {
        let supported = SupportedMediaTypes::new(json()).with(plain_text());
        let result = negotiate(
            &["application/json; charset=iso-8859-1, text/plain"],
            &supported,
        )
        .unwrap();
        assert_eq!(result, MediaType::plain_text_utf_8());
    }

    #[test]
    fn test_empty_accept_list_fails() {
        let supported = SupportedMediaTypes::default();
        let accepted: [&str; 0] = [];
        match negotiate(&accepted, &supported) {
            Err(Error::UnsupportedMediaType {
                requested,
                supported,
            }) => {
                assert!(requested.is_empty());
                assert_eq!(supported, vec![MediaType::json_utf_8()]);
            }
            other => panic!("expected unsupported media type, got {:?}", other),
        }
    }

    #[test]
    fn test_failure_reports_requested_and_supported() {
        let supported = SupportedMediaTypes::new(json());
        match negotiate(&["text/csv, image/png"], &supported) {
            Err(Error::UnsupportedMediaType {
                requested,
                supported,
            }) => {
                assert_eq!(
                    requested,
                    vec![MediaType::new("text", "csv"), MediaType::new("image", "png")]
                );
                assert_eq!(supported, vec![json()]);
            }
            other => panic!("expected unsupported media type, got {:?}", other),
        }
    }

    #[test]
    fn test_range_request_resolves_to_supported_type() {
        let supported = SupportedMediaTypes::new(json()).with(plain_text());
        let result = negotiate(&["text/*"], &supported).unwrap();
        assert_eq!(result, MediaType::plain_text_utf_8());
    }

    #[test]
    fn test_result_is_always_a_supported_type() {
        let supported = SupportedMediaTypes::new(json())
            .with(MediaType::json_ld())
            .with(plain_text());
        let headers = [
            "*/*",
            "text/*",
            "application/*",
            "application/ld+json; q=0.1",
            "image/png, text/plain",
            "application/json; charset=utf-8",
        ];
        for header in headers {
            let result = negotiate(&[header], &supported).unwrap();
            assert!(
                supported
                    .iter()
                    .any(|s| s.without_parameters() == result.without_parameters()),
                "{} resolved to unsupported {}",
                header,
                result
            );
        }
    }

    #[test]
    fn test_negotiate_request_without_accept_header() {
        let request = RequestInfo::default();
        let supported = SupportedMediaTypes::new(MediaType::json_ld());
        assert_eq!(
            negotiate_request(&request, &supported).unwrap(),
            MediaType::json_ld()
        );
    }

    #[test]
    fn test_negotiate_request_with_accept_header() {
        let request = RequestInfo::default().with_header(ACCEPT.as_str(), "application/ld+json");
        let supported = SupportedMediaTypes::new(json()).with(MediaType::json_ld());
        assert_eq!(
            negotiate_request(&request, &supported).unwrap(),
            MediaType::json_ld()
        );
    }
}
