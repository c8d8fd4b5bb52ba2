//! Types and validators shared by every resource.

use crate::errors::{ServiceError, ServiceResult};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 50;

/// Navigation link attached to list and status results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkT {
    pub rel: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub href: String,
}

impl LinkT {
    pub fn new(rel: &str, type_: &str, href: impl Into<String>) -> Self {
        Self {
            rel: rel.to_string(),
            type_: type_.to_string(),
            href: href.into(),
        }
    }
}

/// Query parameters common to the plain list endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListPayload {
    pub limit: Option<i64>,
    pub page: Option<String>,
    pub filter: Option<String>,
    pub order_by: Option<String>,
    pub order_desc: Option<bool>,
    pub at_time: Option<String>,
}

/// Resolved paging window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub limit: i64,
    pub offset: i64,
}

impl Paging {
    pub fn resolve(limit: Option<i64>, page: Option<&str>) -> ServiceResult<Self> {
        let limit = validate_limit(limit)?;
        let offset = match page {
            Some(token) if !token.is_empty() => decode_page_token(token)?,
            _ => 0,
        };
        Ok(Self { limit, offset })
    }

    /// Token for the page following this one.
    pub fn next_token(&self) -> String {
        encode_page_token(self.offset + self.limit)
    }
}

/// Encode a row offset as an opaque page token.
pub fn encode_page_token(offset: i64) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(offset.to_string())
}

/// Decode a page token produced by [`encode_page_token`].
pub fn decode_page_token(token: &str) -> ServiceResult<i64> {
    general_purpose::URL_SAFE_NO_PAD
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|s| s.parse::<i64>().ok())
        .filter(|offset| *offset >= 0)
        .ok_or_else(|| ServiceError::invalid_parameter("page", Some(token), "malformed page token"))
}

pub fn validate_limit(limit: Option<i64>) -> ServiceResult<i64> {
    match limit {
        None => Ok(DEFAULT_LIMIT),
        Some(l) if (1..=MAX_LIMIT).contains(&l) => Ok(l),
        Some(l) => Err(ServiceError::invalid_parameter(
            "limit",
            Some(&l.to_string()),
            format!("must be between 1 and {}", MAX_LIMIT),
        )),
    }
}

pub fn validate_uuid(name: &str, value: &str) -> ServiceResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| ServiceError::invalid_parameter(name, Some(value), "must be a UUID"))
}

/// Accepts an absolute URI with a non-empty remainder after the scheme.
///
/// [`Url::parse`] checks the structure; it is lenient about characters RFC 3986
/// forbids, so those and malformed `%` escapes are rejected here.
pub fn validate_uri(name: &str, value: &str) -> ServiceResult<()> {
    let invalid = |reason: String| {
        ServiceError::invalid_parameter(name, Some(value), format!("must be a URI: {}", reason))
    };
    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    if value.len() <= url.scheme().len() + 1 {
        return Err(invalid("nothing follows the scheme".into()));
    }
    if let Some(c) = value.chars().find(|c| !is_uri_char(*c)) {
        return Err(invalid(format!("`{}` is not allowed", c.escape_default())));
    }
    let bytes = value.as_bytes();
    for (i, _) in value.match_indices('%') {
        let escape = bytes.get(i + 1..i + 3);
        if !escape.is_some_and(|h| h.iter().all(u8::is_ascii_hexdigit)) {
            return Err(invalid("malformed percent escape".into()));
        }
    }
    Ok(())
}

fn is_uri_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-._~:/?#[]@!$&'()*+,;=%".contains(c)
}

pub fn validate_datetime(name: &str, value: &str) -> ServiceResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            ServiceError::invalid_parameter(name, Some(value), "must be an RFC3339 date-time")
        })
}

/// Parse an optional `at-time`, defaulting to now.
pub fn resolve_at_time(value: Option<&str>) -> ServiceResult<DateTime<Utc>> {
    match value {
        Some(v) => validate_datetime("at-time", v),
        None => Ok(Utc::now()),
    }
}

/// Filter expressions are accepted on the wire but not evaluated.
pub fn reject_filter(filter: Option<&str>) -> ServiceResult<()> {
    match filter {
        Some(f) if !f.trim().is_empty() => Err(ServiceError::not_implemented(
            "filter expressions are not supported",
        )),
        _ => Ok(()),
    }
}

pub fn format_time(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Build `self`, `first` and (optionally) `next` links for a list page.
///
/// `query` is the already encoded query string without paging parameters.
pub fn page_links(base: &str, query: &str, paging: &Paging, has_more: bool) -> Vec<LinkT> {
    let join = |extra: Option<String>| {
        let mut parts: Vec<String> = Vec::new();
        if !query.is_empty() {
            parts.push(query.to_string());
        }
        parts.push(format!("limit={}", paging.limit));
        if let Some(page) = extra {
            parts.push(format!("page={}", page));
        }
        format!("{}?{}", base, parts.join("&"))
    };

    let current = (paging.offset > 0).then(|| encode_page_token(paging.offset));
    let mut links = vec![
        LinkT::new("self", "application/json", join(current)),
        LinkT::new("first", "application/json", join(None)),
    ];
    if has_more {
        links.push(LinkT::new("next", "application/json", join(Some(paging.next_token()))));
    }
    links
}

/// Append `key=value` to `parts` when `value` is set.
pub fn push_query(parts: &mut Vec<String>, key: &str, value: Option<&str>) {
    if let Some(v) = value {
        parts.push(format!("{}={}", key, urlencoding::encode(v)));
    }
}
