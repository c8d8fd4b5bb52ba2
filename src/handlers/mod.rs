//! HTTP transport: decode requests into payloads, encode results and errors.

pub mod artifact_handlers;
pub mod aspect_handlers;
pub mod health_handlers;
pub mod metadata_handlers;
pub mod package_handlers;
pub mod service_handlers;

use crate::{errors::ServiceError, services::ByteStream};
use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue},
};
use futures::{StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use std::io;

pub const HEADER_TUS_RESUMABLE: &str = "tus-resumable";
pub const HEADER_UPLOAD_LENGTH: &str = "upload-length";
pub const HEADER_UPLOAD_OFFSET: &str = "upload-offset";
pub const HEADER_X_NAME: &str = "x-name";
pub const HEADER_X_COLLECTION: &str = "x-collection";
pub const HEADER_X_POLICY: &str = "x-policy";
pub const HEADER_TOTAL: &str = "total";
pub const HEADER_AVAILABLE: &str = "available";
pub const HEADER_DIGEST: &str = "digest";
pub const HEADER_FORCE: &str = "force";
pub const HEADER_START: &str = "start";
pub const HEADER_END: &str = "end";

pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub(crate) fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    header_str(headers, name).map(str::to_string)
}

/// Insert a header, skipping values that are not valid header text.
pub(crate) fn set_header(headers: &mut HeaderMap, name: &'static str, value: impl ToString) {
    if let Ok(v) = HeaderValue::from_str(&value.to_string()) {
        headers.insert(HeaderName::from_static(name), v);
    }
}

pub(crate) fn body_stream(body: Body) -> ByteStream {
    body.into_data_stream().map_err(io::Error::other).boxed()
}

/// Decode a JSON request body; malformed JSON is a `bad-request`.
pub(crate) fn json_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ServiceError> {
    serde_json::from_slice(bytes)
        .map_err(|e| ServiceError::bad_request(format!("invalid JSON body: {}", e)))
}
