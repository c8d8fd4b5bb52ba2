//! HTTP client for the `/1/...` API.
//!
//! Each operation builds its request from a typed payload, sends it with the
//! bearer token, and switches on the response status: the success status
//! decodes the result, a status in the operation's declared error set decodes
//! the matching error body, anything else is [`ClientError::UnexpectedStatus`].

mod artifact;
mod aspect;
mod metadata;
mod package;
mod service;

pub use artifact::{DownloadInfo, UploadResponse};

use crate::{
    errors::{ErrorName, ServiceError},
    services::ByteStream,
    views::ViewError,
};
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::{io, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// A declared error, decoded from its body.
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("unexpected response status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error(transparent)]
    View(#[from] ViewError),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Decode an error response for an operation declaring `declared`.
pub fn decode_error(status: StatusCode, body: &[u8], declared: &[ErrorName]) -> ClientError {
    let name = match ErrorName::from_status(status) {
        Some(name) if declared.contains(&name) => name,
        _ => {
            return ClientError::UnexpectedStatus {
                status: status.as_u16(),
                body: String::from_utf8_lossy(body).into_owned(),
            };
        }
    };

    let decoded = match name {
        ErrorName::BadRequest => serde_json::from_slice(body).map(ServiceError::BadRequest),
        ErrorName::Unauthorized => Ok(ServiceError::Unauthorized),
        ErrorName::InvalidScopes => serde_json::from_slice(body).map(ServiceError::InvalidScopes),
        ErrorName::NotFound => serde_json::from_slice(body).map(ServiceError::NotFound),
        ErrorName::AlreadyCreated => serde_json::from_slice(body).map(ServiceError::AlreadyCreated),
        ErrorName::UnsupportedContentType => {
            serde_json::from_slice(body).map(ServiceError::UnsupportedContentType)
        }
        ErrorName::InvalidParameter => {
            serde_json::from_slice(body).map(ServiceError::InvalidParameter)
        }
        ErrorName::NotImplemented => serde_json::from_slice(body).map(ServiceError::NotImplemented),
        ErrorName::NotAvailable => Ok(ServiceError::NotAvailable),
    };

    match decoded {
        Ok(err) => ClientError::Service(err),
        Err(e) => ClientError::Decode(format!("{} body: {}", name, e)),
    }
}

pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> ClientResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%method, %url, "sending request");
        let req = self.client.request(method, url);
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Send and hand back the response if it has the `success` status.
    async fn send(
        &self,
        req: RequestBuilder,
        success: &[StatusCode],
        declared: &[ErrorName],
    ) -> ClientResult<Response> {
        let resp = req.send().await?;
        let status = resp.status();
        if success.contains(&status) {
            return Ok(resp);
        }
        let body = resp.bytes().await?;
        Err(decode_error(status, &body, declared))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        success: StatusCode,
        declared: &[ErrorName],
    ) -> ClientResult<T> {
        let resp = self.send(req, &[success], declared).await?;
        decode_json(resp).await
    }

    async fn send_empty(
        &self,
        req: RequestBuilder,
        success: StatusCode,
        declared: &[ErrorName],
    ) -> ClientResult<()> {
        self.send(req, &[success], declared).await.map(|_| ())
    }
}

async fn decode_json<T: DeserializeOwned>(resp: Response) -> ClientResult<T> {
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
}

fn response_stream(resp: Response) -> ByteStream {
    resp.bytes_stream().map_err(io::Error::other).boxed()
}

fn header_i64(resp: &Response, name: &str) -> ClientResult<Option<i64>> {
    match resp.headers().get(name) {
        None => Ok(None),
        Some(v) => v
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .map(Some)
            .ok_or_else(|| ClientError::Decode(format!("header `{}` is not an integer", name))),
    }
}

/// Query pairs, skipping unset values.
#[derive(Default)]
struct Query(Vec<(&'static str, String)>);

impl Query {
    fn opt(mut self, key: &'static str, value: Option<impl ToString>) -> Self {
        if let Some(v) = value {
            self.0.push((key, v.to_string()));
        }
        self
    }

    fn set(self, key: &'static str, value: impl ToString) -> Self {
        self.opt(key, Some(value))
    }
}
