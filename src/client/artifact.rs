use super::{ApiClient, ClientError, ClientResult, Query, decode_json, header_i64, response_stream};
use crate::{
    errors::ErrorName::{self, *},
    models::{
        artifact::{
            ArtifactListRT, ArtifactStatusRT, TUS_VERSION, UploadChunkPayload, UploadPayload,
            UploadStatus,
        },
        common::ListPayload,
    },
    services::ByteStream,
    views::{View, artifact::ArtifactStatusRTView},
};
use reqwest::{Body, Method, StatusCode, header};

const LIST_ERRORS: &[ErrorName] = &[
    BadRequest,
    InvalidParameter,
    InvalidScopes,
    NotImplemented,
    NotAvailable,
    Unauthorized,
];
const READ_ERRORS: &[ErrorName] =
    &[BadRequest, InvalidScopes, NotFound, NotAvailable, Unauthorized];
const UPLOAD_ERRORS: &[ErrorName] = &[
    BadRequest,
    InvalidParameter,
    InvalidScopes,
    NotImplemented,
    NotAvailable,
    Unauthorized,
];
const UPLOAD_STATUS_ERRORS: &[ErrorName] = &[NotFound, Unauthorized, InvalidScopes];
const UPLOAD_CHUNK_ERRORS: &[ErrorName] = &[
    BadRequest,
    InvalidParameter,
    InvalidScopes,
    NotFound,
    UnsupportedContentType,
    Unauthorized,
];
const DOWNLOAD_ERRORS: &[ErrorName] = &[NotFound, InvalidScopes, Unauthorized];

/// Result of `POST /1/artifacts` with its TUS headers.
#[derive(Debug, Clone)]
pub struct UploadResponse {
    pub artifact: ArtifactStatusRT,
    pub location: Option<String>,
    pub upload_offset: Option<i64>,
}

/// Headers of a blob download.
#[derive(Debug, Clone, Default)]
pub struct DownloadInfo {
    pub content_type: Option<String>,
    pub content_length: Option<i64>,
    pub etag: Option<String>,
}

pub(super) fn list_query(p: &ListPayload) -> Query {
    Query::default()
        .opt("limit", p.limit)
        .opt("page", p.page.as_deref())
        .opt("filter", p.filter.as_deref())
        .opt("order-by", p.order_by.as_deref())
        .opt("order-desc", p.order_desc)
        .opt("at-time", p.at_time.as_deref())
}

impl ApiClient {
    pub async fn list_artifacts(&self, p: &ListPayload) -> ClientResult<ArtifactListRT> {
        let req = self
            .request(Method::GET, "/1/artifacts")
            .query(&list_query(p).0);
        self.send_json(req, StatusCode::OK, LIST_ERRORS).await
    }

    /// Read an artifact's status through `view`; fields the view omits come back empty.
    pub async fn read_artifact(&self, id: &str, view: View) -> ClientResult<ArtifactStatusRT> {
        let req = self
            .request(Method::GET, &format!("/1/artifacts/{}", id))
            .query(&[("view", view.as_str())]);
        let viewed: ArtifactStatusRTView = self.send_json(req, StatusCode::OK, READ_ERRORS).await?;
        viewed.validate(view)?;
        Ok(viewed.into_result())
    }

    pub async fn upload_artifact(
        &self,
        p: &UploadPayload,
        body: impl Into<Body>,
    ) -> ClientResult<UploadResponse> {
        let mut req = self.request(Method::POST, "/1/artifacts");
        if let Some(v) = &p.content_type {
            req = req.header(header::CONTENT_TYPE, v);
        }
        if let Some(v) = &p.content_encoding {
            req = req.header(header::CONTENT_ENCODING, v);
        }
        if let Some(v) = &p.name {
            req = req.header("X-Name", v);
        }
        if let Some(v) = &p.collection {
            req = req.header("X-Collection", v);
        }
        if let Some(v) = &p.policy {
            req = req.header("X-Policy", v);
        }
        if let Some(len) = p.upload_length {
            req = req.header("Upload-Length", len.to_string());
        }
        if let Some(v) = &p.tus_resumable {
            req = req.header("Tus-Resumable", v);
        }

        let resp = self
            .send(req.body(body), &[StatusCode::CREATED], UPLOAD_ERRORS)
            .await?;
        let location = resp
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let upload_offset = header_i64(&resp, "Upload-Offset")?;
        Ok(UploadResponse {
            artifact: decode_json(resp).await?,
            location,
            upload_offset,
        })
    }

    /// `HEAD` the blob for its TUS offset.
    pub async fn artifact_upload_status(&self, id: &str) -> ClientResult<UploadStatus> {
        let req = self
            .request(Method::HEAD, &format!("/1/artifacts/{}/blob", id))
            .header("Tus-Resumable", TUS_VERSION);
        let resp = self.send(req, &[StatusCode::OK], UPLOAD_STATUS_ERRORS).await?;
        let upload_offset = header_i64(&resp, "Upload-Offset")?
            .ok_or_else(|| ClientError::Decode("missing Upload-Offset header".into()))?;
        Ok(UploadStatus {
            upload_offset,
            upload_length: header_i64(&resp, "Upload-Length")?,
        })
    }

    /// Send one chunk; returns the new offset.
    pub async fn upload_artifact_chunk(
        &self,
        p: &UploadChunkPayload,
        body: impl Into<Body>,
    ) -> ClientResult<i64> {
        let mut req = self
            .request(Method::PATCH, &format!("/1/artifacts/{}/blob", p.id))
            .header("Upload-Offset", p.upload_offset.to_string());
        if let Some(v) = &p.tus_resumable {
            req = req.header("Tus-Resumable", v);
        }
        if let Some(v) = &p.content_type {
            req = req.header(header::CONTENT_TYPE, v);
        }
        let resp = self
            .send(req.body(body), &[StatusCode::NO_CONTENT], UPLOAD_CHUNK_ERRORS)
            .await?;
        header_i64(&resp, "Upload-Offset")?
            .ok_or_else(|| ClientError::Decode("missing Upload-Offset header".into()))
    }

    pub async fn download_artifact(&self, id: &str) -> ClientResult<(DownloadInfo, ByteStream)> {
        let req = self.request(Method::GET, &format!("/1/artifacts/{}/blob", id));
        let resp = self.send(req, &[StatusCode::OK], DOWNLOAD_ERRORS).await?;
        let text = |name: header::HeaderName| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let info = DownloadInfo {
            content_type: text(header::CONTENT_TYPE),
            etag: text(header::ETAG).map(|e| e.trim_matches('"').to_string()),
            content_length: header_i64(&resp, header::CONTENT_LENGTH.as_str())?,
        };
        Ok((info, response_stream(resp)))
    }
}
