//! Artifacts: uploaded data blobs with TUS-style resumable uploads.

use super::common::LinkT;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_PARTIAL: &str = "partial";
pub const STATUS_READY: &str = "ready";
pub const STATUS_ERROR: &str = "error";

/// Only TUS protocol version understood by the upload endpoints.
pub const TUS_VERSION: &str = "1.0.0";

/// Content type required on TUS `PATCH` requests.
pub const TUS_CHUNK_CONTENT_TYPE: &str = "application/offset+octet-stream";

/// Row stored in the `artifacts` table.
#[derive(Debug, Clone, FromRow)]
pub struct ArtifactRecord {
    pub id: String,
    pub name: Option<String>,
    pub status: String,
    pub mime_type: Option<String>,
    pub content_encoding: Option<String>,
    /// Declared length (`Upload-Length`) or final size.
    pub size: Option<i64>,
    /// Bytes received so far.
    pub upload_offset: i64,
    pub etag: Option<String>,
    pub collection: Option<String>,
    pub policy: Option<String>,
    pub account: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactListItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactListRT {
    pub artifacts: Vec<ArtifactListItem>,
    pub at_time: String,
    pub links: Vec<LinkT>,
}

/// Full artifact status; `views::artifact` projects it onto the `tiny` view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactStatusRT {
    pub id: String,
    pub name: Option<String>,
    pub status: String,
    pub mime_type: Option<String>,
    pub size: Option<i64>,
    pub etag: Option<String>,
    pub collection: Option<String>,
    pub policy: Option<String>,
    pub account: Option<String>,
    pub created_at: Option<String>,
    pub last_modified_at: Option<String>,
    pub data_href: Option<String>,
    #[serde(default)]
    pub links: Vec<LinkT>,
}

/// Headers of `POST /1/artifacts`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadPayload {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub name: Option<String>,
    pub collection: Option<String>,
    pub policy: Option<String>,
    pub upload_length: Option<i64>,
    pub tus_resumable: Option<String>,
}

/// Headers of `PATCH /1/artifacts/{id}/blob`.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadChunkPayload {
    pub id: String,
    pub upload_offset: i64,
    pub tus_resumable: Option<String>,
    pub content_type: Option<String>,
}

/// Answer to `HEAD /1/artifacts/{id}/blob`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadStatus {
    pub upload_offset: i64,
    pub upload_length: Option<i64>,
}
