//! String flags to typed payloads.
//!
//! Every flag arrives as a string, whether it came from the command line or
//! from an HTTP query/header. The `*Flags` structs double as clap argument
//! groups and as serde query extractors, so the CLI and the server validate
//! identically.

use crate::{
    errors::ServiceError,
    models::{
        artifact::{UploadChunkPayload, UploadPayload},
        aspect::{AspectListPayload, CreatePayload},
        common::{ListPayload, validate_datetime, validate_uri, validate_uuid},
        metadata::{AddPayload, MetadataListPayload, UpdateRecordPayload},
        package::{BlobType, PackageListPayload, PullPayload, PushPayload, validate_digest},
    },
    views::View,
};
use clap::Args;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// A flag value that failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value for `{flag}`: {message}")]
pub struct BuildError {
    pub flag: String,
    pub value: Option<String>,
    pub message: String,
}

impl BuildError {
    pub fn new(flag: &str, value: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            flag: flag.to_string(),
            value: value.map(str::to_string),
            message: message.into(),
        }
    }

    fn missing(flag: &str) -> Self {
        Self::new(flag, None, "is required")
    }

    fn from_validation(flag: &str, value: &str, err: ServiceError) -> Self {
        let message = match err {
            ServiceError::InvalidParameter(body) => body.message,
            other => other.to_string(),
        };
        Self::new(flag, Some(value), message)
    }

    /// For operations whose declared errors carry no `invalid-parameter`.
    pub fn into_bad_request(self) -> ServiceError {
        ServiceError::bad_request(self.to_string())
    }
}

impl From<BuildError> for ServiceError {
    fn from(err: BuildError) -> Self {
        ServiceError::invalid_parameter(err.flag, err.value.as_deref(), err.message)
    }
}

pub type BuildResult<T> = Result<T, BuildError>;

pub fn require<'a>(flag: &str, value: Option<&'a str>) -> BuildResult<&'a str> {
    value.filter(|v| !v.is_empty()).ok_or_else(|| BuildError::missing(flag))
}

pub fn parse_i64(flag: &str, value: Option<&str>) -> BuildResult<Option<i64>> {
    value
        .map(|v| {
            v.trim()
                .parse::<i64>()
                .map_err(|_| BuildError::new(flag, Some(v), "must be an integer"))
        })
        .transpose()
}

pub fn parse_bool(flag: &str, value: Option<&str>) -> BuildResult<Option<bool>> {
    value
        .map(|v| match v.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(BuildError::new(flag, Some(v), "must be true or false")),
        })
        .transpose()
}

pub fn parse_uuid(flag: &str, value: &str) -> BuildResult<String> {
    validate_uuid(flag, value)
        .map(|u| u.to_string())
        .map_err(|e| BuildError::from_validation(flag, value, e))
}

pub fn parse_uri(flag: &str, value: &str) -> BuildResult<String> {
    validate_uri(flag, value).map_err(|e| BuildError::from_validation(flag, value, e))?;
    Ok(value.to_string())
}

pub fn parse_opt_uri(flag: &str, value: Option<&str>) -> BuildResult<Option<String>> {
    value.map(|v| parse_uri(flag, v)).transpose()
}

/// Validated but kept verbatim; services normalise it.
pub fn parse_datetime(flag: &str, value: Option<&str>) -> BuildResult<Option<String>> {
    value
        .map(|v| {
            validate_datetime(flag, v)
                .map(|_| v.to_string())
                .map_err(|e| BuildError::from_validation(flag, v, e))
        })
        .transpose()
}

pub fn parse_view(value: Option<&str>) -> BuildResult<View> {
    match value {
        None | Some("") => Ok(View::Default),
        Some(v) => v
            .parse::<View>()
            .map_err(|e| BuildError::from_validation("view", v, e)),
    }
}

pub fn parse_blob_type(flag: &str, value: &str) -> BuildResult<BlobType> {
    value
        .parse::<BlobType>()
        .map_err(|e| BuildError::from_validation(flag, value, e))
}

pub fn parse_digest(flag: &str, value: Option<&str>) -> BuildResult<Option<String>> {
    value
        .map(|v| {
            validate_digest(flag, v)
                .map(|_| v.to_string())
                .map_err(|e| BuildError::from_validation(flag, v, e))
        })
        .transpose()
}

pub fn parse_json(flag: &str, value: &str) -> BuildResult<Value> {
    serde_json::from_str(value)
        .map_err(|e| BuildError::new(flag, Some(value), format!("must be JSON: {}", e)))
}

/// Paging and ordering flags of the artifact and service list operations.
#[derive(Debug, Clone, Default, Args, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ListFlags {
    #[arg(long)]
    pub limit: Option<String>,
    #[arg(long)]
    pub page: Option<String>,
    #[arg(long)]
    pub filter: Option<String>,
    #[arg(long)]
    pub order_by: Option<String>,
    #[arg(long)]
    pub order_desc: Option<String>,
    #[arg(long)]
    pub at_time: Option<String>,
}

impl ListFlags {
    pub fn build(&self) -> BuildResult<ListPayload> {
        Ok(ListPayload {
            limit: parse_i64("limit", self.limit.as_deref())?,
            page: self.page.clone(),
            filter: self.filter.clone(),
            order_by: self.order_by.clone(),
            order_desc: parse_bool("order-desc", self.order_desc.as_deref())?,
            at_time: parse_datetime("at-time", self.at_time.as_deref())?,
        })
    }
}

/// `?view=` on reads that support views.
#[derive(Debug, Clone, Default, Args, Deserialize)]
pub struct ViewFlags {
    #[arg(long)]
    pub view: Option<String>,
}

impl ViewFlags {
    pub fn build(&self) -> BuildResult<View> {
        parse_view(self.view.as_deref())
    }
}

/// Headers of an artifact upload.
#[derive(Debug, Clone, Default, Args)]
pub struct UploadFlags {
    #[arg(long)]
    pub content_type: Option<String>,
    #[arg(long)]
    pub content_encoding: Option<String>,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub collection: Option<String>,
    #[arg(long)]
    pub policy: Option<String>,
    #[arg(long)]
    pub upload_length: Option<String>,
    #[arg(long)]
    pub tus_resumable: Option<String>,
}

impl UploadFlags {
    pub fn build(&self) -> BuildResult<UploadPayload> {
        let upload_length = parse_i64("Upload-Length", self.upload_length.as_deref())?;
        if upload_length.is_some_and(|l| l < 0) {
            return Err(BuildError::new(
                "Upload-Length",
                self.upload_length.as_deref(),
                "must not be negative",
            ));
        }
        Ok(UploadPayload {
            content_type: self.content_type.clone(),
            content_encoding: self.content_encoding.clone(),
            name: self.name.clone(),
            collection: parse_opt_uri("X-Collection", self.collection.as_deref())?,
            policy: parse_opt_uri("X-Policy", self.policy.as_deref())?,
            upload_length,
            tus_resumable: self.tus_resumable.clone(),
        })
    }
}

pub fn build_upload_chunk(
    id: &str,
    upload_offset: Option<&str>,
    tus_resumable: Option<&str>,
    content_type: Option<&str>,
) -> BuildResult<UploadChunkPayload> {
    let offset = parse_i64("Upload-Offset", Some(require("Upload-Offset", upload_offset)?))?
        .unwrap_or_default();
    if offset < 0 {
        return Err(BuildError::new("Upload-Offset", upload_offset, "must not be negative"));
    }
    Ok(UploadChunkPayload {
        id: parse_uuid("id", id)?,
        upload_offset: offset,
        tus_resumable: tus_resumable.map(str::to_string),
        content_type: content_type.map(str::to_string),
    })
}

/// `entity`, `schema` and `policy` of aspect writes.
#[derive(Debug, Clone, Default, Args, Deserialize)]
pub struct AspectWriteFlags {
    #[arg(long)]
    pub entity: Option<String>,
    #[arg(long)]
    pub schema: Option<String>,
    #[arg(long)]
    pub policy: Option<String>,
}

impl AspectWriteFlags {
    pub fn build(&self, content_type: Option<&str>, content: Value) -> BuildResult<CreatePayload> {
        Ok(CreatePayload {
            entity: parse_uri("entity", require("entity", self.entity.as_deref())?)?,
            schema: parse_uri("schema", require("schema", self.schema.as_deref())?)?,
            policy: parse_opt_uri("policy", self.policy.as_deref())?,
            content_type: content_type
                .filter(|c| !c.is_empty())
                .unwrap_or("application/json")
                .to_string(),
            content,
        })
    }
}

#[derive(Debug, Clone, Default, Args, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AspectListFlags {
    #[arg(long)]
    pub entity: Option<String>,
    #[arg(long)]
    pub schema: Option<String>,
    #[arg(long)]
    pub content_path: Option<String>,
    #[arg(long)]
    pub at_time: Option<String>,
    #[arg(long)]
    pub limit: Option<String>,
    #[arg(long)]
    pub filter: Option<String>,
    #[arg(long)]
    pub order_by: Option<String>,
    #[arg(long)]
    pub order_direction: Option<String>,
    #[arg(long)]
    pub include_content: Option<String>,
    #[arg(long)]
    pub page: Option<String>,
}

impl AspectListFlags {
    pub fn build(&self) -> BuildResult<AspectListPayload> {
        Ok(AspectListPayload {
            entity: parse_opt_uri("entity", self.entity.as_deref())?,
            schema: self.schema.clone(),
            content_path: self.content_path.clone(),
            at_time: parse_datetime("at-time", self.at_time.as_deref())?,
            limit: parse_i64("limit", self.limit.as_deref())?,
            filter: self.filter.clone(),
            order_by: self.order_by.clone(),
            order_direction: self.order_direction.clone(),
            include_content: parse_bool("include-content", self.include_content.as_deref())?,
            page: self.page.clone(),
        })
    }
}

/// `entity-id`, `schema` and `policy-id` of metadata writes.
#[derive(Debug, Clone, Default, Args, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MetadataWriteFlags {
    #[arg(long)]
    pub entity_id: Option<String>,
    #[arg(long)]
    pub schema: Option<String>,
    #[arg(long)]
    pub policy_id: Option<String>,
}

impl MetadataWriteFlags {
    pub fn build(&self, aspect: Value) -> BuildResult<AddPayload> {
        Ok(AddPayload {
            entity_id: parse_uri("entity-id", require("entity-id", self.entity_id.as_deref())?)?,
            schema: parse_uri("schema", require("schema", self.schema.as_deref())?)?,
            policy_id: parse_opt_uri("policy-id", self.policy_id.as_deref())?,
            aspect,
        })
    }

    /// Entity and schema are optional here; the replaced record supplies them.
    pub fn build_update(&self, id: &str, aspect: Value) -> BuildResult<UpdateRecordPayload> {
        Ok(UpdateRecordPayload {
            id: parse_uuid("id", id)?,
            entity_id: parse_opt_uri("entity-id", self.entity_id.as_deref())?,
            schema: parse_opt_uri("schema", self.schema.as_deref())?,
            policy_id: parse_opt_uri("policy-id", self.policy_id.as_deref())?,
            aspect,
        })
    }
}

#[derive(Debug, Clone, Default, Args, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MetadataListFlags {
    #[arg(long)]
    pub entity_id: Option<String>,
    #[arg(long)]
    pub schema: Option<String>,
    #[arg(long)]
    pub aspect_path: Option<String>,
    #[arg(long)]
    pub at_time: Option<String>,
    #[arg(long)]
    pub limit: Option<String>,
    #[arg(long)]
    pub filter: Option<String>,
    #[arg(long)]
    pub order_by: Option<String>,
    #[arg(long)]
    pub order_desc: Option<String>,
    #[arg(long)]
    pub page: Option<String>,
}

impl MetadataListFlags {
    pub fn build(&self) -> BuildResult<MetadataListPayload> {
        Ok(MetadataListPayload {
            entity_id: parse_opt_uri("entity-id", self.entity_id.as_deref())?,
            schema: self.schema.clone(),
            aspect_path: self.aspect_path.clone(),
            at_time: parse_datetime("at-time", self.at_time.as_deref())?,
            limit: parse_i64("limit", self.limit.as_deref())?,
            filter: self.filter.clone(),
            order_by: self.order_by.clone(),
            order_desc: parse_bool("order-desc", self.order_desc.as_deref())?,
            page: self.page.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, Args, Deserialize)]
pub struct PackageListFlags {
    #[arg(long)]
    pub tag: Option<String>,
    #[arg(long)]
    pub limit: Option<String>,
    #[arg(long)]
    pub page: Option<String>,
}

impl PackageListFlags {
    pub fn build(&self) -> BuildResult<PackageListPayload> {
        Ok(PackageListPayload {
            tag: self.tag.clone(),
            limit: parse_i64("limit", self.limit.as_deref())?,
            page: self.page.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, Args, Deserialize)]
pub struct PullFlags {
    #[arg(long = "ref")]
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    #[arg(long = "type")]
    #[serde(rename = "type")]
    pub type_: Option<String>,
    #[arg(long)]
    pub digest: Option<String>,
    #[arg(long)]
    pub offset: Option<String>,
}

impl PullFlags {
    pub fn build(&self) -> BuildResult<PullPayload> {
        let offset = parse_i64("offset", self.offset.as_deref())?;
        if offset.is_some_and(|o| o < 0) {
            return Err(BuildError::new("offset", self.offset.as_deref(), "must not be negative"));
        }
        Ok(PullPayload {
            reference: self.reference.clone(),
            type_: parse_blob_type("type", require("type", self.type_.as_deref())?)?,
            digest: parse_digest("digest", self.digest.as_deref())?,
            offset,
        })
    }
}

/// Query (`tag`, `type`) and headers (`Digest`, `Force`, `Start`, `End`) of a push.
#[derive(Debug, Clone, Default, Args)]
pub struct PushFlags {
    #[arg(long)]
    pub tag: Option<String>,
    #[arg(long = "type")]
    pub type_: Option<String>,
    #[arg(long)]
    pub digest: Option<String>,
    #[arg(long)]
    pub force: Option<String>,
    #[arg(long)]
    pub start: Option<String>,
    #[arg(long)]
    pub end: Option<String>,
}

impl PushFlags {
    pub fn build(&self) -> BuildResult<PushPayload> {
        Ok(PushPayload {
            tag: require("tag", self.tag.as_deref())?.to_string(),
            type_: parse_blob_type("type", require("type", self.type_.as_deref())?)?,
            digest: parse_digest("Digest", self.digest.as_deref())?,
            force: parse_bool("Force", self.force.as_deref())?.unwrap_or(false),
            start: parse_i64("Start", self.start.as_deref())?,
            end: parse_i64("End", self.end.as_deref())?,
        })
    }
}

#[derive(Debug, Clone, Default, Args, Deserialize)]
pub struct PushStatusFlags {
    #[arg(long)]
    pub tag: Option<String>,
    #[arg(long)]
    pub digest: Option<String>,
}

impl PushStatusFlags {
    pub fn build(&self) -> BuildResult<(String, String)> {
        let tag = require("tag", self.tag.as_deref())?.to_string();
        let digest = require("digest", self.digest.as_deref())?;
        validate_digest("digest", digest)
            .map_err(|e| BuildError::from_validation("digest", digest, e))?;
        Ok((tag, digest.to_string()))
    }
}

#[derive(Debug, Clone, Default, Args, Deserialize)]
pub struct TagFlags {
    #[arg(long)]
    pub tag: Option<String>,
}

impl TagFlags {
    pub fn build(&self) -> BuildResult<String> {
        Ok(require("tag", self.tag.as_deref())?.to_string())
    }
}

#[derive(Debug, Clone, Default, Args, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ForceCreateFlags {
    #[arg(long)]
    pub force_create: Option<String>,
}

impl ForceCreateFlags {
    pub fn build(&self) -> BuildResult<bool> {
        Ok(parse_bool("force-create", self.force_create.as_deref())?.unwrap_or(false))
    }
}
