//! Packages: registry-style tagged manifests and content-addressed blobs.

use super::common::LinkT;
use crate::errors::{ServiceError, ServiceResult};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub const DIGEST_PREFIX: &str = "sha256:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobType {
    Manifest,
    Config,
    Layer,
}

impl BlobType {
    pub fn as_str(self) -> &'static str {
        match self {
            BlobType::Manifest => "manifest",
            BlobType::Config => "config",
            BlobType::Layer => "layer",
        }
    }
}

impl fmt::Display for BlobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlobType {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manifest" => Ok(BlobType::Manifest),
            "config" => Ok(BlobType::Config),
            "layer" => Ok(BlobType::Layer),
            other => Err(ServiceError::invalid_parameter(
                "type",
                Some(other),
                "must be one of manifest, config, layer",
            )),
        }
    }
}

/// Check that `value` looks like `sha256:<64 lowercase hex>`.
pub fn validate_digest(name: &str, value: &str) -> ServiceResult<()> {
    let lower_hex = |b: u8| matches!(b, b'0'..=b'9' | b'a'..=b'f');
    let ok = value
        .strip_prefix(DIGEST_PREFIX)
        .is_some_and(|hex| hex.len() == 64 && hex.bytes().all(lower_hex));
    if ok {
        Ok(())
    } else {
        Err(ServiceError::invalid_parameter(
            name,
            Some(value),
            "must be a sha256 digest",
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResult {
    pub items: Vec<String>,
    pub links: Vec<LinkT>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResult {
    pub digest: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushState {
    Exists,
    Partial,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushStatusT {
    pub status: PushState,
    /// Bytes already held by the server for this digest.
    pub available: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageListPayload {
    pub tag: Option<String>,
    pub limit: Option<i64>,
    pub page: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PullPayload {
    pub reference: Option<String>,
    pub type_: BlobType,
    pub digest: Option<String>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PushPayload {
    pub tag: String,
    pub type_: BlobType,
    pub digest: Option<String>,
    pub force: bool,
    pub start: Option<i64>,
    pub end: Option<i64>,
}

/// Outcome of a push; `complete == false` means more chunks are expected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOutcome {
    pub result: PushResult,
    pub complete: bool,
}

/// Headers answering a pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullRange {
    pub total: i64,
    pub available: i64,
}
