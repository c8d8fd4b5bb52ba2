//! Aspects: schema-tagged JSON statements about an entity.

use super::common::LinkT;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectRT {
    pub id: String,
    pub entity: String,
    pub schema: String,
    pub content: Value,
    pub content_type: String,
    pub valid_from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<String>,
    pub asserter: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retracter: Option<String>,
    #[serde(default)]
    pub links: Vec<LinkT>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectListItemRT {
    pub id: String,
    pub entity: String,
    pub schema: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    pub content_type: String,
    pub valid_from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<String>,
    pub asserter: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retracter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectListRT {
    pub items: Vec<AspectListItemRT>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_path: Option<String>,
    pub at_time: String,
    pub links: Vec<LinkT>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AspectIDRT {
    pub id: String,
}

/// Query + body of `POST /1/aspects` and `PUT /1/aspects`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatePayload {
    pub entity: String,
    pub schema: String,
    pub policy: Option<String>,
    pub content_type: String,
    pub content: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AspectListPayload {
    pub entity: Option<String>,
    pub schema: Option<String>,
    pub content_path: Option<String>,
    pub at_time: Option<String>,
    pub limit: Option<i64>,
    pub filter: Option<String>,
    pub order_by: Option<String>,
    pub order_direction: Option<String>,
    pub include_content: Option<bool>,
    pub page: Option<String>,
}
