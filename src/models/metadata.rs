//! Metadata records: the older, record-oriented form of aspects.

use super::common::LinkT;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecordRT {
    pub record_id: String,
    pub entity: String,
    pub schema: String,
    pub aspect: Value,
    pub valid_from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<String>,
    pub asserter: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoker: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataListItemRT {
    pub record_id: String,
    pub entity: String,
    pub schema: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_context: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListMetaRT {
    pub records: Vec<MetadataListItemRT>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_path: Option<String>,
    pub at_time: String,
    pub links: Vec<LinkT>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddMetaRT {
    pub record_id: String,
}

/// Query + body of `add` and `update_one`.
#[derive(Debug, Clone, PartialEq)]
pub struct AddPayload {
    pub entity_id: String,
    pub schema: String,
    pub policy_id: Option<String>,
    pub aspect: Value,
}

/// Query + body of `update_record`; entity and schema default to the
/// revoked record's.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRecordPayload {
    pub id: String,
    pub entity_id: Option<String>,
    pub schema: Option<String>,
    pub policy_id: Option<String>,
    pub aspect: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataListPayload {
    pub entity_id: Option<String>,
    pub schema: Option<String>,
    pub aspect_path: Option<String>,
    pub at_time: Option<String>,
    pub limit: Option<i64>,
    pub filter: Option<String>,
    pub order_by: Option<String>,
    pub order_desc: Option<bool>,
    pub page: Option<String>,
}
