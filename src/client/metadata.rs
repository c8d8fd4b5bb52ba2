use super::{ApiClient, ClientResult, Query};
use crate::{
    errors::ErrorName::{self, *},
    models::metadata::{
        AddMetaRT, AddPayload, ListMetaRT, MetadataListPayload, MetadataRecordRT,
        UpdateRecordPayload,
    },
};
use reqwest::{Method, StatusCode, header};
use serde_json::Value;

const ADD_ERRORS: &[ErrorName] = &[
    BadRequest,
    InvalidParameter,
    InvalidScopes,
    NotImplemented,
    NotAvailable,
    Unauthorized,
];
const UPDATE_RECORD_ERRORS: &[ErrorName] = &[
    BadRequest,
    InvalidParameter,
    InvalidScopes,
    NotFound,
    NotImplemented,
    NotAvailable,
    Unauthorized,
];
const REVOKE_ERRORS: &[ErrorName] = &[
    BadRequest,
    InvalidScopes,
    NotImplemented,
    NotFound,
    NotAvailable,
    Unauthorized,
];
const READ_ERRORS: &[ErrorName] =
    &[BadRequest, InvalidScopes, NotFound, NotAvailable, Unauthorized];
const LIST_ERRORS: &[ErrorName] = ADD_ERRORS;

impl ApiClient {
    async fn send_metadata(
        &self,
        method: Method,
        path: &str,
        query: Query,
        aspect: &Value,
        declared: &[ErrorName],
    ) -> ClientResult<AddMetaRT> {
        let req = self
            .request(method, path)
            .query(&query.0)
            .header(header::CONTENT_TYPE, "application/json")
            .body(aspect.to_string());
        self.send_json(req, StatusCode::OK, declared).await
    }

    pub async fn add_metadata(&self, p: &AddPayload) -> ClientResult<AddMetaRT> {
        let query = Query::default()
            .set("entity-id", &p.entity_id)
            .set("schema", &p.schema)
            .opt("policy-id", p.policy_id.as_deref());
        self.send_metadata(Method::POST, "/1/metadata", query, &p.aspect, ADD_ERRORS)
            .await
    }

    /// Revoke the single active record for (entity, schema) and add `p`.
    pub async fn update_one_metadata(&self, p: &AddPayload) -> ClientResult<AddMetaRT> {
        let query = Query::default()
            .set("entity-id", &p.entity_id)
            .set("schema", &p.schema)
            .opt("policy-id", p.policy_id.as_deref());
        self.send_metadata(Method::PUT, "/1/metadata", query, &p.aspect, ADD_ERRORS)
            .await
    }

    pub async fn update_metadata_record(&self, p: &UpdateRecordPayload) -> ClientResult<AddMetaRT> {
        let query = Query::default()
            .opt("entity-id", p.entity_id.as_deref())
            .opt("schema", p.schema.as_deref())
            .opt("policy-id", p.policy_id.as_deref());
        self.send_metadata(
            Method::PUT,
            &format!("/1/metadata/{}", p.id),
            query,
            &p.aspect,
            UPDATE_RECORD_ERRORS,
        )
        .await
    }

    pub async fn revoke_metadata(&self, id: &str) -> ClientResult<()> {
        let req = self.request(Method::DELETE, &format!("/1/metadata/{}", id));
        self.send_empty(req, StatusCode::NO_CONTENT, REVOKE_ERRORS).await
    }

    pub async fn read_metadata(&self, id: &str) -> ClientResult<MetadataRecordRT> {
        let req = self.request(Method::GET, &format!("/1/metadata/{}", id));
        self.send_json(req, StatusCode::OK, READ_ERRORS).await
    }

    pub async fn list_metadata(&self, p: &MetadataListPayload) -> ClientResult<ListMetaRT> {
        let query = Query::default()
            .opt("entity-id", p.entity_id.as_deref())
            .opt("schema", p.schema.as_deref())
            .opt("aspect-path", p.aspect_path.as_deref())
            .opt("at-time", p.at_time.as_deref())
            .opt("limit", p.limit)
            .opt("filter", p.filter.as_deref())
            .opt("order-by", p.order_by.as_deref())
            .opt("order-desc", p.order_desc)
            .opt("page", p.page.as_deref());
        let req = self.request(Method::GET, "/1/metadata").query(&query.0);
        self.send_json(req, StatusCode::OK, LIST_ERRORS).await
    }
}
