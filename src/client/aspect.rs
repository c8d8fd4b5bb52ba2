use super::{ApiClient, ClientResult, Query};
use crate::{
    errors::ErrorName::{self, *},
    models::aspect::{AspectIDRT, AspectListPayload, AspectListRT, AspectRT, CreatePayload},
};
use reqwest::{Method, StatusCode, header};

const WRITE_ERRORS: &[ErrorName] = &[
    BadRequest,
    InvalidParameter,
    InvalidScopes,
    NotImplemented,
    NotAvailable,
    Unauthorized,
];
const RETRACT_ERRORS: &[ErrorName] = &[
    BadRequest,
    InvalidScopes,
    NotImplemented,
    NotFound,
    NotAvailable,
    Unauthorized,
];
const READ_ERRORS: &[ErrorName] =
    &[BadRequest, InvalidScopes, NotFound, NotAvailable, Unauthorized];
const LIST_ERRORS: &[ErrorName] = WRITE_ERRORS;

impl ApiClient {
    async fn write_aspect(&self, method: Method, p: &CreatePayload) -> ClientResult<AspectIDRT> {
        let query = Query::default()
            .set("entity", &p.entity)
            .set("schema", &p.schema)
            .opt("policy", p.policy.as_deref());
        let req = self
            .request(method, "/1/aspects")
            .query(&query.0)
            .header(header::CONTENT_TYPE, &p.content_type)
            .body(p.content.to_string());
        self.send_json(req, StatusCode::OK, WRITE_ERRORS).await
    }

    pub async fn create_aspect(&self, p: &CreatePayload) -> ClientResult<AspectIDRT> {
        self.write_aspect(Method::POST, p).await
    }

    /// Retract the active aspects for (entity, schema) and add `p`.
    pub async fn update_aspect(&self, p: &CreatePayload) -> ClientResult<AspectIDRT> {
        self.write_aspect(Method::PUT, p).await
    }

    pub async fn retract_aspect(&self, id: &str) -> ClientResult<()> {
        let req = self.request(Method::DELETE, &format!("/1/aspects/{}", id));
        self.send_empty(req, StatusCode::NO_CONTENT, RETRACT_ERRORS).await
    }

    pub async fn read_aspect(&self, id: &str) -> ClientResult<AspectRT> {
        let req = self.request(Method::GET, &format!("/1/aspects/{}", id));
        self.send_json(req, StatusCode::OK, READ_ERRORS).await
    }

    pub async fn list_aspects(&self, p: &AspectListPayload) -> ClientResult<AspectListRT> {
        let query = Query::default()
            .opt("entity", p.entity.as_deref())
            .opt("schema", p.schema.as_deref())
            .opt("content-path", p.content_path.as_deref())
            .opt("at-time", p.at_time.as_deref())
            .opt("limit", p.limit)
            .opt("filter", p.filter.as_deref())
            .opt("order-by", p.order_by.as_deref())
            .opt("order-direction", p.order_direction.as_deref())
            .opt("include-content", p.include_content)
            .opt("page", p.page.as_deref());
        let req = self.request(Method::GET, "/1/aspects").query(&query.0);
        self.send_json(req, StatusCode::OK, LIST_ERRORS).await
    }
}
