use super::{ApiClient, ClientResult, artifact::list_query};
use crate::{
    errors::ErrorName::{self, *},
    models::{
        common::ListPayload,
        service::{ServiceDescriptionT, ServiceListRT, ServiceStatusRT},
    },
    views::{View, service::ServiceStatusRTView},
};
use reqwest::{Method, StatusCode};

const LIST_ERRORS: &[ErrorName] = &[
    BadRequest,
    InvalidParameter,
    InvalidScopes,
    NotImplemented,
    NotAvailable,
    Unauthorized,
];
const CREATE_ERRORS: &[ErrorName] = &[
    BadRequest,
    InvalidParameter,
    InvalidScopes,
    NotImplemented,
    AlreadyCreated,
    NotAvailable,
    Unauthorized,
];
const READ_ERRORS: &[ErrorName] =
    &[BadRequest, InvalidScopes, NotFound, NotAvailable, Unauthorized];
const UPDATE_ERRORS: &[ErrorName] = &[
    BadRequest,
    InvalidParameter,
    InvalidScopes,
    NotImplemented,
    NotFound,
    NotAvailable,
    Unauthorized,
];
const DELETE_ERRORS: &[ErrorName] = &[
    BadRequest,
    InvalidScopes,
    NotImplemented,
    NotFound,
    NotAvailable,
    Unauthorized,
];

impl ApiClient {
    pub async fn list_services(&self, p: &ListPayload) -> ClientResult<ServiceListRT> {
        let req = self
            .request(Method::GET, "/1/services")
            .query(&list_query(p).0);
        self.send_json(req, StatusCode::OK, LIST_ERRORS).await
    }

    pub async fn create_service(
        &self,
        desc: &ServiceDescriptionT,
    ) -> ClientResult<ServiceStatusRT> {
        let req = self.request(Method::POST, "/1/services").json(desc);
        self.send_json(req, StatusCode::CREATED, CREATE_ERRORS).await
    }

    pub async fn read_service(&self, id: &str, view: View) -> ClientResult<ServiceStatusRT> {
        let req = self
            .request(Method::GET, &format!("/1/services/{}", id))
            .query(&[("view", view.as_str())]);
        let viewed: ServiceStatusRTView = self.send_json(req, StatusCode::OK, READ_ERRORS).await?;
        viewed.validate(view)?;
        Ok(viewed.into_result())
    }

    pub async fn update_service(
        &self,
        id: &str,
        force_create: bool,
        desc: &ServiceDescriptionT,
    ) -> ClientResult<ServiceStatusRT> {
        let req = self
            .request(Method::PUT, &format!("/1/services/{}", id))
            .query(&[("force-create", force_create)])
            .json(desc);
        self.send_json(req, StatusCode::OK, UPDATE_ERRORS).await
    }

    pub async fn delete_service(&self, id: &str) -> ClientResult<()> {
        let req = self.request(Method::DELETE, &format!("/1/services/{}", id));
        self.send_empty(req, StatusCode::NO_CONTENT, DELETE_ERRORS).await
    }
}
