//! Error taxonomy shared by every service.
//!
//! Each variant is bound to exactly one HTTP status code and one body shape.
//! The server renders them through `IntoResponse`; the client decodes them
//! back by status code (see `client::decode_error`).

use axum::{
    Json,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{fmt, io};
use thiserror::Error;

/// Header carrying the error name on every error response.
pub const ERROR_NAME_HEADER: &str = "x-error-name";

/// `bad-request` (400)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadRequestT {
    pub message: String,
}

/// `invalid-scopes` (403)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidScopesT {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub message: String,
}

/// `not-found` (404)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceNotFoundT {
    pub id: String,
    pub message: String,
}

/// `already-created` (409)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAlreadyCreatedT {
    pub id: String,
    pub message: String,
}

/// `unsupported-content-type` (415)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsupportedContentTypeT {
    pub message: String,
}

/// `invalid-parameter` (422)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidParameterT {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub message: String,
}

/// `not-implemented` (501)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotImplementedT {
    pub message: String,
}

/// Names of the errors an endpoint may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorName {
    BadRequest,
    Unauthorized,
    InvalidScopes,
    NotFound,
    AlreadyCreated,
    UnsupportedContentType,
    InvalidParameter,
    NotImplemented,
    NotAvailable,
}

impl ErrorName {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorName::BadRequest => StatusCode::BAD_REQUEST,
            ErrorName::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorName::InvalidScopes => StatusCode::FORBIDDEN,
            ErrorName::NotFound => StatusCode::NOT_FOUND,
            ErrorName::AlreadyCreated => StatusCode::CONFLICT,
            ErrorName::UnsupportedContentType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ErrorName::InvalidParameter => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorName::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            ErrorName::NotAvailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorName::BadRequest => "bad-request",
            ErrorName::Unauthorized => "unauthorized",
            ErrorName::InvalidScopes => "invalid-scopes",
            ErrorName::NotFound => "not-found",
            ErrorName::AlreadyCreated => "already-created",
            ErrorName::UnsupportedContentType => "unsupported-content-type",
            ErrorName::InvalidParameter => "invalid-parameter",
            ErrorName::NotImplemented => "not-implemented",
            ErrorName::NotAvailable => "not-available",
        }
    }

    /// Reverse lookup used by the client when switching on a status code.
    pub fn from_status(status: StatusCode) -> Option<Self> {
        [
            ErrorName::BadRequest,
            ErrorName::Unauthorized,
            ErrorName::InvalidScopes,
            ErrorName::NotFound,
            ErrorName::AlreadyCreated,
            ErrorName::UnsupportedContentType,
            ErrorName::InvalidParameter,
            ErrorName::NotImplemented,
            ErrorName::NotAvailable,
        ]
        .into_iter()
        .find(|name| name.status() == status)
    }
}

impl fmt::Display for ErrorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every failure a service operation can report.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error("bad request: {}", .0.message)]
    BadRequest(BadRequestT),
    #[error("unauthorized")]
    Unauthorized,
    #[error("invalid scopes: {}", .0.message)]
    InvalidScopes(InvalidScopesT),
    #[error("not found: {}", .0.message)]
    NotFound(ResourceNotFoundT),
    #[error("already created: {}", .0.message)]
    AlreadyCreated(ResourceAlreadyCreatedT),
    #[error("unsupported content type: {}", .0.message)]
    UnsupportedContentType(UnsupportedContentTypeT),
    #[error("invalid parameter `{}`: {}", .0.name, .0.message)]
    InvalidParameter(InvalidParameterT),
    #[error("not implemented: {}", .0.message)]
    NotImplemented(NotImplementedT),
    #[error("service not available")]
    NotAvailable,
    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(BadRequestT {
            message: msg.into(),
        })
    }

    pub fn invalid_scopes(msg: impl Into<String>) -> Self {
        Self::InvalidScopes(InvalidScopesT {
            id: None,
            message: msg.into(),
        })
    }

    pub fn not_found(id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::NotFound(ResourceNotFoundT {
            id: id.into(),
            message: msg.into(),
        })
    }

    pub fn already_created(id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::AlreadyCreated(ResourceAlreadyCreatedT {
            id: id.into(),
            message: msg.into(),
        })
    }

    pub fn unsupported_content_type(msg: impl Into<String>) -> Self {
        Self::UnsupportedContentType(UnsupportedContentTypeT {
            message: msg.into(),
        })
    }

    pub fn invalid_parameter(
        name: impl Into<String>,
        value: Option<&str>,
        msg: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter(InvalidParameterT {
            name: name.into(),
            value: value.map(str::to_string),
            message: msg.into(),
        })
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented(NotImplementedT {
            message: msg.into(),
        })
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The declared error name, or `None` for internal failures.
    pub fn name(&self) -> Option<ErrorName> {
        match self {
            ServiceError::BadRequest(_) => Some(ErrorName::BadRequest),
            ServiceError::Unauthorized => Some(ErrorName::Unauthorized),
            ServiceError::InvalidScopes(_) => Some(ErrorName::InvalidScopes),
            ServiceError::NotFound(_) => Some(ErrorName::NotFound),
            ServiceError::AlreadyCreated(_) => Some(ErrorName::AlreadyCreated),
            ServiceError::UnsupportedContentType(_) => Some(ErrorName::UnsupportedContentType),
            ServiceError::InvalidParameter(_) => Some(ErrorName::InvalidParameter),
            ServiceError::NotImplemented(_) => Some(ErrorName::NotImplemented),
            ServiceError::NotAvailable => Some(ErrorName::NotAvailable),
            ServiceError::Internal(_) => None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.name()
            .map(ErrorName::status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = match &self {
            ServiceError::BadRequest(body) => (status, Json(body)).into_response(),
            ServiceError::InvalidScopes(body) => (status, Json(body)).into_response(),
            ServiceError::NotFound(body) => (status, Json(body)).into_response(),
            ServiceError::AlreadyCreated(body) => (status, Json(body)).into_response(),
            ServiceError::UnsupportedContentType(body) => (status, Json(body)).into_response(),
            ServiceError::InvalidParameter(body) => (status, Json(body)).into_response(),
            ServiceError::NotImplemented(body) => (status, Json(body)).into_response(),
            ServiceError::Unauthorized | ServiceError::NotAvailable => status.into_response(),
            ServiceError::Internal(msg) => {
                tracing::error!("internal error: {}", msg);
                (status, Json(json!({ "message": "internal server error" }))).into_response()
            }
        };

        if let Some(name) = self.name() {
            response
                .headers_mut()
                .insert(ERROR_NAME_HEADER, HeaderValue::from_static(name.as_str()));
        }
        response
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                tracing::warn!("database unavailable: {}", err);
                ServiceError::NotAvailable
            }
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<io::Error> for ServiceError {
    fn from(err: io::Error) -> Self {
        ServiceError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_name_round_trips_through_its_status() {
        for name in [
            ErrorName::BadRequest,
            ErrorName::Unauthorized,
            ErrorName::InvalidScopes,
            ErrorName::NotFound,
            ErrorName::AlreadyCreated,
            ErrorName::UnsupportedContentType,
            ErrorName::InvalidParameter,
            ErrorName::NotImplemented,
            ErrorName::NotAvailable,
        ] {
            assert_eq!(ErrorName::from_status(name.status()), Some(name));
        }
        assert_eq!(ErrorName::from_status(StatusCode::INTERNAL_SERVER_ERROR), None);
    }

    #[test]
    fn error_response_carries_name_header() {
        let resp = ServiceError::not_found("abc", "no such thing").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            resp.headers().get(ERROR_NAME_HEADER).unwrap(),
            "not-found"
        );
    }

    #[test]
    fn internal_errors_have_no_declared_name() {
        let err = ServiceError::internal("disk on fire");
        assert_eq!(err.name(), None);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn pool_timeouts_map_to_not_available() {
        let err: ServiceError = sqlx::Error::PoolTimedOut.into();
        assert_eq!(err, ServiceError::NotAvailable);
    }
}
