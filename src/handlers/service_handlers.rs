use super::json_body;
use crate::{
    auth::bearer_token,
    cli::builders::{BuildError, ForceCreateFlags, ListFlags, ViewFlags},
    errors::ServiceError,
    models::service::ServiceDescriptionT,
    state::AppState,
    views::service::project,
};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

pub async fn list_services(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(flags): Query<ListFlags>,
) -> Result<Response, ServiceError> {
    let payload = flags.build()?;
    let token = bearer_token(&headers);
    let res = state.services.list(token.as_deref(), payload).await?;
    Ok(Json(res).into_response())
}

/// `POST /1/services`
pub async fn create_service(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ServiceError> {
    let desc: ServiceDescriptionT = json_body(&body)?;
    let token = bearer_token(&headers);
    let res = state.services.create_service(token.as_deref(), desc).await?;

    let location = res.links.first().map(|l| l.href.clone());
    let mut response = (StatusCode::CREATED, Json(res)).into_response();
    if let Some(v) = location.and_then(|l| HeaderValue::from_str(&l).ok()) {
        response.headers_mut().insert(header::LOCATION, v);
    }
    Ok(response)
}

/// `GET /1/services/{id}?view=`
pub async fn read_service(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(flags): Query<ViewFlags>,
) -> Result<Response, ServiceError> {
    let view = flags.build().map_err(BuildError::into_bad_request)?;
    let token = bearer_token(&headers);
    let res = state.services.read(token.as_deref(), &id).await?;
    Ok(Json(project(&res, view)).into_response())
}

/// `PUT /1/services/{id}?force-create=`
pub async fn update_service(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(flags): Query<ForceCreateFlags>,
    body: Bytes,
) -> Result<Response, ServiceError> {
    let force_create = flags.build()?;
    let desc: ServiceDescriptionT = json_body(&body)?;
    let token = bearer_token(&headers);
    let res = state
        .services
        .update(token.as_deref(), &id, force_create, desc)
        .await?;
    Ok(Json(res).into_response())
}

pub async fn delete_service(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let token = bearer_token(&headers);
    state.services.delete(token.as_deref(), &id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
