use super::{header_str, json_body};
use crate::{
    auth::bearer_token,
    cli::builders::{AspectListFlags, AspectWriteFlags},
    errors::ServiceError,
    state::AppState,
};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::Value;

/// `POST /1/aspects?entity&schema&policy`
pub async fn create_aspect(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(flags): Query<AspectWriteFlags>,
    body: Bytes,
) -> Result<Response, ServiceError> {
    let content: Value = json_body(&body)?;
    let payload = flags.build(header_str(&headers, header::CONTENT_TYPE.as_str()), content)?;
    let token = bearer_token(&headers);
    let res = state.aspects.create(token.as_deref(), payload).await?;
    Ok(Json(res).into_response())
}

/// `PUT /1/aspects?entity&schema&policy`: retract the active aspects and add this one.
pub async fn update_aspect(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(flags): Query<AspectWriteFlags>,
    body: Bytes,
) -> Result<Response, ServiceError> {
    let content: Value = json_body(&body)?;
    let payload = flags.build(header_str(&headers, header::CONTENT_TYPE.as_str()), content)?;
    let token = bearer_token(&headers);
    let res = state.aspects.update(token.as_deref(), payload).await?;
    Ok(Json(res).into_response())
}

pub async fn retract_aspect(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let token = bearer_token(&headers);
    state.aspects.retract(token.as_deref(), &id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn read_aspect(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let token = bearer_token(&headers);
    let res = state.aspects.read(token.as_deref(), &id).await?;
    Ok(Json(res).into_response())
}

pub async fn list_aspects(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(flags): Query<AspectListFlags>,
) -> Result<Response, ServiceError> {
    let payload = flags.build()?;
    let token = bearer_token(&headers);
    let res = state.aspects.list(token.as_deref(), payload).await?;
    Ok(Json(res).into_response())
}
