use super::json_body;
use crate::{
    auth::bearer_token,
    cli::builders::{MetadataListFlags, MetadataWriteFlags},
    errors::ServiceError,
    state::AppState,
};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::Value;

/// `POST /1/metadata?entity-id&schema&policy-id`
pub async fn add_metadata(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(flags): Query<MetadataWriteFlags>,
    body: Bytes,
) -> Result<Response, ServiceError> {
    let aspect: Value = json_body(&body)?;
    let payload = flags.build(aspect)?;
    let token = bearer_token(&headers);
    let res = state.metadata.add(token.as_deref(), payload).await?;
    Ok(Json(res).into_response())
}

/// `PUT /1/metadata?entity-id&schema&policy-id`
pub async fn update_one_metadata(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(flags): Query<MetadataWriteFlags>,
    body: Bytes,
) -> Result<Response, ServiceError> {
    let aspect: Value = json_body(&body)?;
    let payload = flags.build(aspect)?;
    let token = bearer_token(&headers);
    let res = state.metadata.update_one(token.as_deref(), payload).await?;
    Ok(Json(res).into_response())
}

/// `PUT /1/metadata/{id}`
pub async fn update_metadata_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(flags): Query<MetadataWriteFlags>,
    body: Bytes,
) -> Result<Response, ServiceError> {
    let aspect: Value = json_body(&body)?;
    let payload = flags.build_update(&id, aspect)?;
    let token = bearer_token(&headers);
    let res = state.metadata.update_record(token.as_deref(), payload).await?;
    Ok(Json(res).into_response())
}

pub async fn revoke_metadata(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let token = bearer_token(&headers);
    state.metadata.revoke(token.as_deref(), &id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn read_metadata(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let token = bearer_token(&headers);
    let res = state.metadata.read(token.as_deref(), &id).await?;
    Ok(Json(res).into_response())
}

pub async fn list_metadata(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(flags): Query<MetadataListFlags>,
) -> Result<Response, ServiceError> {
    let payload = flags.build()?;
    let token = bearer_token(&headers);
    let res = state.metadata.list(token.as_deref(), payload).await?;
    Ok(Json(res).into_response())
}
