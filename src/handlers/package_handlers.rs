//! `/1/pkgs`: tagged manifests and chunked, content-addressed blobs.

use super::{
    HEADER_AVAILABLE, HEADER_DIGEST, HEADER_END, HEADER_FORCE, HEADER_START, HEADER_TOTAL,
    body_stream, header_string, set_header,
};
use crate::{
    auth::bearer_token,
    cli::builders::{BuildError, PackageListFlags, PullFlags, PushFlags, PushStatusFlags, TagFlags},
    errors::ServiceError,
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

/// Query half of a push; the rest travels in headers.
#[derive(Debug, Deserialize)]
pub struct PushQuery {
    pub tag: Option<String>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
}

pub async fn list_packages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(flags): Query<PackageListFlags>,
) -> Result<Response, ServiceError> {
    let payload = flags.build()?;
    let token = bearer_token(&headers);
    let res = state.packages.list(token.as_deref(), payload).await?;
    Ok(Json(res).into_response())
}

/// `GET /1/pkgs/pull?ref&type&digest&offset`
pub async fn pull_package(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(flags): Query<PullFlags>,
) -> Result<Response, ServiceError> {
    let payload = flags.build()?;
    let token = bearer_token(&headers);
    let (range, stream) = state.packages.pull(token.as_deref(), payload).await?;

    let mut response = Response::new(Body::from_stream(stream));
    let h = response.headers_mut();
    h.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    h.insert(header::CONTENT_LENGTH, HeaderValue::from(range.available));
    set_header(h, HEADER_TOTAL, range.total);
    set_header(h, HEADER_AVAILABLE, range.available);
    Ok(response)
}

/// `POST /1/pkgs/push?tag&type`: 200 once the blob is complete, 202 while
/// more ranges are expected.
pub async fn push_package(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PushQuery>,
    body: Body,
) -> Result<Response, ServiceError> {
    let flags = PushFlags {
        tag: query.tag,
        type_: query.type_,
        digest: header_string(&headers, HEADER_DIGEST),
        force: header_string(&headers, HEADER_FORCE),
        start: header_string(&headers, HEADER_START),
        end: header_string(&headers, HEADER_END),
    };
    let payload = flags.build()?;
    let token = bearer_token(&headers);
    let outcome = state
        .packages
        .push(token.as_deref(), payload, body_stream(body))
        .await?;

    let status = if outcome.complete {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    Ok((status, Json(outcome.result)).into_response())
}

/// `GET /1/pkgs/push/status?tag&digest`
pub async fn push_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(flags): Query<PushStatusFlags>,
) -> Result<Response, ServiceError> {
    let (tag, digest) = flags.build()?;
    let token = bearer_token(&headers);
    let res = state.packages.status(token.as_deref(), &tag, &digest).await?;
    Ok(Json(res).into_response())
}

/// `DELETE /1/pkgs?tag`
pub async fn remove_package(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(flags): Query<TagFlags>,
) -> Result<Response, ServiceError> {
    let tag = flags.build().map_err(BuildError::into_bad_request)?;
    let token = bearer_token(&headers);
    state.packages.remove(token.as_deref(), &tag).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
