//! `/1/artifacts`: listing, status reads and TUS uploads.

use super::{
    HEADER_TUS_RESUMABLE, HEADER_UPLOAD_LENGTH, HEADER_UPLOAD_OFFSET, HEADER_X_COLLECTION,
    HEADER_X_NAME, HEADER_X_POLICY, body_stream, header_str, header_string, set_header,
};
use crate::{
    auth::bearer_token,
    cli::builders::{BuildError, ListFlags, UploadFlags, ViewFlags, build_upload_chunk, parse_uuid},
    errors::ServiceError,
    models::artifact::TUS_VERSION,
    state::AppState,
    views::artifact::project,
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

/// `GET /1/artifacts`
pub async fn list_artifacts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(flags): Query<ListFlags>,
) -> Result<Response, ServiceError> {
    let payload = flags.build()?;
    let token = bearer_token(&headers);
    let res = state.artifacts.list(token.as_deref(), payload).await?;
    Ok(Json(res).into_response())
}

/// `GET /1/artifacts/{id}?view=`
pub async fn read_artifact(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(flags): Query<ViewFlags>,
) -> Result<Response, ServiceError> {
    let view = flags.build().map_err(BuildError::into_bad_request)?;
    let token = bearer_token(&headers);
    let res = state.artifacts.read(token.as_deref(), &id).await?;
    Ok(Json(project(&res, view)).into_response())
}

/// `POST /1/artifacts`
///
/// Either a complete upload, or (with `Upload-Length` and an empty body) a
/// TUS creation followed by `PATCH` chunks.
pub async fn upload_artifact(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ServiceError> {
    let flags = UploadFlags {
        content_type: header_string(&headers, header::CONTENT_TYPE.as_str()),
        content_encoding: header_string(&headers, header::CONTENT_ENCODING.as_str()),
        name: header_string(&headers, HEADER_X_NAME),
        collection: header_string(&headers, HEADER_X_COLLECTION),
        policy: header_string(&headers, HEADER_X_POLICY),
        upload_length: header_string(&headers, HEADER_UPLOAD_LENGTH),
        tus_resumable: header_string(&headers, HEADER_TUS_RESUMABLE),
    };
    let payload = flags.build()?;
    let token = bearer_token(&headers);
    let (res, upload) = state
        .artifacts
        .upload(token.as_deref(), payload, body_stream(body))
        .await?;

    let location = res
        .links
        .iter()
        .find(|l| l.rel == "self")
        .map(|l| l.href.clone())
        .unwrap_or_else(|| format!("/1/artifacts/{}", res.id));

    let mut response = (StatusCode::CREATED, Json(res)).into_response();
    let h = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&location) {
        h.insert(header::LOCATION, v);
    }
    set_header(h, HEADER_TUS_RESUMABLE, TUS_VERSION);
    set_header(h, HEADER_UPLOAD_OFFSET, upload.upload_offset);
    Ok(response)
}

/// `HEAD /1/artifacts/{id}/blob`: current TUS offset.
pub async fn upload_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let id = parse_uuid("id", &id)
        .map_err(|_| ServiceError::not_found(&id, format!("artifact `{}` not found", id)))?;
    let token = bearer_token(&headers);
    let status = state.artifacts.upload_status(token.as_deref(), &id).await?;

    let mut response = StatusCode::OK.into_response();
    let h = response.headers_mut();
    set_header(h, HEADER_UPLOAD_OFFSET, status.upload_offset);
    if let Some(len) = status.upload_length {
        set_header(h, HEADER_UPLOAD_LENGTH, len);
    }
    set_header(h, HEADER_TUS_RESUMABLE, TUS_VERSION);
    h.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(response)
}

/// `PATCH /1/artifacts/{id}/blob`: append a chunk at `Upload-Offset`.
pub async fn upload_chunk(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Body,
) -> Result<Response, ServiceError> {
    let payload = build_upload_chunk(
        &id,
        header_str(&headers, HEADER_UPLOAD_OFFSET),
        header_str(&headers, HEADER_TUS_RESUMABLE),
        header_str(&headers, header::CONTENT_TYPE.as_str()),
    )?;
    let token = bearer_token(&headers);
    let status = state
        .artifacts
        .upload_chunk(token.as_deref(), payload, body_stream(body))
        .await?;

    let mut response = StatusCode::NO_CONTENT.into_response();
    let h = response.headers_mut();
    set_header(h, HEADER_UPLOAD_OFFSET, status.upload_offset);
    set_header(h, HEADER_TUS_RESUMABLE, TUS_VERSION);
    Ok(response)
}

/// `GET /1/artifacts/{id}/blob`
pub async fn download_artifact(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let id = parse_uuid("id", &id)
        .map_err(|_| ServiceError::not_found(&id, format!("artifact `{}` not found", id)))?;
    let token = bearer_token(&headers);
    let (res, stream) = state.artifacts.download(token.as_deref(), &id).await?;

    let mut response = Response::new(Body::from_stream(stream));
    let h = response.headers_mut();
    let mime = res.mime_type.as_deref().unwrap_or("application/octet-stream");
    if let Ok(v) = HeaderValue::from_str(mime) {
        h.insert(header::CONTENT_TYPE, v);
    }
    if let Some(size) = res.size {
        h.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    }
    if let Some(etag) = res.etag.as_deref() {
        if let Ok(v) = HeaderValue::from_str(&format!("\"{}\"", etag)) {
            h.insert(header::ETAG, v);
        }
    }
    Ok(response)
}
