//! Route table for the `/1/...` API.
//!
//! ## Structure
//! - **Artifacts**: `/1/artifacts`, `/1/artifacts/{id}`, `/1/artifacts/{id}/blob` (TUS)
//! - **Aspects**: `/1/aspects`, `/1/aspects/{id}`
//! - **Metadata**: `/1/metadata`, `/1/metadata/{id}`
//! - **Packages**: `/1/pkgs`, `/1/pkgs/pull`, `/1/pkgs/push`, `/1/pkgs/push/status`
//! - **Services**: `/1/services`, `/1/services/{id}`
//!
//! Health probes are mounted at the root and are not authenticated.

use crate::{
    handlers::{
        artifact_handlers::{
            download_artifact, list_artifacts, read_artifact, upload_artifact, upload_chunk,
            upload_status,
        },
        aspect_handlers::{create_aspect, list_aspects, read_aspect, retract_aspect, update_aspect},
        health_handlers::{healthz, readyz},
        metadata_handlers::{
            add_metadata, list_metadata, read_metadata, revoke_metadata, update_metadata_record,
            update_one_metadata,
        },
        package_handlers::{list_packages, pull_package, push_package, push_status, remove_package},
        service_handlers::{
            create_service, delete_service, list_services, read_service, update_service,
        },
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Build the router for every route, without state.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // artifacts
        .route("/1/artifacts", get(list_artifacts).post(upload_artifact))
        .route("/1/artifacts/{id}", get(read_artifact))
        .route(
            "/1/artifacts/{id}/blob",
            get(download_artifact)
                .head(upload_status)
                .patch(upload_chunk),
        )
        // aspects
        .route(
            "/1/aspects",
            get(list_aspects).post(create_aspect).put(update_aspect),
        )
        .route("/1/aspects/{id}", get(read_aspect).delete(retract_aspect))
        // metadata
        .route(
            "/1/metadata",
            get(list_metadata)
                .post(add_metadata)
                .put(update_one_metadata),
        )
        .route(
            "/1/metadata/{id}",
            get(read_metadata)
                .put(update_metadata_record)
                .delete(revoke_metadata),
        )
        // packages
        .route("/1/pkgs", get(list_packages).delete(remove_package))
        .route("/1/pkgs/pull", get(pull_package))
        .route("/1/pkgs/push", post(push_package))
        .route("/1/pkgs/push/status", get(push_status))
        // services
        .route("/1/services", get(list_services).post(create_service))
        .route(
            "/1/services/{id}",
            get(read_service).put(update_service).delete(delete_service),
        )
}

/// The complete application: routes, state and request tracing.
///
/// Streamed bodies (artifact uploads, package pushes) are unbounded; JSON
/// bodies are buffered, so the default limit is lifted for them too.
pub fn app(state: AppState) -> Router {
    routes()
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
