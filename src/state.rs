use crate::{
    auth::Authorizer,
    endpoints::{
        ArtifactEndpoints, AspectEndpoints, MetadataEndpoints, PackageEndpoints, ServiceEndpoints,
    },
    services::{
        artifact_service::SqliteArtifactService, aspect_service::SqliteAspectService,
        blob_store::BlobStore, metadata_service::SqliteMetadataService,
        package_service::SqlitePackageService, service_registry::SqliteServiceRegistry,
    },
};
use sqlx::SqlitePool;
use std::{path::PathBuf, sync::Arc};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub artifacts: ArtifactEndpoints,
    pub aspects: AspectEndpoints,
    pub metadata: MetadataEndpoints,
    pub packages: PackageEndpoints,
    pub services: ServiceEndpoints,
    /// Used by the readiness probe.
    pub db: SqlitePool,
    pub base_path: PathBuf,
}

impl AppState {
    /// Wire the SQLite + disk services behind their endpoint wrappers.
    pub fn new(
        db: SqlitePool,
        storage_dir: impl Into<PathBuf>,
        public_url: &str,
        auth: Arc<dyn Authorizer>,
    ) -> Self {
        let base_path = storage_dir.into();
        let blobs = BlobStore::new(base_path.clone());
        let public_url = public_url.trim_end_matches('/');

        Self {
            artifacts: ArtifactEndpoints::new(
                Arc::new(SqliteArtifactService::new(db.clone(), blobs.clone(), public_url)),
                auth.clone(),
            ),
            aspects: AspectEndpoints::new(
                Arc::new(SqliteAspectService::new(db.clone(), public_url)),
                auth.clone(),
            ),
            metadata: MetadataEndpoints::new(
                Arc::new(SqliteMetadataService::new(db.clone(), public_url)),
                auth.clone(),
            ),
            packages: PackageEndpoints::new(
                Arc::new(SqlitePackageService::new(db.clone(), blobs, public_url)),
                auth.clone(),
            ),
            services: ServiceEndpoints::new(
                Arc::new(SqliteServiceRegistry::new(db.clone(), public_url)),
                auth,
            ),
            db,
            base_path,
        }
    }
}
