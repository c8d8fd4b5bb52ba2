//! Endpoint wrappers: authorize against the operation's scheme, then forward.
//!
//! Each wrapper owns the service implementation and the authorizer. On an
//! authorization failure the service is never called; otherwise its result
//! is returned unchanged.

use crate::{
    auth::{Authorizer, JwtScheme},
    errors::ServiceResult,
    models::{
        artifact::{
            ArtifactListRT, ArtifactStatusRT, UploadChunkPayload, UploadPayload, UploadStatus,
        },
        aspect::{AspectIDRT, AspectListPayload, AspectListRT, AspectRT, CreatePayload},
        common::ListPayload,
        metadata::{
            AddMetaRT, AddPayload, ListMetaRT, MetadataListPayload, MetadataRecordRT,
            UpdateRecordPayload,
        },
        package::{
            ListResult, PackageListPayload, PullPayload, PullRange, PushOutcome, PushPayload,
            PushStatusT,
        },
        service::{ServiceDescriptionT, ServiceListRT, ServiceStatusRT},
    },
    services::{
        ArtifactService, AspectService, ByteStream, MetadataService, PackageService,
        ServiceRegistry,
    },
};
use std::sync::Arc;

pub const ARTIFACT_READ: JwtScheme = JwtScheme::new(&["artifact:read"]);
pub const ARTIFACT_WRITE: JwtScheme = JwtScheme::new(&["artifact:write"]);
pub const ASPECT_READ: JwtScheme = JwtScheme::new(&["aspect:read"]);
pub const ASPECT_WRITE: JwtScheme = JwtScheme::new(&["aspect:write"]);
pub const METADATA_READ: JwtScheme = JwtScheme::new(&["metadata:read"]);
pub const METADATA_WRITE: JwtScheme = JwtScheme::new(&["metadata:write"]);
pub const PACKAGE_READ: JwtScheme = JwtScheme::new(&["package:read"]);
pub const PACKAGE_WRITE: JwtScheme = JwtScheme::new(&["package:write"]);
pub const SERVICE_READ: JwtScheme = JwtScheme::new(&["service:read"]);
pub const SERVICE_WRITE: JwtScheme = JwtScheme::new(&["service:write"]);

#[derive(Clone)]
pub struct ArtifactEndpoints {
    svc: Arc<dyn ArtifactService>,
    auth: Arc<dyn Authorizer>,
}

impl ArtifactEndpoints {
    pub fn new(svc: Arc<dyn ArtifactService>, auth: Arc<dyn Authorizer>) -> Self {
        Self { svc, auth }
    }

    pub async fn list(&self, token: Option<&str>, p: ListPayload) -> ServiceResult<ArtifactListRT> {
        let who = self.auth.authorize(token, &ARTIFACT_READ)?;
        self.svc.list(&who, p).await
    }

    pub async fn read(&self, token: Option<&str>, id: &str) -> ServiceResult<ArtifactStatusRT> {
        let who = self.auth.authorize(token, &ARTIFACT_READ)?;
        self.svc.read(&who, id).await
    }

    pub async fn upload(
        &self,
        token: Option<&str>,
        p: UploadPayload,
        body: ByteStream,
    ) -> ServiceResult<(ArtifactStatusRT, UploadStatus)> {
        let who = self.auth.authorize(token, &ARTIFACT_WRITE)?;
        self.svc.upload(&who, p, body).await
    }

    pub async fn upload_status(
        &self,
        token: Option<&str>,
        id: &str,
    ) -> ServiceResult<UploadStatus> {
        let who = self.auth.authorize(token, &ARTIFACT_READ)?;
        self.svc.upload_status(&who, id).await
    }

    pub async fn upload_chunk(
        &self,
        token: Option<&str>,
        p: UploadChunkPayload,
        body: ByteStream,
    ) -> ServiceResult<UploadStatus> {
        let who = self.auth.authorize(token, &ARTIFACT_WRITE)?;
        self.svc.upload_chunk(&who, p, body).await
    }

    pub async fn download(
        &self,
        token: Option<&str>,
        id: &str,
    ) -> ServiceResult<(ArtifactStatusRT, ByteStream)> {
        let who = self.auth.authorize(token, &ARTIFACT_READ)?;
        self.svc.download(&who, id).await
    }
}

#[derive(Clone)]
pub struct AspectEndpoints {
    svc: Arc<dyn AspectService>,
    auth: Arc<dyn Authorizer>,
}

impl AspectEndpoints {
    pub fn new(svc: Arc<dyn AspectService>, auth: Arc<dyn Authorizer>) -> Self {
        Self { svc, auth }
    }

    pub async fn create(&self, token: Option<&str>, p: CreatePayload) -> ServiceResult<AspectIDRT> {
        let who = self.auth.authorize(token, &ASPECT_WRITE)?;
        self.svc.create(&who, p).await
    }

    pub async fn update(&self, token: Option<&str>, p: CreatePayload) -> ServiceResult<AspectIDRT> {
        let who = self.auth.authorize(token, &ASPECT_WRITE)?;
        self.svc.update(&who, p).await
    }

    pub async fn retract(&self, token: Option<&str>, id: &str) -> ServiceResult<()> {
        let who = self.auth.authorize(token, &ASPECT_WRITE)?;
        self.svc.retract(&who, id).await
    }

    pub async fn read(&self, token: Option<&str>, id: &str) -> ServiceResult<AspectRT> {
        let who = self.auth.authorize(token, &ASPECT_READ)?;
        self.svc.read(&who, id).await
    }

    pub async fn list(
        &self,
        token: Option<&str>,
        p: AspectListPayload,
    ) -> ServiceResult<AspectListRT> {
        let who = self.auth.authorize(token, &ASPECT_READ)?;
        self.svc.list(&who, p).await
    }
}

#[derive(Clone)]
pub struct MetadataEndpoints {
    svc: Arc<dyn MetadataService>,
    auth: Arc<dyn Authorizer>,
}

impl MetadataEndpoints {
    pub fn new(svc: Arc<dyn MetadataService>, auth: Arc<dyn Authorizer>) -> Self {
        Self { svc, auth }
    }

    pub async fn add(&self, token: Option<&str>, p: AddPayload) -> ServiceResult<AddMetaRT> {
        let who = self.auth.authorize(token, &METADATA_WRITE)?;
        self.svc.add(&who, p).await
    }

    pub async fn update_one(&self, token: Option<&str>, p: AddPayload) -> ServiceResult<AddMetaRT> {
        let who = self.auth.authorize(token, &METADATA_WRITE)?;
        self.svc.update_one(&who, p).await
    }

    pub async fn update_record(
        &self,
        token: Option<&str>,
        p: UpdateRecordPayload,
    ) -> ServiceResult<AddMetaRT> {
        let who = self.auth.authorize(token, &METADATA_WRITE)?;
        self.svc.update_record(&who, p).await
    }

    pub async fn revoke(&self, token: Option<&str>, id: &str) -> ServiceResult<()> {
        let who = self.auth.authorize(token, &METADATA_WRITE)?;
        self.svc.revoke(&who, id).await
    }

    pub async fn read(&self, token: Option<&str>, id: &str) -> ServiceResult<MetadataRecordRT> {
        let who = self.auth.authorize(token, &METADATA_READ)?;
        self.svc.read(&who, id).await
    }

    pub async fn list(
        &self,
        token: Option<&str>,
        p: MetadataListPayload,
    ) -> ServiceResult<ListMetaRT> {
        let who = self.auth.authorize(token, &METADATA_READ)?;
        self.svc.list(&who, p).await
    }
}

#[derive(Clone)]
pub struct PackageEndpoints {
    svc: Arc<dyn PackageService>,
    auth: Arc<dyn Authorizer>,
}

impl PackageEndpoints {
    pub fn new(svc: Arc<dyn PackageService>, auth: Arc<dyn Authorizer>) -> Self {
        Self { svc, auth }
    }

    pub async fn list(
        &self,
        token: Option<&str>,
        p: PackageListPayload,
    ) -> ServiceResult<ListResult> {
        let who = self.auth.authorize(token, &PACKAGE_READ)?;
        self.svc.list(&who, p).await
    }

    pub async fn pull(
        &self,
        token: Option<&str>,
        p: PullPayload,
    ) -> ServiceResult<(PullRange, ByteStream)> {
        let who = self.auth.authorize(token, &PACKAGE_READ)?;
        self.svc.pull(&who, p).await
    }

    pub async fn push(
        &self,
        token: Option<&str>,
        p: PushPayload,
        body: ByteStream,
    ) -> ServiceResult<PushOutcome> {
        let who = self.auth.authorize(token, &PACKAGE_WRITE)?;
        self.svc.push(&who, p, body).await
    }

    pub async fn status(
        &self,
        token: Option<&str>,
        tag: &str,
        digest: &str,
    ) -> ServiceResult<PushStatusT> {
        let who = self.auth.authorize(token, &PACKAGE_READ)?;
        self.svc.status(&who, tag, digest).await
    }

    pub async fn remove(&self, token: Option<&str>, tag: &str) -> ServiceResult<()> {
        let who = self.auth.authorize(token, &PACKAGE_WRITE)?;
        self.svc.remove(&who, tag).await
    }
}

#[derive(Clone)]
pub struct ServiceEndpoints {
    svc: Arc<dyn ServiceRegistry>,
    auth: Arc<dyn Authorizer>,
}

impl ServiceEndpoints {
    pub fn new(svc: Arc<dyn ServiceRegistry>, auth: Arc<dyn Authorizer>) -> Self {
        Self { svc, auth }
    }

    pub async fn list(&self, token: Option<&str>, p: ListPayload) -> ServiceResult<ServiceListRT> {
        let who = self.auth.authorize(token, &SERVICE_READ)?;
        self.svc.list(&who, p).await
    }

    pub async fn create_service(
        &self,
        token: Option<&str>,
        desc: ServiceDescriptionT,
    ) -> ServiceResult<ServiceStatusRT> {
        let who = self.auth.authorize(token, &SERVICE_WRITE)?;
        self.svc.create_service(&who, desc).await
    }

    pub async fn read(&self, token: Option<&str>, id: &str) -> ServiceResult<ServiceStatusRT> {
        let who = self.auth.authorize(token, &SERVICE_READ)?;
        self.svc.read(&who, id).await
    }

    pub async fn update(
        &self,
        token: Option<&str>,
        id: &str,
        force_create: bool,
        desc: ServiceDescriptionT,
    ) -> ServiceResult<ServiceStatusRT> {
        let who = self.auth.authorize(token, &SERVICE_WRITE)?;
        self.svc.update(&who, id, force_create, desc).await
    }

    pub async fn delete(&self, token: Option<&str>, id: &str) -> ServiceResult<()> {
        let who = self.auth.authorize(token, &SERVICE_WRITE)?;
        self.svc.delete(&who, id).await
    }
}
