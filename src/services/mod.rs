//! Service contracts and their SQLite + disk implementations.
//!
//! The traits are what the endpoint layer forwards to; anything satisfying
//! them can back the HTTP server. The `Sqlite*` types are the reference
//! implementation shipped with the binary.

pub mod artifact_service;
pub mod aspect_service;
pub mod blob_store;
pub mod metadata_service;
pub mod package_service;
pub mod record_store;
pub mod service_registry;

use crate::{
    auth::Principal,
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
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::io;

/// Streaming request or response body.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

#[async_trait]
pub trait ArtifactService: Send + Sync {
    async fn list(&self, who: &Principal, p: ListPayload) -> ServiceResult<ArtifactListRT>;
    async fn read(&self, who: &Principal, id: &str) -> ServiceResult<ArtifactStatusRT>;
    async fn upload(
        &self,
        who: &Principal,
        p: UploadPayload,
        body: ByteStream,
    ) -> ServiceResult<(ArtifactStatusRT, UploadStatus)>;
    async fn upload_status(&self, who: &Principal, id: &str) -> ServiceResult<UploadStatus>;
    async fn upload_chunk(
        &self,
        who: &Principal,
        p: UploadChunkPayload,
        body: ByteStream,
    ) -> ServiceResult<UploadStatus>;
    async fn download(
        &self,
        who: &Principal,
        id: &str,
    ) -> ServiceResult<(ArtifactStatusRT, ByteStream)>;
}

#[async_trait]
pub trait AspectService: Send + Sync {
    async fn create(&self, who: &Principal, p: CreatePayload) -> ServiceResult<AspectIDRT>;
    async fn update(&self, who: &Principal, p: CreatePayload) -> ServiceResult<AspectIDRT>;
    async fn retract(&self, who: &Principal, id: &str) -> ServiceResult<()>;
    async fn read(&self, who: &Principal, id: &str) -> ServiceResult<AspectRT>;
    async fn list(&self, who: &Principal, p: AspectListPayload) -> ServiceResult<AspectListRT>;
}

#[async_trait]
pub trait MetadataService: Send + Sync {
    async fn add(&self, who: &Principal, p: AddPayload) -> ServiceResult<AddMetaRT>;
    async fn update_one(&self, who: &Principal, p: AddPayload) -> ServiceResult<AddMetaRT>;
    async fn update_record(
        &self,
        who: &Principal,
        p: UpdateRecordPayload,
    ) -> ServiceResult<AddMetaRT>;
    async fn revoke(&self, who: &Principal, id: &str) -> ServiceResult<()>;
    async fn read(&self, who: &Principal, id: &str) -> ServiceResult<MetadataRecordRT>;
    async fn list(&self, who: &Principal, p: MetadataListPayload) -> ServiceResult<ListMetaRT>;
}

#[async_trait]
pub trait PackageService: Send + Sync {
    async fn list(&self, who: &Principal, p: PackageListPayload) -> ServiceResult<ListResult>;
    async fn pull(
        &self,
        who: &Principal,
        p: PullPayload,
    ) -> ServiceResult<(PullRange, ByteStream)>;
    async fn push(
        &self,
        who: &Principal,
        p: PushPayload,
        body: ByteStream,
    ) -> ServiceResult<PushOutcome>;
    async fn status(&self, who: &Principal, tag: &str, digest: &str) -> ServiceResult<PushStatusT>;
    async fn remove(&self, who: &Principal, tag: &str) -> ServiceResult<()>;
}

#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    async fn list(&self, who: &Principal, p: ListPayload) -> ServiceResult<ServiceListRT>;
    async fn create_service(
        &self,
        who: &Principal,
        desc: ServiceDescriptionT,
    ) -> ServiceResult<ServiceStatusRT>;
    async fn read(&self, who: &Principal, id: &str) -> ServiceResult<ServiceStatusRT>;
    async fn update(
        &self,
        who: &Principal,
        id: &str,
        force_create: bool,
        desc: ServiceDescriptionT,
    ) -> ServiceResult<ServiceStatusRT>;
    async fn delete(&self, who: &Principal, id: &str) -> ServiceResult<()>;
}

/// Turn a fully buffered body into a [`ByteStream`].
pub fn once_stream(bytes: impl Into<Bytes>) -> ByteStream {
    use futures::StreamExt;
    futures::stream::once(futures::future::ready(Ok(bytes.into()))).boxed()
}

/// Principal used by unit tests across the service modules.
#[cfg(test)]
pub(crate) fn test_principal() -> Principal {
    Principal {
        subject: "alice".into(),
        scopes: vec!["*".into()],
    }
}
