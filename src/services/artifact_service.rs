//! Artifact storage: SQLite rows for status, [`BlobStore`] for payloads.
//!
//! Uploads follow the TUS core protocol. A `POST` either carries the whole
//! body, or declares `Upload-Length` and is followed by `PATCH` chunks that
//! must arrive at the stored offset.

use super::{ArtifactService, ByteStream, blob_store::BlobStore};
use crate::{
    auth::Principal,
    db::timestamp,
    errors::{ServiceError, ServiceResult},
    models::{
        artifact::{
            ArtifactListItem, ArtifactListRT, ArtifactRecord, ArtifactStatusRT, STATUS_PARTIAL,
            STATUS_PENDING, STATUS_READY, TUS_CHUNK_CONTENT_TYPE, TUS_VERSION, UploadChunkPayload,
            UploadPayload, UploadStatus,
        },
        common::{
            LinkT, ListPayload, Paging, format_time, page_links, push_query, reject_filter,
            resolve_at_time, validate_uuid,
        },
    },
};
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use uuid::Uuid;

const NAMESPACE: &str = "artifacts";
const ARTIFACT_COLUMNS: &str = "id, name, status, mime_type, content_encoding, size, \
     upload_offset, etag, collection, policy, account, created_at, last_modified_at";

#[derive(Clone)]
pub struct SqliteArtifactService {
    db: SqlitePool,
    blobs: BlobStore,
    public_url: String,
}

impl SqliteArtifactService {
    pub fn new(db: SqlitePool, blobs: BlobStore, public_url: impl Into<String>) -> Self {
        Self {
            db,
            blobs,
            public_url: public_url.into(),
        }
    }

    fn href(&self, id: &str) -> String {
        format!("{}/1/artifacts/{}", self.public_url, id)
    }

    fn to_status(&self, rec: &ArtifactRecord) -> ArtifactStatusRT {
        let href = self.href(&rec.id);
        let data_href = format!("{}/blob", href);
        ArtifactStatusRT {
            id: rec.id.clone(),
            name: rec.name.clone(),
            status: rec.status.clone(),
            mime_type: rec.mime_type.clone(),
            size: rec.size,
            etag: rec.etag.clone(),
            collection: rec.collection.clone(),
            policy: rec.policy.clone(),
            account: rec.account.clone(),
            created_at: Some(format_time(&rec.created_at)),
            last_modified_at: Some(format_time(&rec.last_modified_at)),
            data_href: Some(data_href.clone()),
            links: vec![
                LinkT::new("self", "application/json", href),
                LinkT::new(
                    "data",
                    rec.mime_type.as_deref().unwrap_or("application/octet-stream"),
                    data_href,
                ),
            ],
        }
    }

    async fn fetch(&self, id: &str) -> ServiceResult<ArtifactRecord> {
        validate_uuid("id", id).map_err(|_| {
            ServiceError::bad_request(format!("`{}` is not a valid artifact id", id))
        })?;
        sqlx::query_as::<_, ArtifactRecord>(&format!(
            "SELECT {} FROM artifacts WHERE id = ?",
            ARTIFACT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| ServiceError::not_found(id, format!("artifact `{}` not found", id)))
    }
}

fn check_tus_version(version: Option<&str>, required: bool) -> ServiceResult<()> {
    match version {
        Some(TUS_VERSION) => Ok(()),
        Some(other) => Err(ServiceError::bad_request(format!(
            "unsupported Tus-Resumable version `{}`",
            other
        ))),
        None if required => Err(ServiceError::bad_request("Tus-Resumable header is required")),
        None => Ok(()),
    }
}

fn order_column(order_by: Option<&str>) -> ServiceResult<&'static str> {
    match order_by.unwrap_or("created_at") {
        "created_at" => Ok("created_at"),
        "name" => Ok("name"),
        "status" => Ok("status"),
        "size" => Ok("size"),
        other => Err(ServiceError::invalid_parameter(
            "order-by",
            Some(other),
            "must be one of created_at, name, status, size",
        )),
    }
}

#[async_trait]
impl ArtifactService for SqliteArtifactService {
    async fn list(&self, _who: &Principal, p: ListPayload) -> ServiceResult<ArtifactListRT> {
        reject_filter(p.filter.as_deref())?;
        let paging = Paging::resolve(p.limit, p.page.as_deref())?;
        let at_time = resolve_at_time(p.at_time.as_deref())?;
        let column = order_column(p.order_by.as_deref())?;
        let desc = p.order_desc.unwrap_or(true);

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM artifacts WHERE created_at <= ",
            ARTIFACT_COLUMNS
        ));
        builder.push_bind(timestamp(&at_time));
        builder.push(format!(
            " ORDER BY {} {}, id ASC LIMIT ",
            column,
            if desc { "DESC" } else { "ASC" }
        ));
        builder.push_bind(paging.limit + 1);
        builder.push(" OFFSET ");
        builder.push_bind(paging.offset);

        let mut rows: Vec<ArtifactRecord> = builder.build_query_as().fetch_all(&self.db).await?;
        let has_more = rows.len() as i64 > paging.limit;
        rows.truncate(paging.limit as usize);

        let mut query = Vec::new();
        push_query(&mut query, "order-by", p.order_by.as_deref());
        let order_desc = p.order_desc.map(|d| if d { "true" } else { "false" });
        push_query(&mut query, "order-desc", order_desc);
        push_query(&mut query, "at-time", p.at_time.as_deref());

        Ok(ArtifactListRT {
            artifacts: rows
                .iter()
                .map(|rec| ArtifactListItem {
                    id: rec.id.clone(),
                    name: rec.name.clone(),
                    status: rec.status.clone(),
                    size: rec.size,
                    mime_type: rec.mime_type.clone(),
                    href: self.href(&rec.id),
                })
                .collect(),
            at_time: format_time(&at_time),
            links: page_links(
                &format!("{}/1/artifacts", self.public_url),
                &query.join("&"),
                &paging,
                has_more,
            ),
        })
    }

    async fn read(&self, _who: &Principal, id: &str) -> ServiceResult<ArtifactStatusRT> {
        let rec = self.fetch(id).await?;
        Ok(self.to_status(&rec))
    }

    async fn upload(
        &self,
        who: &Principal,
        p: UploadPayload,
        body: ByteStream,
    ) -> ServiceResult<(ArtifactStatusRT, UploadStatus)> {
        check_tus_version(p.tus_resumable.as_deref(), false)?;
        if let Some(len) = p.upload_length {
            if len < 0 {
                return Err(ServiceError::invalid_parameter(
                    "Upload-Length",
                    Some(&len.to_string()),
                    "must not be negative",
                ));
            }
        }

        let id = Uuid::new_v4().to_string();
        let summary = self.blobs.write_stream(NAMESPACE, &id, body).await?;

        let (status, size, etag) = match p.upload_length {
            Some(len) if summary.size > len => {
                self.blobs.remove(NAMESPACE, &id).await?;
                return Err(ServiceError::invalid_parameter(
                    "Upload-Length",
                    Some(&len.to_string()),
                    format!("body has {} bytes, more than declared", summary.size),
                ));
            }
            Some(len) if summary.size == len => (STATUS_READY, len, Some(summary.md5)),
            Some(len) if summary.size == 0 => (STATUS_PENDING, len, None),
            Some(len) => (STATUS_PARTIAL, len, None),
            None => (STATUS_READY, summary.size, Some(summary.md5)),
        };

        let now = Utc::now();
        let insert = sqlx::query(
            "INSERT INTO artifacts (id, name, status, mime_type, content_encoding, size, \
             upload_offset, etag, collection, policy, account, created_at, last_modified_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&p.name)
        .bind(status)
        .bind(&p.content_type)
        .bind(&p.content_encoding)
        .bind(size)
        .bind(summary.size)
        .bind(&etag)
        .bind(&p.collection)
        .bind(&p.policy)
        .bind(&who.subject)
        .bind(timestamp(&now))
        .bind(timestamp(&now))
        .execute(&self.db)
        .await;

        if let Err(err) = insert {
            let _ = self.blobs.remove(NAMESPACE, &id).await;
            return Err(err.into());
        }

        info!(artifact = %id, status, size, "artifact created");
        let rec = self.fetch(&id).await?;
        Ok((
            self.to_status(&rec),
            UploadStatus {
                upload_offset: summary.size,
                upload_length: p.upload_length,
            },
        ))
    }

    async fn upload_status(&self, _who: &Principal, id: &str) -> ServiceResult<UploadStatus> {
        let rec = self.fetch(id).await?;
        Ok(UploadStatus {
            upload_offset: rec.upload_offset,
            upload_length: rec.size,
        })
    }

    async fn upload_chunk(
        &self,
        _who: &Principal,
        p: UploadChunkPayload,
        body: ByteStream,
    ) -> ServiceResult<UploadStatus> {
        check_tus_version(p.tus_resumable.as_deref(), true)?;
        if p.content_type.as_deref() != Some(TUS_CHUNK_CONTENT_TYPE) {
            return Err(ServiceError::unsupported_content_type(format!(
                "chunks must be sent as `{}`",
                TUS_CHUNK_CONTENT_TYPE
            )));
        }

        // held until the new offset is committed
        let _guard = self.blobs.lock(NAMESPACE, &p.id).await;
        let rec = self.fetch(&p.id).await?;
        if rec.status == STATUS_READY {
            return Err(ServiceError::bad_request(format!(
                "upload of artifact `{}` is already complete",
                rec.id
            )));
        }
        if p.upload_offset != rec.upload_offset {
            return Err(ServiceError::invalid_parameter(
                "Upload-Offset",
                Some(&p.upload_offset.to_string()),
                format!("expected offset {}", rec.upload_offset),
            ));
        }

        // bytes past the committed offset are left over from a failed commit
        if self
            .blobs
            .len(NAMESPACE, &rec.id)
            .await?
            .is_some_and(|len| len > rec.upload_offset)
        {
            self.blobs
                .truncate(NAMESPACE, &rec.id, rec.upload_offset)
                .await?;
        }

        let remaining = rec.size.map(|len| len - rec.upload_offset);
        let written = self
            .blobs
            .write_at(
                NAMESPACE,
                &rec.id,
                rec.upload_offset,
                remaining,
                "Upload-Length",
                body,
            )
            .await?;
        let new_offset = rec.upload_offset + written;

        let complete = rec.size == Some(new_offset);
        let etag = if complete {
            Some(self.blobs.md5_hex(NAMESPACE, &rec.id).await?)
        } else {
            None
        };
        let status = if complete {
            STATUS_READY
        } else if new_offset == 0 {
            STATUS_PENDING
        } else {
            STATUS_PARTIAL
        };

        let result = sqlx::query(
            "UPDATE artifacts SET upload_offset = ?, status = ?, etag = ?, last_modified_at = ?
             WHERE id = ? AND upload_offset = ?",
        )
        .bind(new_offset)
        .bind(status)
        .bind(&etag)
        .bind(timestamp(&Utc::now()))
        .bind(&rec.id)
        .bind(rec.upload_offset)
        .execute(&self.db)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 1 => {}
            Ok(_) => {
                // the row moved without this lock; its bytes are not ours to cut
                return Err(ServiceError::invalid_parameter(
                    "Upload-Offset",
                    Some(&p.upload_offset.to_string()),
                    "offset changed by a concurrent upload",
                ));
            }
            Err(err) => {
                self.blobs
                    .truncate(NAMESPACE, &rec.id, rec.upload_offset)
                    .await?;
                return Err(err.into());
            }
        }

        debug!(artifact = %rec.id, offset = new_offset, status, "chunk stored");
        Ok(UploadStatus {
            upload_offset: new_offset,
            upload_length: rec.size,
        })
    }

    async fn download(
        &self,
        _who: &Principal,
        id: &str,
    ) -> ServiceResult<(ArtifactStatusRT, ByteStream)> {
        let rec = self.fetch(id).await?;
        if rec.status != STATUS_READY {
            return Err(ServiceError::not_found(
                id,
                format!("data of artifact `{}` is not yet available", id),
            ));
        }
        let file = self
            .blobs
            .open_at(NAMESPACE, &rec.id, 0)
            .await?
            .ok_or_else(|| ServiceError::not_found(id, "artifact data missing"))?;
        Ok((self.to_status(&rec), ReaderStream::new(file).boxed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::test_pool,
        services::{once_stream, test_principal},
    };
    use bytes::Bytes;
    use futures::TryStreamExt;
    use tokio::sync::oneshot;

    async fn service() -> (tempfile::TempDir, SqliteArtifactService) {
        let dir = tempfile::tempdir().unwrap();
        let svc = SqliteArtifactService::new(
            test_pool().await,
            BlobStore::new(dir.path()),
            "http://localhost:8088",
        );
        (dir, svc)
    }

    async fn collect(stream: ByteStream) -> Vec<u8> {
        stream
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn single_shot_upload_is_ready() {
        let (_dir, svc) = service().await;
        let who = test_principal();
        let (status, upload) = svc
            .upload(
                &who,
                UploadPayload {
                    content_type: Some("text/plain".into()),
                    name: Some("hello.txt".into()),
                    ..Default::default()
                },
                once_stream(&b"hello"[..]),
            )
            .await
            .unwrap();
        assert_eq!(status.status, STATUS_READY);
        assert_eq!(status.size, Some(5));
        assert_eq!(status.account.as_deref(), Some("alice"));
        assert_eq!(upload.upload_offset, 5);

        let (_, body) = svc.download(&who, &status.id).await.unwrap();
        assert_eq!(collect(body).await, b"hello");
    }

    #[tokio::test]
    async fn tus_creation_then_chunks() {
        let (_dir, svc) = service().await;
        let who = test_principal();
        let (status, upload) = svc
            .upload(
                &who,
                UploadPayload {
                    upload_length: Some(6),
                    tus_resumable: Some(TUS_VERSION.into()),
                    ..Default::default()
                },
                once_stream(Vec::new()),
            )
            .await
            .unwrap();
        assert_eq!(status.status, STATUS_PENDING);
        assert_eq!(upload.upload_offset, 0);

        let chunk = |offset| UploadChunkPayload {
            id: status.id.clone(),
            upload_offset: offset,
            tus_resumable: Some(TUS_VERSION.into()),
            content_type: Some(TUS_CHUNK_CONTENT_TYPE.into()),
        };

        let st = svc
            .upload_chunk(&who, chunk(0), once_stream(&b"abc"[..]))
            .await
            .unwrap();
        assert_eq!(st.upload_offset, 3);
        assert_eq!(svc.read(&who, &status.id).await.unwrap().status, STATUS_PARTIAL);

        let err = svc
            .upload_chunk(&who, chunk(0), once_stream(&b"abc"[..]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidParameter(ref p) if p.name == "Upload-Offset"));

        let st = svc
            .upload_chunk(&who, chunk(3), once_stream(&b"def"[..]))
            .await
            .unwrap();
        assert_eq!(st.upload_offset, 6);
        let done = svc.read(&who, &status.id).await.unwrap();
        assert_eq!(done.status, STATUS_READY);
        assert_eq!(done.etag, Some(format!("{:x}", md5::compute("abcdef"))));

        let err = svc
            .upload_chunk(&who, chunk(6), once_stream(&b"g"[..]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn oversized_chunk_is_rejected() {
        let (_dir, svc) = service().await;
        let who = test_principal();
        let (status, _) = svc
            .upload(
                &who,
                UploadPayload {
                    upload_length: Some(2),
                    tus_resumable: Some(TUS_VERSION.into()),
                    ..Default::default()
                },
                once_stream(Vec::new()),
            )
            .await
            .unwrap();
        let err = svc
            .upload_chunk(
                &who,
                UploadChunkPayload {
                    id: status.id.clone(),
                    upload_offset: 0,
                    tus_resumable: Some(TUS_VERSION.into()),
                    content_type: Some(TUS_CHUNK_CONTENT_TYPE.into()),
                },
                once_stream(&b"abc"[..]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidParameter(_)));
        assert_eq!(svc.upload_status(&who, &status.id).await.unwrap().upload_offset, 0);
    }

    #[tokio::test]
    async fn chunk_requires_offset_content_type() {
        let (_dir, svc) = service().await;
        let err = svc
            .upload_chunk(
                &test_principal(),
                UploadChunkPayload {
                    id: Uuid::new_v4().to_string(),
                    upload_offset: 0,
                    tus_resumable: Some(TUS_VERSION.into()),
                    content_type: Some("application/json".into()),
                },
                once_stream(Vec::new()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::UnsupportedContentType(_)));
    }

    #[tokio::test]
    async fn unknown_tus_version_is_bad_request() {
        let (_dir, svc) = service().await;
        let err = svc
            .upload(
                &test_principal(),
                UploadPayload {
                    tus_resumable: Some("0.2.2".into()),
                    ..Default::default()
                },
                once_stream(Vec::new()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn pending_artifact_cannot_be_downloaded() {
        let (_dir, svc) = service().await;
        let who = test_principal();
        let (status, _) = svc
            .upload(
                &who,
                UploadPayload {
                    upload_length: Some(10),
                    ..Default::default()
                },
                once_stream(Vec::new()),
            )
            .await
            .unwrap();
        assert!(matches!(
            svc.download(&who, &status.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_pages_through_artifacts() {
        let (_dir, svc) = service().await;
        let who = test_principal();
        for i in 0..3 {
            svc.upload(
                &who,
                UploadPayload {
                    name: Some(format!("a{}", i)),
                    ..Default::default()
                },
                once_stream(vec![b'x'; i + 1]),
            )
            .await
            .unwrap();
        }

        let first = svc
            .list(
                &who,
                ListPayload {
                    limit: Some(2),
                    order_by: Some("name".into()),
                    order_desc: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(first.artifacts.len(), 2);
        assert_eq!(first.artifacts[0].name.as_deref(), Some("a0"));
        let next = first.links.iter().find(|l| l.rel == "next").unwrap();
        let token = next.href.rsplit("page=").next().unwrap().to_string();

        let second = svc
            .list(
                &who,
                ListPayload {
                    limit: Some(2),
                    page: Some(token),
                    order_by: Some("name".into()),
                    order_desc: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(second.artifacts.len(), 1);
        assert_eq!(second.artifacts[0].name.as_deref(), Some("a2"));
        assert!(second.links.iter().all(|l| l.rel != "next"));
    }

    #[tokio::test]
    async fn list_rejects_unknown_order_column() {
        let (_dir, svc) = service().await;
        let err = svc
            .list(
                &test_principal(),
                ListPayload {
                    order_by: Some("id; DROP TABLE artifacts".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn read_requires_uuid() {
        let (_dir, svc) = service().await;
        assert!(matches!(
            svc.read(&test_principal(), "not-a-uuid").await,
            Err(ServiceError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_chunks_at_one_offset_keep_disk_and_row_in_step() {
        let (_dir, svc) = service().await;
        let who = test_principal();
        let (status, _) = svc
            .upload(
                &who,
                UploadPayload {
                    upload_length: Some(8),
                    tus_resumable: Some(TUS_VERSION.into()),
                    ..Default::default()
                },
                once_stream(Vec::new()),
            )
            .await
            .unwrap();
        let chunk = UploadChunkPayload {
            id: status.id.clone(),
            upload_offset: 0,
            tus_resumable: Some(TUS_VERSION.into()),
            content_type: Some(TUS_CHUNK_CONTENT_TYPE.into()),
        };

        // the first body stalls halfway until released
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let head = futures::stream::once(async move {
            let _ = started_tx.send(());
            Ok::<_, std::io::Error>(Bytes::from_static(b"AAAA"))
        });
        let tail = futures::stream::once(async move {
            let _ = release_rx.await;
            Ok::<_, std::io::Error>(Bytes::from_static(b"aaaa"))
        });
        let slow: ByteStream = head.chain(tail).boxed();

        let first = tokio::spawn({
            let (svc, who, chunk) = (svc.clone(), who.clone(), chunk.clone());
            async move { svc.upload_chunk(&who, chunk, slow).await }
        });
        started_rx.await.unwrap();
        let second = tokio::spawn({
            let (svc, who, chunk) = (svc.clone(), who.clone(), chunk.clone());
            async move {
                svc.upload_chunk(&who, chunk, once_stream(&b"BBBB"[..]))
                    .await
            }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        release_tx.send(()).unwrap();

        let won = first.await.unwrap().unwrap();
        assert_eq!(won.upload_offset, 8);
        assert!(second.await.unwrap().is_err());

        let committed = svc.upload_status(&who, &status.id).await.unwrap();
        let on_disk = svc.blobs.len(NAMESPACE, &status.id).await.unwrap();
        assert_eq!(on_disk, Some(committed.upload_offset));

        let (_, body) = svc.download(&who, &status.id).await.unwrap();
        assert_eq!(collect(body).await, b"AAAAaaaa");
    }

    #[tokio::test]
    async fn chunk_drops_bytes_left_past_the_committed_offset() {
        let (_dir, svc) = service().await;
        let who = test_principal();
        let (status, _) = svc
            .upload(
                &who,
                UploadPayload {
                    upload_length: Some(4),
                    tus_resumable: Some(TUS_VERSION.into()),
                    ..Default::default()
                },
                once_stream(Vec::new()),
            )
            .await
            .unwrap();
        // bytes on disk that were never committed to the row
        svc.blobs
            .write_at(NAMESPACE, &status.id, 0, None, "len", once_stream(&b"zz"[..]))
            .await
            .unwrap();

        let st = svc
            .upload_chunk(
                &who,
                UploadChunkPayload {
                    id: status.id.clone(),
                    upload_offset: 0,
                    tus_resumable: Some(TUS_VERSION.into()),
                    content_type: Some(TUS_CHUNK_CONTENT_TYPE.into()),
                },
                once_stream(&b"data"[..]),
            )
            .await
            .unwrap();
        assert_eq!(st.upload_offset, 4);
        let (_, body) = svc.download(&who, &status.id).await.unwrap();
        assert_eq!(collect(body).await, b"data");
    }
}
