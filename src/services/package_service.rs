//! Package registry: tags point at manifest blobs, blobs are addressed by
//! sha256 digest.
//!
//! Config and layer blobs may be pushed in byte ranges (`Start`..`End`).
//! Ranges accumulate in a staging area and the blob is promoted once the
//! staged bytes hash to the announced digest.

use super::{ByteStream, PackageService, blob_store::BlobStore};
use crate::{
    auth::Principal,
    db::timestamp,
    errors::{ServiceError, ServiceResult},
    models::{
        common::{Paging, page_links, push_query},
        package::{
            BlobType, ListResult, PackageListPayload, PullPayload, PullRange, PushOutcome,
            PushPayload, PushResult, PushState, PushStatusT, validate_digest,
        },
    },
};
use async_trait::async_trait;
use bytes::BytesMut;
use chrono::Utc;
use futures::{StreamExt, TryStreamExt};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

const BLOBS: &str = "blobs";
const STAGING: &str = "uploads";
/// Manifests are small JSON documents and are buffered in memory.
const MAX_MANIFEST_BYTES: usize = 4 * 1024 * 1024;

pub struct SqlitePackageService {
    db: SqlitePool,
    blobs: BlobStore,
    public_url: String,
}

impl SqlitePackageService {
    pub fn new(db: SqlitePool, blobs: BlobStore, public_url: impl Into<String>) -> Self {
        Self {
            db,
            blobs,
            public_url: public_url.into(),
        }
    }

    async fn blob_size(&self, digest: &str) -> ServiceResult<Option<i64>> {
        Ok(
            sqlx::query_scalar::<_, i64>("SELECT size FROM pkg_blobs WHERE digest = ?")
                .bind(digest)
                .fetch_optional(&self.db)
                .await?,
        )
    }

    async fn record_blob(&self, digest: &str, blob_type: BlobType, size: i64) -> ServiceResult<()> {
        sqlx::query(
            "INSERT INTO pkg_blobs (digest, media_type, size, created_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(digest) DO NOTHING",
        )
        .bind(digest)
        .bind(blob_type.as_str())
        .bind(size)
        .bind(timestamp(&Utc::now()))
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn push_manifest(
        &self,
        who: &Principal,
        p: &PushPayload,
        body: ByteStream,
    ) -> ServiceResult<PushOutcome> {
        let bytes = body
            .map_err(|err| ServiceError::bad_request(format!("reading body: {}", err)))
            .try_fold(BytesMut::new(), |mut acc, chunk| async move {
                if acc.len() + chunk.len() > MAX_MANIFEST_BYTES {
                    return Err(ServiceError::bad_request("manifest exceeds 4 MiB"));
                }
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await?
            .freeze();
        if bytes.is_empty() {
            return Err(ServiceError::bad_request("manifest body is empty"));
        }

        let digest = format!("sha256:{}", hex::encode(Sha256::digest(&bytes)));
        if let Some(expected) = &p.digest {
            if expected != &digest {
                return Err(ServiceError::invalid_parameter(
                    "Digest",
                    Some(expected),
                    format!("manifest hashes to {}", digest),
                ));
            }
        }

        if let Some(current) = sqlx::query_scalar::<_, String>(
            "SELECT manifest_digest FROM pkg_tags WHERE tag = ?",
        )
        .bind(&p.tag)
        .fetch_optional(&self.db)
        .await?
        {
            if current != digest && !p.force {
                return Err(ServiceError::already_created(
                    &p.tag,
                    format!("tag `{}` already points at {}; use Force to replace", p.tag, current),
                ));
            }
        }

        if self.blob_size(&digest).await?.is_none() {
            let size = bytes.len() as i64;
            self.blobs
                .write_stream(BLOBS, &digest, super::once_stream(bytes))
                .await?;
            self.record_blob(&digest, BlobType::Manifest, size).await?;
        }

        sqlx::query(
            "INSERT INTO pkg_tags (tag, manifest_digest, account, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(tag) DO UPDATE SET manifest_digest = excluded.manifest_digest,
                 account = excluded.account, updated_at = excluded.updated_at",
        )
        .bind(&p.tag)
        .bind(&digest)
        .bind(&who.subject)
        .bind(timestamp(&Utc::now()))
        .execute(&self.db)
        .await?;

        info!(tag = %p.tag, digest = %digest, "manifest tagged");
        Ok(PushOutcome {
            result: PushResult { digest },
            complete: true,
        })
    }

    async fn push_blob(&self, p: &PushPayload, body: ByteStream) -> ServiceResult<PushOutcome> {
        let digest = p
            .digest
            .clone()
            .ok_or_else(|| ServiceError::bad_request("Digest header is required for blobs"))?;

        // staged length is the committed offset while this is held
        let _guard = self.blobs.lock(STAGING, &digest).await;
        if self.blob_size(&digest).await?.is_some() {
            debug!(digest = %digest, "blob already present");
            return Ok(PushOutcome {
                result: PushResult { digest },
                complete: true,
            });
        }

        let staged = self.blobs.len(STAGING, &digest).await?.unwrap_or(0);
        let start = p.start.unwrap_or(staged);
        if start != staged {
            return Err(ServiceError::invalid_parameter(
                "Start",
                Some(&start.to_string()),
                format!("{} bytes are staged", staged),
            ));
        }
        let declared = match p.end {
            Some(end) if end < start => {
                return Err(ServiceError::invalid_parameter(
                    "End",
                    Some(&end.to_string()),
                    "must not be smaller than Start",
                ));
            }
            Some(end) => Some(end - start),
            None => None,
        };

        let written = self
            .blobs
            .write_at(STAGING, &digest, start, declared, "End", body)
            .await?;
        if let Some(expected) = declared {
            if written != expected {
                self.blobs.truncate(STAGING, &digest, start).await?;
                return Err(ServiceError::invalid_parameter(
                    "End",
                    p.end.map(|e| e.to_string()).as_deref(),
                    format!("body has {} bytes, range declares {}", written, expected),
                ));
            }
        }

        let size = start + written;
        let actual = self.blobs.sha256_digest(STAGING, &digest).await?;
        if actual != digest {
            debug!(digest = %digest, staged = size, "blob incomplete");
            return Ok(PushOutcome {
                result: PushResult { digest },
                complete: false,
            });
        }

        self.blobs.promote(STAGING, &digest, BLOBS, &digest).await?;
        self.record_blob(&digest, p.type_, size).await?;
        info!(digest = %digest, size, "blob stored");
        Ok(PushOutcome {
            result: PushResult { digest },
            complete: true,
        })
    }
}

#[async_trait]
impl PackageService for SqlitePackageService {
    async fn list(&self, _who: &Principal, p: PackageListPayload) -> ServiceResult<ListResult> {
        let paging = Paging::resolve(p.limit, p.page.as_deref())?;
        let prefix = p.tag.clone().unwrap_or_default();
        let mut tags: Vec<String> = sqlx::query_scalar(
            "SELECT tag FROM pkg_tags WHERE substr(tag, 1, length(?)) = ?
             ORDER BY tag ASC LIMIT ? OFFSET ?",
        )
        .bind(&prefix)
        .bind(&prefix)
        .bind(paging.limit + 1)
        .bind(paging.offset)
        .fetch_all(&self.db)
        .await?;
        let has_more = tags.len() as i64 > paging.limit;
        tags.truncate(paging.limit as usize);

        let mut qs = Vec::new();
        push_query(&mut qs, "tag", p.tag.as_deref());
        Ok(ListResult {
            items: tags,
            links: page_links(
                &format!("{}/1/pkgs", self.public_url),
                &qs.join("&"),
                &paging,
                has_more,
            ),
        })
    }

    async fn pull(
        &self,
        _who: &Principal,
        p: PullPayload,
    ) -> ServiceResult<(PullRange, ByteStream)> {
        let digest = match p.type_ {
            BlobType::Manifest => {
                let tag = p
                    .reference
                    .as_deref()
                    .ok_or_else(|| ServiceError::bad_request("ref is required for manifests"))?;
                sqlx::query_scalar::<_, String>(
                    "SELECT manifest_digest FROM pkg_tags WHERE tag = ?",
                )
                .bind(tag)
                .fetch_optional(&self.db)
                .await?
                .ok_or_else(|| ServiceError::not_found(tag, format!("tag `{}` not found", tag)))?
            }
            _ => {
                let digest = p
                    .digest
                    .clone()
                    .ok_or_else(|| ServiceError::bad_request("digest is required for blobs"))?;
                validate_digest("digest", &digest)?;
                digest
            }
        };

        let total = self.blob_size(&digest).await?.ok_or_else(|| {
            ServiceError::not_found(&digest, format!("blob `{}` not found", digest))
        })?;
        let offset = p.offset.unwrap_or(0);
        if offset < 0 || offset > total {
            return Err(ServiceError::invalid_parameter(
                "offset",
                Some(&offset.to_string()),
                format!("must be within 0..={}", total),
            ));
        }

        let file = self
            .blobs
            .open_at(BLOBS, &digest, offset)
            .await?
            .ok_or_else(|| ServiceError::internal(format!("blob `{}` missing on disk", digest)))?;
        Ok((
            PullRange {
                total,
                available: total - offset,
            },
            ReaderStream::new(file).boxed(),
        ))
    }

    async fn push(
        &self,
        who: &Principal,
        p: PushPayload,
        body: ByteStream,
    ) -> ServiceResult<PushOutcome> {
        if p.tag.trim().is_empty() {
            return Err(ServiceError::bad_request("tag must not be empty"));
        }
        if let Some(digest) = &p.digest {
            validate_digest("Digest", digest)?;
        }
        match p.type_ {
            BlobType::Manifest => self.push_manifest(who, &p, body).await,
            BlobType::Config | BlobType::Layer => self.push_blob(&p, body).await,
        }
    }

    async fn status(
        &self,
        _who: &Principal,
        tag: &str,
        digest: &str,
    ) -> ServiceResult<PushStatusT> {
        if tag.trim().is_empty() {
            return Err(ServiceError::bad_request("tag must not be empty"));
        }
        validate_digest("digest", digest)?;
        if let Some(size) = self.blob_size(digest).await? {
            return Ok(PushStatusT {
                status: PushState::Exists,
                available: size,
            });
        }
        Ok(match self.blobs.len(STAGING, digest).await? {
            Some(staged) => PushStatusT {
                status: PushState::Partial,
                available: staged,
            },
            None => PushStatusT {
                status: PushState::Missing,
                available: 0,
            },
        })
    }

    async fn remove(&self, _who: &Principal, tag: &str) -> ServiceResult<()> {
        let result = sqlx::query("DELETE FROM pkg_tags WHERE tag = ?")
            .bind(tag)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found(tag, format!("tag `{}` not found", tag)));
        }
        info!(tag = %tag, "tag removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::test_pool,
        services::{once_stream, test_principal},
    };

    fn sha(data: &[u8]) -> String {
        format!("sha256:{}", hex::encode(Sha256::digest(data)))
    }

    async fn service() -> (tempfile::TempDir, SqlitePackageService) {
        let dir = tempfile::tempdir().unwrap();
        let blobs = BlobStore::new(dir.path());
        let svc = SqlitePackageService::new(test_pool().await, blobs, "http://h");
        (dir, svc)
    }

    fn push(
        type_: BlobType,
        digest: Option<String>,
        start: Option<i64>,
        end: Option<i64>,
    ) -> PushPayload {
        PushPayload {
            tag: "demo/app:1.0".into(),
            type_,
            digest,
            force: false,
            start,
            end,
        }
    }

    async fn drain(stream: ByteStream) -> Vec<u8> {
        stream
            .try_fold(Vec::new(), |mut acc, c| async move {
                acc.extend_from_slice(&c);
                Ok(acc)
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn chunked_layer_push_then_ranged_pull() {
        let (_dir, svc) = service().await;
        let who = test_principal();
        let data = b"0123456789".to_vec();
        let digest = sha(&data);

        let st = svc.status(&who, "demo/app:1.0", &digest).await.unwrap();
        assert_eq!(st.status, PushState::Missing);

        let out = svc
            .push(
                &who,
                push(BlobType::Layer, Some(digest.clone()), Some(0), Some(4)),
                once_stream(data[..4].to_vec()),
            )
            .await
            .unwrap();
        assert!(!out.complete);
        let st = svc.status(&who, "demo/app:1.0", &digest).await.unwrap();
        assert_eq!((st.status, st.available), (PushState::Partial, 4));

        let err = svc
            .push(
                &who,
                push(BlobType::Layer, Some(digest.clone()), Some(2), Some(4)),
                once_stream(data[2..4].to_vec()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidParameter(ref p) if p.name == "Start"));

        let out = svc
            .push(
                &who,
                push(BlobType::Layer, Some(digest.clone()), Some(4), Some(10)),
                once_stream(data[4..].to_vec()),
            )
            .await
            .unwrap();
        assert!(out.complete);
        assert_eq!(out.result.digest, digest);

        let (range, body) = svc
            .pull(
                &who,
                PullPayload {
                    reference: None,
                    type_: BlobType::Layer,
                    digest: Some(digest.clone()),
                    offset: Some(6),
                },
            )
            .await
            .unwrap();
        assert_eq!((range.total, range.available), (10, 4));
        assert_eq!(drain(body).await, b"6789");
    }

    #[tokio::test]
    async fn range_length_mismatch_is_rolled_back() {
        let (_dir, svc) = service().await;
        let who = test_principal();
        let digest = sha(b"abcdef");
        let err = svc
            .push(
                &who,
                push(BlobType::Config, Some(digest.clone()), Some(0), Some(5)),
                once_stream(&b"abc"[..]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidParameter(ref p) if p.name == "End"));
        let st = svc.status(&who, "demo/app:1.0", &digest).await.unwrap();
        assert_eq!(st.available, 0);
    }

    #[tokio::test]
    async fn manifest_tags_require_force_to_move() {
        let (_dir, svc) = service().await;
        let who = test_principal();
        let m1 = br#"{"layers":[]}"#.to_vec();
        let m2 = br#"{"layers":["x"]}"#.to_vec();

        let out = svc
            .push(
                &who,
                push(BlobType::Manifest, Some(sha(&m1)), None, None),
                once_stream(m1.clone()),
            )
            .await
            .unwrap();
        assert_eq!(out.result.digest, sha(&m1));

        let err = svc
            .push(&who, push(BlobType::Manifest, None, None, None), once_stream(m2.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyCreated(_)));

        let mut forced = push(BlobType::Manifest, None, None, None);
        forced.force = true;
        svc.push(&who, forced, once_stream(m2.clone())).await.unwrap();

        let (_, body) = svc
            .pull(
                &who,
                PullPayload {
                    reference: Some("demo/app:1.0".into()),
                    type_: BlobType::Manifest,
                    digest: None,
                    offset: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(drain(body).await, m2);
    }

    #[tokio::test]
    async fn manifest_digest_mismatch_is_invalid() {
        let (_dir, svc) = service().await;
        let err = svc
            .push(
                &test_principal(),
                push(BlobType::Manifest, Some(sha(b"other")), None, None),
                once_stream(&b"{}"[..]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidParameter(ref p) if p.name == "Digest"));
    }

    #[tokio::test]
    async fn list_and_remove_tags() {
        let (_dir, svc) = service().await;
        let who = test_principal();
        for tag in ["demo/a:1", "demo/b:1", "other/c:1"] {
            let mut p = push(BlobType::Manifest, None, None, None);
            p.tag = tag.into();
            let body = once_stream(format!("{{\"t\":\"{}\"}}", tag));
            svc.push(&who, p, body).await.unwrap();
        }
        let listed = svc
            .list(
                &who,
                PackageListPayload {
                    tag: Some("demo/".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(listed.items, vec!["demo/a:1", "demo/b:1"]);

        svc.remove(&who, "demo/a:1").await.unwrap();
        assert!(matches!(
            svc.remove(&who, "demo/a:1").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn pull_offset_beyond_total_is_invalid() {
        let (_dir, svc) = service().await;
        let who = test_principal();
        let data = b"xyz".to_vec();
        let digest = sha(&data);
        let layer = push(BlobType::Layer, Some(digest.clone()), None, None);
        svc.push(&who, layer, once_stream(data)).await.unwrap();
        let pulled = svc
            .pull(
                &who,
                PullPayload {
                    reference: None,
                    type_: BlobType::Layer,
                    digest: Some(digest),
                    offset: Some(4),
                },
            )
            .await;
        let Err(err) = pulled else {
            panic!("offset past the end was accepted");
        };
        assert!(matches!(err, ServiceError::InvalidParameter(ref p) if p.name == "offset"));
    }

    #[tokio::test]
    async fn empty_blob_completes_with_an_empty_range() {
        let (_dir, svc) = service().await;
        let who = test_principal();
        let digest = sha(b"");
        let out = svc
            .push(
                &who,
                push(BlobType::Config, Some(digest.clone()), Some(0), Some(0)),
                once_stream(Vec::new()),
            )
            .await
            .unwrap();
        assert!(out.complete);
        let st = svc.status(&who, "demo/app:1.0", &digest).await.unwrap();
        assert_eq!((st.status, st.available), (PushState::Exists, 0));
    }
}
