//! On-disk payload storage shared by artifacts and packages.
//!
//! Payloads live under `base_path/{namespace}/{shard}/{shard}/{key}` where the
//! shards are the first two bytes of `md5(namespace/key)`. Whole-body writes
//! go to a temp file that is fsynced and renamed into place; ranged writes
//! append to the final file at a checked offset. Callers that read a
//! committed offset and then append must hold [`BlobStore::lock`] for the key
//! across both steps.

use crate::errors::{ServiceError, ServiceResult};
use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use sha2::{Digest, Sha256};
use std::{
    collections::HashMap,
    io::{self, ErrorKind, SeekFrom},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
    sync::{Mutex as AsyncMutex, OwnedMutexGuard},
};
use tracing::debug;
use uuid::Uuid;

const HASH_BUF_SIZE: usize = 64 * 1024;

/// Size and md5 of a completed whole-body write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub size: i64,
    pub md5: String,
}

type KeyLocks = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Clones share the same directory and the same per-key locks.
#[derive(Debug, Clone)]
pub struct BlobStore {
    base_path: PathBuf,
    locks: KeyLocks,
}

impl BlobStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            locks: KeyLocks::default(),
        }
    }

    /// Exclusive access to one payload until the guard is dropped.
    pub async fn lock(&self, namespace: &str, key: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // idle entries are only referenced by the map itself
            locks.retain(|_, m| Arc::strong_count(m) > 1);
            locks
                .entry(format!("{}/{}", namespace, key))
                .or_default()
                .clone()
        };
        entry.lock_owned().await
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn namespace_root(&self, namespace: &str) -> PathBuf {
        self.base_path.join(namespace)
    }

    fn shards(namespace: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", namespace, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Physical path of a payload; parent directories may not exist yet.
    pub fn path(&self, namespace: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::shards(namespace, key);
        let mut path = self.namespace_root(namespace);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key.replace(':', "_"));
        path
    }

    async fn ensure_parent(path: &Path) -> ServiceResult<PathBuf> {
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| ServiceError::internal("blob path missing parent directory"))?;
        fs::create_dir_all(&parent).await?;
        Ok(parent)
    }

    /// Stream a whole payload into place, replacing any previous one.
    pub async fn write_stream<S>(
        &self,
        namespace: &str,
        key: &str,
        stream: S,
    ) -> ServiceResult<WriteSummary>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let file_path = self.path(namespace, key);
        let parent = Self::ensure_parent(&file_path).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size: i64 = 0;
        let mut digest = md5::Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(ServiceError::bad_request(format!("reading body: {}", err)));
                }
            };
            size += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err.into());
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err.into());
            }
        }

        Ok(WriteSummary {
            size,
            md5: format!("{:x}", digest.compute()),
        })
    }

    /// Append a chunk at `offset`, which must equal the current length.
    ///
    /// At most `limit` bytes are accepted; a longer body is rolled back and
    /// reported as `invalid-parameter` on `limit_name`. Returns the bytes written.
    pub async fn write_at<S>(
        &self,
        namespace: &str,
        key: &str,
        offset: i64,
        limit: Option<i64>,
        limit_name: &str,
        stream: S,
    ) -> ServiceResult<i64>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let file_path = self.path(namespace, key);
        Self::ensure_parent(&file_path).await?;
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&file_path)
            .await?;

        let current = file.metadata().await?.len() as i64;
        if current != offset {
            return Err(ServiceError::invalid_parameter(
                "offset",
                Some(&offset.to_string()),
                format!("expected offset {}", current),
            ));
        }
        file.seek(SeekFrom::Start(offset as u64)).await?;

        let mut written: i64 = 0;
        let mut failure: Option<ServiceError> = None;
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    failure = Some(ServiceError::bad_request(format!("reading body: {}", err)));
                    break;
                }
            };
            if limit.is_some_and(|l| written + chunk.len() as i64 > l) {
                failure = Some(ServiceError::invalid_parameter(
                    limit_name,
                    None,
                    "chunk exceeds the declared length",
                ));
                break;
            }
            if let Err(err) = file.write_all(&chunk).await {
                failure = Some(err.into());
                break;
            }
            written += chunk.len() as i64;
        }

        if let Some(err) = failure {
            file.set_len(offset as u64).await?;
            return Err(err);
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }

    /// Cut a payload back to `len` bytes.
    pub async fn truncate(&self, namespace: &str, key: &str, len: i64) -> ServiceResult<()> {
        let file = OpenOptions::new()
            .write(true)
            .open(self.path(namespace, key))
            .await?;
        file.set_len(len as u64).await?;
        Ok(())
    }

    /// Current length of a payload, `None` when it does not exist.
    pub async fn len(&self, namespace: &str, key: &str) -> ServiceResult<Option<i64>> {
        match fs::metadata(self.path(namespace, key)).await {
            Ok(meta) => Ok(Some(meta.len() as i64)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Open a payload positioned at `offset`.
    pub async fn open_at(
        &self,
        namespace: &str,
        key: &str,
        offset: i64,
    ) -> ServiceResult<Option<File>> {
        let mut file = match File::open(self.path(namespace, key)).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if offset > 0 {
            file.seek(SeekFrom::Start(offset as u64)).await?;
        }
        Ok(Some(file))
    }

    pub async fn md5_hex(&self, namespace: &str, key: &str) -> ServiceResult<String> {
        let mut ctx = md5::Context::new();
        self.read_all(namespace, key, |chunk| ctx.consume(chunk)).await?;
        Ok(format!("{:x}", ctx.compute()))
    }

    /// `sha256:<hex>` of a payload.
    pub async fn sha256_digest(&self, namespace: &str, key: &str) -> ServiceResult<String> {
        let mut hasher = Sha256::new();
        self.read_all(namespace, key, |chunk| hasher.update(chunk))
            .await?;
        Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
    }

    async fn read_all(
        &self,
        namespace: &str,
        key: &str,
        mut f: impl FnMut(&[u8]),
    ) -> ServiceResult<()> {
        let mut file = File::open(self.path(namespace, key)).await?;
        let mut buf = vec![0u8; HASH_BUF_SIZE];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            f(&buf[..n]);
        }
        Ok(())
    }

    /// Move a payload from one namespace/key to another.
    pub async fn promote(
        &self,
        from_ns: &str,
        from_key: &str,
        to_ns: &str,
        to_key: &str,
    ) -> ServiceResult<()> {
        let from = self.path(from_ns, from_key);
        let to = self.path(to_ns, to_key);
        Self::ensure_parent(&to).await?;
        fs::rename(&from, &to).await?;
        if let Some(parent) = from.parent() {
            self.prune_empty_dirs(parent, &self.namespace_root(from_ns))
                .await;
        }
        Ok(())
    }

    /// Remove a payload best-effort and prune empty shard directories.
    pub async fn remove(&self, namespace: &str, key: &str) -> ServiceResult<()> {
        let file_path = self.path(namespace, key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed blob {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("blob {} already missing", file_path.display());
            }
            Err(err) => return Err(err.into()),
        }
        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.namespace_root(namespace))
                .await;
        }
        Ok(())
    }

    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::once_stream;
    use std::time::Duration;

    fn store() -> (tempfile::TempDir, BlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn write_stream_reports_size_and_md5() {
        let (_dir, store) = store();
        let summary = store
            .write_stream("artifacts", "a1", once_stream(&b"hello"[..]))
            .await
            .unwrap();
        assert_eq!(summary.size, 5);
        assert_eq!(summary.md5, "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(store.len("artifacts", "a1").await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn write_at_requires_matching_offset() {
        let (_dir, store) = store();
        store
            .write_at("up", "k", 0, None, "End", once_stream(&b"abc"[..]))
            .await
            .unwrap();
        let err = store
            .write_at("up", "k", 1, None, "End", once_stream(&b"x"[..]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidParameter(_)));
        let n = store
            .write_at("up", "k", 3, None, "End", once_stream(&b"def"[..]))
            .await
            .unwrap();
        assert_eq!(n, 3);
        let expected = format!("{:x}", md5::compute("abcdef"));
        assert_eq!(store.md5_hex("up", "k").await.unwrap(), expected);
    }

    #[tokio::test]
    async fn write_at_rolls_back_oversized_chunks() {
        let (_dir, store) = store();
        store
            .write_at("up", "k", 0, None, "End", once_stream(&b"ab"[..]))
            .await
            .unwrap();
        let err = store
            .write_at("up", "k", 2, Some(2), "Upload-Length", once_stream(&b"cde"[..]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidParameter(ref p) if p.name == "Upload-Length"));
        assert_eq!(store.len("up", "k").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn sha256_digest_format() {
        let (_dir, store) = store();
        store
            .write_stream("blobs", "x", once_stream(&b""[..]))
            .await
            .unwrap();
        assert_eq!(
            store.sha256_digest("blobs", "x").await.unwrap(),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn promote_moves_and_prunes() {
        let (_dir, store) = store();
        store
            .write_stream("uploads", "d", once_stream(&b"data"[..]))
            .await
            .unwrap();
        let staged_parent = store.path("uploads", "d").parent().unwrap().to_path_buf();
        store.promote("uploads", "d", "blobs", "d").await.unwrap();
        assert_eq!(store.len("uploads", "d").await.unwrap(), None);
        assert_eq!(store.len("blobs", "d").await.unwrap(), Some(4));
        assert!(!staged_parent.exists());
    }

    #[tokio::test]
    async fn lock_is_exclusive_per_key_and_shared_by_clones() {
        let (_dir, blobs) = store();
        let other = blobs.clone();

        let held = blobs.lock("ns", "a").await;
        assert!(
            tokio::time::timeout(Duration::from_millis(20), other.lock("ns", "a"))
                .await
                .is_err()
        );
        // a different key is independent
        let _b = other.lock("ns", "b").await;

        drop(held);
        let _again = tokio::time::timeout(Duration::from_millis(200), other.lock("ns", "a"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn open_at_missing_is_none() {
        let (_dir, store) = store();
        assert!(store.open_at("blobs", "nope", 0).await.unwrap().is_none());
    }
}
