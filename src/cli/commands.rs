use super::{
    ArtifactCommand, AspectCommand, Command, MetadataCommand, PackageCommand, ServiceCommand,
    builders::{PushFlags, build_upload_chunk, parse_i64, parse_json, parse_uuid},
};
use crate::{
    client::ApiClient,
    models::{
        artifact::{TUS_CHUNK_CONTENT_TYPE, TUS_VERSION, UploadPayload},
        package::{BlobType, DIGEST_PREFIX, PushState},
        service::ServiceDescriptionT,
    },
    services::ByteStream,
    views::View,
};
use anyhow::{Context, Result, bail};
use futures::StreamExt;
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom},
};
use tokio_util::io::ReaderStream;
use tracing::info;

pub const DEFAULT_CHUNK_SIZE: i64 = 5 * 1024 * 1024;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn chunk_size(value: Option<&str>) -> Result<i64> {
    let size = parse_i64("chunk-size", value)?.unwrap_or(DEFAULT_CHUNK_SIZE);
    if size <= 0 {
        bail!("chunk-size must be positive");
    }
    Ok(size)
}

/// `[start, end)` ranges covering `offset..total`.
fn chunk_ranges(offset: i64, total: i64, size: i64) -> Vec<(i64, i64)> {
    let mut ranges = Vec::new();
    let mut start = offset;
    while start < total {
        let end = (start + size).min(total);
        ranges.push((start, end));
        start = end;
    }
    ranges
}

/// Ranges for a blob push. Never empty, so an empty or fully staged blob
/// still gets one request for the server to verify the digest.
fn push_ranges(available: i64, total: i64, size: i64) -> Vec<(i64, i64)> {
    let ranges = chunk_ranges(available, total, size);
    if ranges.is_empty() {
        vec![(available.min(total), total)]
    } else {
        ranges
    }
}

async fn read_range(file: &mut File, start: i64, end: i64) -> Result<Vec<u8>> {
    file.seek(SeekFrom::Start(start as u64)).await?;
    let mut buf = vec![0u8; (end - start) as usize];
    file.read_exact(&mut buf).await?;
    Ok(buf)
}

async fn file_len(path: &Path) -> Result<i64> {
    let meta = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(meta.len() as i64)
}

async fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    let mut stream = ReaderStream::new(file);
    let mut hasher = Sha256::new();
    while let Some(chunk) = stream.next().await {
        hasher.update(&chunk?);
    }
    Ok(format!("{}{}", DIGEST_PREFIX, hex::encode(hasher.finalize())))
}

async fn write_stream(out: &Path, append: bool, mut stream: ByteStream) -> Result<u64> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(out)
        .await
        .with_context(|| format!("opening {}", out.display()))?;
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

async fn read_service_file(path: &Path) -> Result<ServiceDescriptionT> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Execute a client subcommand. `Serve` is handled by the binary.
pub async fn run_client(command: Command) -> Result<()> {
    match command {
        Command::Serve(_) => bail!("serve is not a client command"),
        Command::Artifact { conn, op } => {
            artifact(&ApiClient::new(&conn.url, conn.token)?, op).await
        }
        Command::Aspect { conn, op } => aspect(&ApiClient::new(&conn.url, conn.token)?, op).await,
        Command::Metadata { conn, op } => {
            metadata(&ApiClient::new(&conn.url, conn.token)?, op).await
        }
        Command::Package { conn, op } => {
            package(&ApiClient::new(&conn.url, conn.token)?, op).await
        }
        Command::Service { conn, op } => {
            service(&ApiClient::new(&conn.url, conn.token)?, op).await
        }
    }
}

async fn artifact(client: &ApiClient, op: ArtifactCommand) -> Result<()> {
    match op {
        ArtifactCommand::List(flags) => print_json(&client.list_artifacts(&flags.build()?).await?),
        ArtifactCommand::Read { id, view } => {
            let id = parse_uuid("id", &id)?;
            print_json(&client.read_artifact(&id, view.build()?).await?)
        }
        ArtifactCommand::Upload {
            file,
            flags,
            chunk_size: size,
            resume,
        } => upload(client, &file, flags.build()?, size.as_deref(), resume.as_deref()).await,
        ArtifactCommand::Status { id } => {
            let id = parse_uuid("id", &id)?;
            let status = client.artifact_upload_status(&id).await?;
            print_json(&json!({
                "id": id,
                "upload-offset": status.upload_offset,
                "upload-length": status.upload_length,
            }))
        }
        ArtifactCommand::Download { id, out } => {
            let id = parse_uuid("id", &id)?;
            let (meta, stream) = client.download_artifact(&id).await?;
            let written = write_stream(&out, false, stream).await?;
            print_json(&json!({
                "id": id,
                "path": out.display().to_string(),
                "bytes": written,
                "content-type": meta.content_type,
                "etag": meta.etag,
            }))
        }
    }
}

/// Single request without `--chunk-size`/`--resume`, TUS chunks otherwise.
async fn upload(
    client: &ApiClient,
    path: &Path,
    mut payload: UploadPayload,
    size: Option<&str>,
    resume: Option<&str>,
) -> Result<()> {
    let total = file_len(path).await?;

    if size.is_none() && resume.is_none() {
        let file = File::open(path).await?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let created = client.upload_artifact(&payload, body).await?;
        return print_json(&created.artifact);
    }

    let size = chunk_size(size)?;
    let (id, offset) = match resume {
        Some(id) => {
            let id = parse_uuid("resume", id)?;
            let status = client.artifact_upload_status(&id).await?;
            (id, status.upload_offset)
        }
        None => {
            payload.upload_length = Some(total);
            payload.tus_resumable = Some(TUS_VERSION.to_string());
            let created = client.upload_artifact(&payload, Vec::new()).await?;
            (created.artifact.id, created.upload_offset.unwrap_or(0))
        }
    };
    info!(%id, offset, total, "uploading in chunks");

    let mut file = File::open(path).await?;
    for (start, end) in chunk_ranges(offset, total, size) {
        let chunk = build_upload_chunk(
            &id,
            Some(&start.to_string()),
            Some(TUS_VERSION),
            Some(TUS_CHUNK_CONTENT_TYPE),
        )?;
        let data = read_range(&mut file, start, end).await?;
        let next = client.upload_artifact_chunk(&chunk, data).await?;
        if next != end {
            bail!("server acknowledged offset {} after sending up to {}", next, end);
        }
    }
    print_json(&client.read_artifact(&id, View::Default).await?)
}

async fn aspect(client: &ApiClient, op: AspectCommand) -> Result<()> {
    match op {
        AspectCommand::Create {
            flags,
            content,
            content_type,
        } => {
            let p = flags.build(content_type.as_deref(), parse_json("content", &content)?)?;
            print_json(&client.create_aspect(&p).await?)
        }
        AspectCommand::Update {
            flags,
            content,
            content_type,
        } => {
            let p = flags.build(content_type.as_deref(), parse_json("content", &content)?)?;
            print_json(&client.update_aspect(&p).await?)
        }
        AspectCommand::Retract { id } => {
            let id = parse_uuid("id", &id)?;
            client.retract_aspect(&id).await?;
            print_json(&json!({ "retracted": id }))
        }
        AspectCommand::Read { id } => {
            print_json(&client.read_aspect(&parse_uuid("id", &id)?).await?)
        }
        AspectCommand::List(flags) => print_json(&client.list_aspects(&flags.build()?).await?),
    }
}

async fn metadata(client: &ApiClient, op: MetadataCommand) -> Result<()> {
    match op {
        MetadataCommand::Add { flags, aspect } => {
            let p = flags.build(parse_json("aspect", &aspect)?)?;
            print_json(&client.add_metadata(&p).await?)
        }
        MetadataCommand::UpdateOne { flags, aspect } => {
            let p = flags.build(parse_json("aspect", &aspect)?)?;
            print_json(&client.update_one_metadata(&p).await?)
        }
        MetadataCommand::UpdateRecord { id, flags, aspect } => {
            let p = flags.build_update(&id, parse_json("aspect", &aspect)?)?;
            print_json(&client.update_metadata_record(&p).await?)
        }
        MetadataCommand::Revoke { id } => {
            let id = parse_uuid("id", &id)?;
            client.revoke_metadata(&id).await?;
            print_json(&json!({ "revoked": id }))
        }
        MetadataCommand::Read { id } => {
            print_json(&client.read_metadata(&parse_uuid("id", &id)?).await?)
        }
        MetadataCommand::List(flags) => print_json(&client.list_metadata(&flags.build()?).await?),
    }
}

async fn package(client: &ApiClient, op: PackageCommand) -> Result<()> {
    match op {
        PackageCommand::List(flags) => print_json(&client.list_packages(&flags.build()?).await?),
        PackageCommand::Pull { mut flags, out } => {
            let have = match tokio::fs::metadata(&out).await {
                Ok(meta) if flags.offset.is_none() => meta.len() as i64,
                _ => 0,
            };
            if flags.offset.is_none() && have > 0 {
                flags.offset = Some(have.to_string());
            }
            let p = flags.build()?;
            let append = p.offset.unwrap_or(0) > 0;
            let (range, stream) = client.pull_package(&p).await?;
            let written = write_stream(&out, append, stream).await?;
            print_json(&json!({
                "path": out.display().to_string(),
                "bytes": written,
                "total": range.total,
                "available": range.available,
            }))
        }
        PackageCommand::Push {
            tag,
            type_,
            file,
            chunk_size: size,
            force,
        } => push(client, tag, type_, &file, size.as_deref(), force).await,
        PackageCommand::Status(flags) => {
            let (tag, digest) = flags.build()?;
            print_json(&client.package_push_status(&tag, &digest).await?)
        }
        PackageCommand::Remove(flags) => {
            let tag = flags.build()?;
            client.remove_package(&tag).await?;
            print_json(&json!({ "removed": tag }))
        }
    }
}

/// Manifests go up in one request; blobs resume from what the server already holds.
async fn push(
    client: &ApiClient,
    tag: String,
    type_: String,
    path: &Path,
    size: Option<&str>,
    force: bool,
) -> Result<()> {
    let digest = sha256_file(path).await?;
    let mut flags = PushFlags {
        tag: Some(tag),
        type_: Some(type_),
        digest: Some(digest.clone()),
        force: force.then(|| "true".to_string()),
        start: None,
        end: None,
    };
    let payload = flags.build()?;

    if payload.type_ == BlobType::Manifest {
        let body = tokio::fs::read(path).await?;
        let outcome = client.push_package(&payload, body).await?;
        return print_json(&outcome.result);
    }

    let status = client.package_push_status(&payload.tag, &digest).await?;
    if status.status == PushState::Exists {
        return print_json(&json!({ "digest": digest, "status": status.status }));
    }

    let total = file_len(path).await?;
    let size = chunk_size(size)?;
    let mut file = File::open(path).await?;
    let mut complete = None;
    for (start, end) in push_ranges(status.available, total, size) {
        flags.start = Some(start.to_string());
        flags.end = Some(end.to_string());
        let data = read_range(&mut file, start, end).await?;
        let outcome = client.push_package(&flags.build()?, data).await?;
        info!(%digest, start, end, complete = outcome.complete, "pushed range");
        complete = outcome.complete.then_some(outcome.result);
    }
    match complete {
        Some(result) => print_json(&result),
        None => bail!("server did not accept {} as complete", digest),
    }
}

async fn service(client: &ApiClient, op: ServiceCommand) -> Result<()> {
    match op {
        ServiceCommand::List(flags) => print_json(&client.list_services(&flags.build()?).await?),
        ServiceCommand::Create { file } => {
            let desc = read_service_file(&file).await?;
            print_json(&client.create_service(&desc).await?)
        }
        ServiceCommand::Read { id, view } => {
            let id = parse_uuid("id", &id)?;
            print_json(&client.read_service(&id, view.build()?).await?)
        }
        ServiceCommand::Update { id, file, flags } => {
            let id = parse_uuid("id", &id)?;
            let desc = read_service_file(&file).await?;
            print_json(&client.update_service(&id, flags.build()?, &desc).await?)
        }
        ServiceCommand::Delete { id } => {
            let id = parse_uuid("id", &id)?;
            client.delete_service(&id).await?;
            print_json(&json!({ "deleted": id }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_cover_the_remainder() {
        assert_eq!(chunk_ranges(0, 10, 4), vec![(0, 4), (4, 8), (8, 10)]);
        assert_eq!(chunk_ranges(8, 10, 4), vec![(8, 10)]);
        assert!(chunk_ranges(10, 10, 4).is_empty());
    }

    #[test]
    fn push_ranges_send_one_request_for_empty_or_staged_blobs() {
        assert_eq!(push_ranges(0, 0, 4), vec![(0, 0)]);
        assert_eq!(push_ranges(10, 10, 4), vec![(10, 10)]);
        assert_eq!(push_ranges(4, 10, 4), vec![(4, 8), (8, 10)]);
    }

    #[test]
    fn chunk_size_defaults_and_rejects_zero() {
        assert_eq!(chunk_size(None).unwrap(), DEFAULT_CHUNK_SIZE);
        assert_eq!(chunk_size(Some("1024")).unwrap(), 1024);
        assert!(chunk_size(Some("0")).is_err());
        assert!(chunk_size(Some("big")).is_err());
    }

    #[tokio::test]
    async fn file_digest_matches_in_memory_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layer.tar");
        tokio::fs::write(&path, b"layer bytes").await.unwrap();
        let expected = format!("sha256:{}", hex::encode(Sha256::digest(b"layer bytes")));
        assert_eq!(sha256_file(&path).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn write_stream_appends_when_resuming() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("blob");
        let first = crate::services::once_stream(&b"abc"[..]);
        write_stream(&out, false, first).await.unwrap();
        let rest = crate::services::once_stream(&b"def"[..]);
        assert_eq!(write_stream(&out, true, rest).await.unwrap(), 3);
        assert_eq!(tokio::fs::read(&out).await.unwrap(), b"abcdef");
    }
}
