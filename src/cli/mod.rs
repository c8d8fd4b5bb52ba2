//! Command line: `serve`, plus one client subcommand group per resource.

pub mod builders;
mod commands;

pub use commands::run_client;

use crate::config::{ClientArgs, ServeArgs};
use builders::{
    AspectListFlags, AspectWriteFlags, ForceCreateFlags, ListFlags, MetadataListFlags,
    MetadataWriteFlags, PackageListFlags, PullFlags, PushStatusFlags, TagFlags, UploadFlags,
    ViewFlags,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "IVCAP platform API: server and client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP server
    Serve(ServeArgs),
    /// Artifacts: upload, status and download
    Artifact {
        #[command(flatten)]
        conn: ClientArgs,
        #[command(subcommand)]
        op: ArtifactCommand,
    },
    /// Aspects attached to entities
    Aspect {
        #[command(flatten)]
        conn: ClientArgs,
        #[command(subcommand)]
        op: AspectCommand,
    },
    /// Metadata records
    Metadata {
        #[command(flatten)]
        conn: ClientArgs,
        #[command(subcommand)]
        op: MetadataCommand,
    },
    /// Package manifests and blobs
    Package {
        #[command(flatten)]
        conn: ClientArgs,
        #[command(subcommand)]
        op: PackageCommand,
    },
    /// Service descriptions
    Service {
        #[command(flatten)]
        conn: ClientArgs,
        #[command(subcommand)]
        op: ServiceCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum ArtifactCommand {
    List(ListFlags),
    Read {
        id: String,
        #[command(flatten)]
        view: ViewFlags,
    },
    /// Upload a file, in one request or as resumable TUS chunks
    Upload {
        #[arg(long)]
        file: PathBuf,
        #[command(flatten)]
        flags: UploadFlags,
        /// Send the file in chunks of this many bytes
        #[arg(long)]
        chunk_size: Option<String>,
        /// Continue a chunked upload of this artifact id
        #[arg(long)]
        resume: Option<String>,
    },
    /// Show the TUS offset of an upload
    Status { id: String },
    Download {
        id: String,
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum AspectCommand {
    Create {
        #[command(flatten)]
        flags: AspectWriteFlags,
        /// Aspect content as a JSON object
        #[arg(long)]
        content: String,
        #[arg(long)]
        content_type: Option<String>,
    },
    Update {
        #[command(flatten)]
        flags: AspectWriteFlags,
        #[arg(long)]
        content: String,
        #[arg(long)]
        content_type: Option<String>,
    },
    Retract { id: String },
    Read { id: String },
    List(AspectListFlags),
}

#[derive(Subcommand, Debug)]
pub enum MetadataCommand {
    Add {
        #[command(flatten)]
        flags: MetadataWriteFlags,
        /// Aspect as a JSON object
        #[arg(long)]
        aspect: String,
    },
    UpdateOne {
        #[command(flatten)]
        flags: MetadataWriteFlags,
        #[arg(long)]
        aspect: String,
    },
    UpdateRecord {
        id: String,
        #[command(flatten)]
        flags: MetadataWriteFlags,
        #[arg(long)]
        aspect: String,
    },
    Revoke { id: String },
    Read { id: String },
    List(MetadataListFlags),
}

#[derive(Subcommand, Debug)]
pub enum PackageCommand {
    List(PackageListFlags),
    /// Download into `--out`, resuming from its current length
    Pull {
        #[command(flatten)]
        flags: PullFlags,
        #[arg(long)]
        out: PathBuf,
    },
    /// Push a manifest, or a config/layer blob in resumable ranges
    Push {
        #[arg(long)]
        tag: String,
        #[arg(long = "type")]
        type_: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        chunk_size: Option<String>,
        /// Move an existing tag to this manifest
        #[arg(long)]
        force: bool,
    },
    Status(PushStatusFlags),
    Remove(TagFlags),
}

#[derive(Subcommand, Debug)]
pub enum ServiceCommand {
    List(ListFlags),
    /// Register the service described by a JSON file
    Create {
        #[arg(long)]
        file: PathBuf,
    },
    Read {
        id: String,
        #[command(flatten)]
        view: ViewFlags,
    },
    Update {
        id: String,
        #[arg(long)]
        file: PathBuf,
        #[command(flatten)]
        flags: ForceCreateFlags,
    },
    Delete { id: String },
}
