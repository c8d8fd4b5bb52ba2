use anyhow::Result;
use clap::Parser;
use ivcap_api::{
    auth::JwtAuthorizer,
    cli::{Cli, Command, run_client},
    config::{ServeArgs, ServerConfig},
    db, routes,
    state::AppState,
};
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args).await,
        other => run_client(other).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let (cfg, migrate) = ServerConfig::from_env_and_args(args)?;
    tracing::info!(
        host = %cfg.host,
        port = cfg.port,
        storage_dir = %cfg.storage_dir,
        database_url = %cfg.database_url,
        public_url = %cfg.public_url,
        "starting ivcap-api"
    );

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Ensure the database directory exists ---
    if !cfg.database_url.contains(":memory:") {
        let db_path = cfg
            .database_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:")
            .trim_start_matches("file:");
        let db_path = db_path.split('?').next().unwrap_or(db_path);
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
    }

    let db = db::connect(&cfg.database_url).await?;

    // --- Migrations (idempotent schema) ---
    db::run_migrations(&db).await?;
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(());
    }

    let auth = Arc::new(JwtAuthorizer::hs256(&cfg.jwt_secret));
    let state = AppState::new(db, &cfg.storage_dir, &cfg.public_url, auth);
    let app = routes::app(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
