//! Health & readiness handlers.
//!
//! - GET /healthz  -> liveness ("ok")
//! - GET /readyz   -> readiness that checks SQLite and disk I/O

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::fs;
use uuid::Uuid;

/// `GET /healthz`
///
/// Never touches storage.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Runs `SELECT 1` against SQLite and a write/read/delete round trip under
/// the storage directory. 200 when both pass, 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let sqlite = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&state.db)
        .await
    {
        Ok(1) => CheckStatus::passed(),
        Ok(v) => CheckStatus::failed(format!("unexpected result: {}", v)),
        Err(e) => CheckStatus::failed(format!("error: {}", e)),
    };

    let disk = disk_check(&state).await;
    let ready = sqlite.ok && disk.ok;
    if !ready {
        tracing::warn!(sqlite = sqlite.ok, disk = disk.ok, "readiness check failed");
    }

    let mut checks = BTreeMap::new();
    checks.insert("sqlite", sqlite);
    checks.insert("disk", disk);

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadyResponse {
            status: if ready { "ok" } else { "error" },
            checks,
        }),
    )
}

async fn disk_check(state: &AppState) -> CheckStatus {
    if let Err(e) = fs::create_dir_all(&state.base_path).await {
        return CheckStatus::failed(format!("could not create storage dir: {}", e));
    }
    let probe = state.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
    if let Err(e) = fs::write(&probe, b"readyz").await {
        return CheckStatus::failed(format!("could not write probe file: {}", e));
    }
    let read = fs::read(&probe).await;
    let removed = fs::remove_file(&probe).await;
    match (read, removed) {
        (Ok(bytes), _) if bytes != b"readyz" => CheckStatus::failed("probe content mismatch"),
        (Ok(_), Ok(())) => CheckStatus::passed(),
        (Ok(_), Err(e)) => CheckStatus::failed(format!("could not remove probe file: {}", e)),
        (Err(e), _) => CheckStatus::failed(format!("could not read probe file: {}", e)),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    checks: BTreeMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl CheckStatus {
    fn passed() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}
