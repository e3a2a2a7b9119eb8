//! HTTP server for cached content.
//!
//! Serves every synced directory through a single parameterized route, so
//! no per-path registration is needed and paths discovered by a reload are
//! served immediately.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`/`POST` | `/reload` | Run a sync pass and return its summary |
//! | `GET`  | `/sync/status` | Report of the last completed sync pass |
//! | `GET`  | `/` | List cached directory paths |
//! | `GET`  | `/{*path}` | Aggregated content for one directory |
//!
//! Static routes take precedence, so a content directory named `health`,
//! `reload` or `sync` is shadowed.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "no cached content for 'about'" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `sync_in_progress` (409), `resolution_failed` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::models::{AggregatedContent, DirectoryPath};
use crate::sync::{SyncReport, Syncer, TrySyncError};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    syncer: Arc<Syncer>,
}

/// Starts the HTTP server.
///
/// When `server.sync_on_start` is set, the initial sync pass completes
/// before the listener is bound. A resolution failure at that point is
/// logged and the server still starts with whatever the cache holds.
pub async fn run_server(config: &Config, syncer: Arc<Syncer>) -> anyhow::Result<()> {
    if config.server.sync_on_start {
        match syncer.run_sync().await {
            Ok(report) => info!("{}", report.summary()),
            Err(e) => warn!(error = %e, "initial sync failed; serving existing cache"),
        }
    }

    let app = router(syncer);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("content server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router. Exposed for in-process tests.
pub fn router(syncer: Arc<Syncer>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/reload", get(handle_reload).post(handle_reload))
        .route("/sync/status", get(handle_sync_status))
        .route("/", get(handle_list))
        .route("/{*path}", get(handle_content))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { syncer })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn internal(err: anyhow::Error) -> AppError {
    AppError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal",
        format!("{:#}", err),
    )
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ /reload ============

/// Runs a sync pass and answers with its one-line summary once every
/// directory has been attempted.
async fn handle_reload(State(state): State<AppState>) -> Result<String, AppError> {
    match state.syncer.try_run_sync().await {
        Ok(report) => Ok(report.summary()),
        Err(TrySyncError::Busy) => Err(AppError::new(
            StatusCode::CONFLICT,
            "sync_in_progress",
            "a sync pass is already in progress",
        )),
        Err(TrySyncError::Failed(e)) => Err(AppError::new(
            StatusCode::BAD_GATEWAY,
            "resolution_failed",
            e.to_string(),
        )),
    }
}

// ============ GET /sync/status ============

async fn handle_sync_status(State(state): State<AppState>) -> Result<Json<SyncReport>, AppError> {
    state
        .syncer
        .last_report()
        .map(Json)
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, "not_found", "no sync has completed yet"))
}

// ============ GET / ============

#[derive(Serialize)]
struct ListResponse {
    paths: Vec<DirectoryPath>,
}

async fn handle_list(State(state): State<AppState>) -> Result<Json<ListResponse>, AppError> {
    let paths = state.syncer.cache().list().await.map_err(internal)?;
    Ok(Json(ListResponse { paths }))
}

// ============ GET /{*path} ============

async fn handle_content(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<AggregatedContent>, AppError> {
    let path = DirectoryPath::parse(&raw)
        .map_err(|e| AppError::new(StatusCode::BAD_REQUEST, "bad_request", e.to_string()))?;

    state
        .syncer
        .cache()
        .read(&path)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or_else(|| {
            AppError::new(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("no cached content for '{}'", path),
            )
        })
}
