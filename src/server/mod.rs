// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! API server
//!
//! Thin HTTP layer over [`QueueManager`]. Handlers only translate between
//! JSON and queue operations; all queue rules live in [`crate::queue`].
//!
//! # Endpoints
//!
//! - `POST /download` - Run one download now, outside the queue
//! - `POST /add-to-queue` - Queue a download
//! - `DELETE /remove-from-queue/:id` - Drop a pending job
//! - `POST /clear-queue` - Drop all pending jobs
//! - `POST /clear-history` - Forget finished jobs
//! - `GET /queue-status` - Queue snapshot for pollers
//! - `GET /downloads` - Files in the download directory
//! - `GET /health` - Health check
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vidqueue::fetch::YtDlpFetcher;
//! use vidqueue::queue::{QueueManager, QueueOptions};
//! use vidqueue::server::Server;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let manager = Arc::new(QueueManager::start(
//!     QueueOptions::default(),
//!     Arc::new(YtDlpFetcher::default()),
//! ));
//! Server::new(manager, 8000).start().await?;
//! # Ok(())
//! # }
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path as UrlPath, State},
    response::Json,
    routing::{delete, get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::errors::{ApiError, ApiResult};
use crate::queue::{NewJob, QueueManager, StatusSnapshot};
use crate::utils::MAX_PAYLOAD_BYTES;

/// Server state shared across handlers.
pub struct AppState {
    pub manager: Arc<QueueManager>,
    /// Directory listed by `GET /downloads`.
    pub download_dir: PathBuf,
}

/// API server configuration.
pub struct Server {
    port: u16,
    /// Address to bind to (defaults to 127.0.0.1).
    bind_address: IpAddr,
    download_dir: PathBuf,
    manager: Arc<QueueManager>,
}

impl Server {
    /// Create a server for `manager`, bound to localhost.
    pub fn new(manager: Arc<QueueManager>, port: u16) -> Self {
        Self {
            port,
            bind_address: IpAddr::from([127, 0, 0, 1]),
            download_dir: PathBuf::from("downloads"),
            manager,
        }
    }

    /// Set the bind address.
    /// Use 0.0.0.0 to allow network access, 127.0.0.1 (default) for localhost only.
    pub fn with_bind_address(mut self, addr: IpAddr) -> Self {
        self.bind_address = addr;
        self
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    /// Build the router with all routes.
    pub fn build_router(&self) -> Router {
        router(Arc::new(AppState {
            manager: self.manager.clone(),
            download_dir: self.download_dir.clone(),
        }))
    }

    /// Serve until SIGINT/SIGTERM, then stop the worker.
    pub async fn start(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .with_context(|| {
                format!("Failed to create download directory {}", self.download_dir.display())
            })?;

        let router = self.build_router();
        let addr = SocketAddr::new(self.bind_address, self.port);

        tracing::info!(
            download_dir = %self.download_dir.display(),
            "Starting server on {}",
            addr
        );

        if self.bind_address.is_unspecified() {
            tracing::warn!(
                "Server is binding to {} which exposes the API to the network. \
                Use 127.0.0.1 (default) for local-only access.",
                self.bind_address
            );
        }

        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                anyhow::anyhow!(
                    "Port {} is already in use. \
                    This usually means another vidqueue server is running. \
                    Stop it or pick a different port with: vidqueue serve --port <PORT>",
                    self.port
                )
            } else {
                anyhow::anyhow!("Failed to bind to {}: {}", addr, e)
            }
        })?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Waiting for the current download to finish");
        self.manager.shutdown().await;
        tracing::info!("Cleanup complete, server stopped");
        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn bind_address(&self) -> IpAddr {
        self.bind_address
    }
}

/// All API routes over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/download", post(download_handler))
        .route("/add-to-queue", post(add_to_queue_handler))
        .route("/remove-from-queue/:id", delete(remove_handler))
        .route("/clear-queue", post(clear_queue_handler))
        .route("/clear-history", post(clear_history_handler))
        .route("/queue-status", get(status_handler))
        .route("/downloads", get(downloads_handler))
        .layer(DefaultBodyLimit::max(MAX_PAYLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DownloadResponse {
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AddToQueueResponse {
    pub success: bool,
    pub id: String,
    pub queue_position: usize,
    pub title: String,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RemoveResponse {
    pub success: bool,
    pub removed: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClearResponse {
    pub success: bool,
    pub removed_count: usize,
    #[serde(default)]
    pub message: String,
}

/// `GET /queue-status` body: the snapshot plus a success flag.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(flatten)]
    pub status: StatusSnapshot,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FilesResponse {
    pub success: bool,
    pub files: Vec<FileEntry>,
}

// =============================================================================
// Handlers
// =============================================================================

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Direct download. Blocks the request until the collaborator finishes.
async fn download_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewJob>, JsonRejection>,
) -> ApiResult<Json<DownloadResponse>> {
    let Json(request) = body?;
    let out = state.manager.download_now(request).await?;

    Ok(Json(DownloadResponse {
        success: true,
        output: out.output,
        destination: out.destination,
    }))
}

async fn add_to_queue_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewJob>, JsonRejection>,
) -> ApiResult<Json<AddToQueueResponse>> {
    let Json(request) = body?;
    let job = state.manager.enqueue(request).await?;

    Ok(Json(AddToQueueResponse {
        success: true,
        message: format!("Added \"{}\" to queue at position {}", job.title, job.position),
        id: job.id,
        queue_position: job.position,
        title: job.title,
    }))
}

/// Unknown or non-pending ids are a no-op, not an error.
async fn remove_handler(
    State(state): State<Arc<AppState>>,
    UrlPath(id): UrlPath<String>,
) -> Json<RemoveResponse> {
    let removed = state.manager.remove(&id);
    Json(RemoveResponse {
        success: true,
        removed,
    })
}

async fn clear_queue_handler(State(state): State<Arc<AppState>>) -> Json<ClearResponse> {
    let removed_count = state.manager.clear_pending();
    Json(ClearResponse {
        success: true,
        removed_count,
        message: format!("Removed {} pending job(s)", removed_count),
    })
}

async fn clear_history_handler(State(state): State<Arc<AppState>>) -> Json<ClearResponse> {
    let removed_count = state.manager.clear_history();
    Json(ClearResponse {
        success: true,
        removed_count,
        message: format!("Removed {} finished job(s)", removed_count),
    })
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let status = state.manager.status();
    tracing::debug!(
        queue_length = status.queue_length,
        is_processing = status.is_processing,
        "Status polled"
    );
    Json(StatusResponse {
        success: true,
        status,
    })
}

async fn downloads_handler(State(state): State<Arc<AppState>>) -> ApiResult<Json<FilesResponse>> {
    let files = list_files(&state.download_dir).await?;
    Ok(Json(FilesResponse {
        success: true,
        files,
    }))
}

/// Regular files in `dir`, newest first. A missing directory is empty.
pub async fn list_files(dir: &Path) -> std::io::Result<Vec<FileEntry>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        files.push(FileEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            size: metadata.len(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        });
    }

    files.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));
    Ok(files)
}

/// Graceful shutdown signal handler.
///
/// Waits for SIGINT/SIGTERM. The worker is stopped after the server drains.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt())
            .expect("failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown...");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
        tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
    }
}
