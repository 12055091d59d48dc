// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP client for a running vidqueue server.
//!
//! Used by the CLI subcommands and by the polling observer in [`watch`].
//!
//! # Example
//!
//! ```no_run
//! use vidqueue::client::QueueClient;
//! use vidqueue::queue::NewJob;
//!
//! # async fn example() -> Result<(), vidqueue::client::ClientError> {
//! let client = QueueClient::new("http://127.0.0.1:8000");
//! let added = client.add(&NewJob::new("https://example.com/watch?v=1")).await?;
//! println!("queued at position {}", added.queue_position);
//! # Ok(())
//! # }
//! ```

pub mod watch;

use std::time::Duration;

use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::queue::{NewJob, StatusSnapshot};
use crate::server::{
    AddToQueueResponse, ClearResponse, DownloadResponse, FileEntry, FilesResponse, HealthResponse,
    RemoveResponse, StatusResponse,
};

/// Default server URL.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";

/// Timeout for connection establishment (in seconds).
const CONNECTION_TIMEOUT_SECS: u64 = 5;

/// Timeout for quick queue calls (in seconds). Direct downloads have none.
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Client-side failures.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server could not be reached. Retry with backoff.
    #[error("cannot reach vidqueue server at {url}: {source}")]
    Connectivity {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with `success: false`.
    #[error("{message}")]
    Rejected {
        status: u16,
        message: String,
        reference: Option<String>,
        output: Option<String>,
    },

    /// The server answered with something that is not a vidqueue payload.
    #[error("unexpected response from server: {0}")]
    InvalidResponse(String),

    /// The configured server URL cannot carry an API path.
    #[error("invalid server URL {0}")]
    InvalidUrl(String),
}

impl ClientError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, ClientError::Connectivity { .. })
    }
}

/// Error body sent by the server.
#[derive(Debug, Deserialize)]
struct RejectBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    output: Option<String>,
}

/// Client for the vidqueue HTTP API.
#[derive(Debug, Clone)]
pub struct QueueClient {
    base_url: String,
    client: reqwest::Client,
}

impl Default for QueueClient {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_URL)
    }
}

impl QueueClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECTION_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        self.call(Method::GET, &["health"], None::<&()>, true).await
    }

    /// Run one download on the server and wait for it to finish.
    pub async fn download(&self, job: &NewJob) -> Result<DownloadResponse, ClientError> {
        self.call(Method::POST, &["download"], Some(job), false).await
    }

    pub async fn add(&self, job: &NewJob) -> Result<AddToQueueResponse, ClientError> {
        self.call(Method::POST, &["add-to-queue"], Some(job), true).await
    }

    pub async fn remove(&self, id: &str) -> Result<RemoveResponse, ClientError> {
        self.call(Method::DELETE, &["remove-from-queue", id], None::<&()>, true)
            .await
    }

    pub async fn clear_queue(&self) -> Result<ClearResponse, ClientError> {
        self.call(Method::POST, &["clear-queue"], None::<&()>, true).await
    }

    pub async fn clear_history(&self) -> Result<ClearResponse, ClientError> {
        self.call(Method::POST, &["clear-history"], None::<&()>, true).await
    }

    pub async fn status(&self) -> Result<StatusSnapshot, ClientError> {
        let response: StatusResponse = self
            .call(Method::GET, &["queue-status"], None::<&()>, true)
            .await?;
        Ok(response.status)
    }

    pub async fn files(&self) -> Result<Vec<FileEntry>, ClientError> {
        let response: FilesResponse = self
            .call(Method::GET, &["downloads"], None::<&()>, true)
            .await?;
        Ok(response.files)
    }

    /// API URL for `segments`, each one percent-encoded as a single path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let invalid = || ClientError::InvalidUrl(self.base_url.clone());
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn call<B, T>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
        bounded: bool,
    ) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        if bounded {
            request = request.timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS));
        }

        let response = request.send().await.map_err(|source| ClientError::Connectivity {
            url: self.base_url.clone(),
            source,
        })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|source| ClientError::Connectivity {
            url: self.base_url.clone(),
            source,
        })?;

        if !status.is_success() {
            return Err(rejection(status, &bytes));
        }

        serde_json::from_slice(&bytes).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }
}

fn rejection(status: StatusCode, bytes: &[u8]) -> ClientError {
    match serde_json::from_slice::<RejectBody>(bytes) {
        Ok(body) => ClientError::Rejected {
            status: status.as_u16(),
            message: body
                .error
                .unwrap_or_else(|| format!("server returned {}", status)),
            reference: body.reference,
            output: body.output,
        },
        Err(_) => ClientError::Rejected {
            status: status.as_u16(),
            message: format!("server returned {}", status),
            reference: None,
            output: None,
        },
    }
}
