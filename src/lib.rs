// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! vidqueue - single-worker media download queue library
//!
//! Requests come in over HTTP, wait in a FIFO, and are downloaded one at a
//! time by a single background worker that shells out to yt-dlp.
//!
//! **HTTP API** -> **QueueStore** -> **Worker** -> **yt-dlp**
//!
//! # Core Modules
//!
//! - [`queue`] - Job model, queue store, worker and status projection
//! - [`fetch`] - The download collaborator seam and the yt-dlp implementation
//! - [`server`] - HTTP server over the queue
//! - [`client`] - HTTP client and the polling observer
//! - [`config`] - Configuration file handling
//! - [`errors`] - HTTP error responses with reference codes
//! - [`error`] - Queue error taxonomy and CLI error formatting

pub mod client;
pub mod config;
pub mod error;
pub mod errors;
pub mod fetch;
pub mod queue;
pub mod server;
pub mod utils;

pub use client::{ClientError, QueueClient};
pub use config::Config;
pub use error::QueueError;
pub use fetch::{FetchError, FetchOutput, FetchRequest, Fetcher, YtDlpFetcher};
pub use queue::{
    DownloadJob, DownloadType, JobStatus, NewJob, QueueManager, QueueOptions, QueueStore,
    StatusSnapshot,
};
pub use server::Server;
