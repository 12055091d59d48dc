// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Single-worker download queue.
//!
//! This module provides:
//! - A FIFO of pending jobs with removal and clearing
//! - Exactly one worker that runs at most one job at a time
//! - A bounded history of finished jobs
//! - A side-effect free status view for pollers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐  enqueue/remove/   ┌─────────────────┐
//! │ HTTP handlers   │───clear/status────▶│ QueueManager    │
//! └─────────────────┘                    └────────┬────────┘
//!                                                 │ RwLock
//!          ┌──────────────────────────────────────┤
//!          ▼                                      ▼
//! ┌─────────────────┐  dequeue_next /    ┌─────────────────┐
//! │ Worker (tokio)  │──record_result────▶│ QueueStore      │
//! └────────┬────────┘                    └─────────────────┘
//!          │ lock released while running
//!          ▼
//! ┌─────────────────┐
//! │ Fetcher (yt-dlp)│
//! └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vidqueue::fetch::YtDlpFetcher;
//! use vidqueue::queue::{NewJob, QueueManager, QueueOptions};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let manager = QueueManager::start(QueueOptions::default(), Arc::new(YtDlpFetcher::default()));
//!
//! let job = manager.enqueue(NewJob::new("https://example.com/watch?v=1")).await?;
//! println!("queued {} at position {}", job.id, job.position);
//!
//! let status = manager.status();
//! println!("processing: {}", status.is_processing);
//! # Ok(())
//! # }
//! ```

pub mod locks;
pub mod status;
pub mod store;
pub mod types;
pub mod worker;

pub use status::{diff, project, StatusChange, StatusSnapshot};
pub use store::{QueueSnapshot, QueueStore, DEFAULT_HISTORY_LIMIT};
pub use types::{DownloadJob, DownloadType, JobOutcome, JobStatus, NewJob, DEFAULT_TITLE};
pub use worker::{DirectDownloadError, EnqueuedJob, QueueManager, QueueOptions};
