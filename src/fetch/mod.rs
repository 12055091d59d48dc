// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Download collaborator.
//!
//! The queue never downloads anything itself. It hands a [`FetchRequest`] to
//! a [`Fetcher`] and records whatever comes back. The production fetcher runs
//! yt-dlp ([`YtDlpFetcher`]); tests plug in scripted fetchers.
//!
//! ```text
//! ┌──────────────┐  FetchRequest  ┌────────────────┐   spawn   ┌────────┐
//! │ Worker /     │───────────────▶│ TimeoutFetcher │──────────▶│ yt-dlp │
//! │ direct path  │◀───────────────│  (optional)    │◀──────────│        │
//! └──────────────┘  FetchOutput / └────────────────┘  exit +   └────────┘
//!                   FetchError                        output
//! ```

pub mod ytdlp;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::queue::{DownloadJob, DownloadType, NewJob};

pub use ytdlp::YtDlpFetcher;

/// Parameters handed to the collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub video_url: String,
    pub referer_url: Option<String>,
    pub download_type: DownloadType,
}

impl From<&DownloadJob> for FetchRequest {
    fn from(job: &DownloadJob) -> Self {
        Self {
            video_url: job.video_url.clone(),
            referer_url: job.referer_url.clone(),
            download_type: job.download_type,
        }
    }
}

impl From<&NewJob> for FetchRequest {
    fn from(request: &NewJob) -> Self {
        Self {
            video_url: request.video_url.clone(),
            referer_url: request.referer_url.clone(),
            download_type: request.download_type,
        }
    }
}

/// Successful collaborator result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOutput {
    /// Combined stdout and stderr
    pub output: String,
    /// Output file, when the collaborator reported one
    pub destination: Option<String>,
}

/// Ways a collaborator call can fail.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0} not found. Make sure it is installed and on PATH")]
    NotInstalled(String),

    #[error("{program} exited with code {code}")]
    Exit {
        program: String,
        code: i32,
        output: String,
    },

    #[error("download timed out after {} seconds", .0.as_secs())]
    TimedOut(Duration),

    #[error("I/O error running downloader: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Collaborator output captured before the failure, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            FetchError::Exit { output, .. } if !output.is_empty() => Some(output),
            _ => None,
        }
    }
}

/// The external download collaborator.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download one item and wait for a terminal result.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchOutput, FetchError>;

    /// Look up a display title for a URL. `None` when unknown.
    async fn lookup_title(&self, _video_url: &str, _referer_url: Option<&str>) -> Option<String> {
        None
    }
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for Arc<F> {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchOutput, FetchError> {
        (**self).fetch(request).await
    }

    async fn lookup_title(&self, video_url: &str, referer_url: Option<&str>) -> Option<String> {
        (**self).lookup_title(video_url, referer_url).await
    }
}

/// Wraps a fetcher and fails any call that runs longer than `limit`.
///
/// Dropping the inner future is what stops the work, so the inner fetcher
/// must clean up on drop (yt-dlp children are spawned with `kill_on_drop`).
pub struct TimeoutFetcher<F> {
    inner: F,
    limit: Duration,
}

impl<F: Fetcher> TimeoutFetcher<F> {
    pub fn new(inner: F, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl<F: Fetcher> Fetcher for TimeoutFetcher<F> {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchOutput, FetchError> {
        match tokio::time::timeout(self.limit, self.inner.fetch(request)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    url = %request.video_url,
                    limit_secs = self.limit.as_secs(),
                    "Download exceeded time limit"
                );
                Err(FetchError::TimedOut(self.limit))
            }
        }
    }

    async fn lookup_title(&self, video_url: &str, referer_url: Option<&str>) -> Option<String> {
        self.inner.lookup_title(video_url, referer_url).await
    }
}

/// Wrap `fetcher` in a [`TimeoutFetcher`] unless `limit` is zero.
pub fn with_timeout(fetcher: Arc<dyn Fetcher>, limit: Duration) -> Arc<dyn Fetcher> {
    if limit.is_zero() {
        fetcher
    } else {
        Arc::new(TimeoutFetcher::new(fetcher, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sleepy(Duration);

    #[async_trait]
    impl Fetcher for Sleepy {
        async fn fetch(&self, _request: &FetchRequest) -> Result<FetchOutput, FetchError> {
            tokio::time::sleep(self.0).await;
            Ok(FetchOutput {
                output: "done".into(),
                destination: None,
            })
        }
    }

    fn request() -> FetchRequest {
        FetchRequest::from(&NewJob::new("https://example.com/v"))
    }

    #[tokio::test]
    async fn test_timeout_passes_fast_calls_through() {
        let fetcher = TimeoutFetcher::new(Sleepy(Duration::from_millis(5)), Duration::from_secs(5));
        let out = fetcher.fetch(&request()).await.unwrap();
        assert_eq!(out.output, "done");
    }

    #[tokio::test]
    async fn test_timeout_expires() {
        let fetcher = TimeoutFetcher::new(Sleepy(Duration::from_secs(10)), Duration::from_millis(20));
        let err = fetcher.fetch(&request()).await.unwrap_err();
        assert!(matches!(err, FetchError::TimedOut(_)));
        assert_eq!(err.to_string(), "download timed out after 0 seconds");
    }

    #[tokio::test]
    async fn test_zero_limit_disables_wrapper() {
        let fetcher: Arc<dyn Fetcher> = Arc::new(Sleepy(Duration::from_millis(1)));
        let wrapped = with_timeout(fetcher.clone(), Duration::ZERO);
        assert!(Arc::ptr_eq(&fetcher, &wrapped));
    }

    #[test]
    fn test_exit_error_message_and_output() {
        let err = FetchError::Exit {
            program: "yt-dlp".into(),
            code: 1,
            output: "ERROR: Unsupported URL".into(),
        };
        assert_eq!(err.to_string(), "yt-dlp exited with code 1");
        assert_eq!(err.output(), Some("ERROR: Unsupported URL"));
        assert_eq!(FetchError::Other("x".into()).output(), None);
    }
}
