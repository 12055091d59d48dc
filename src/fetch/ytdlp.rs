// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! yt-dlp subprocess collaborator.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;

use super::{FetchError, FetchOutput, FetchRequest, Fetcher};
use crate::queue::DownloadType;

/// Default executable name.
pub const DEFAULT_PROGRAM: &str = "yt-dlp";

/// Time allowed for `--get-title` lookups.
pub const DEFAULT_TITLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Lines where yt-dlp reports the file it wrote. The last match wins since
/// merge and audio extraction run after the raw download.
static DESTINATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^\[(?:download|ExtractAudio)\] Destination: (.+?)\r?$|^\[Merger\] Merging formats into "(.+?)"\r?$|^\[download\] (.+?) has already been downloaded"#,
    )
    .expect("destination regex")
});

/// Runs yt-dlp for each request, writing into `download_dir`.
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    program: String,
    download_dir: PathBuf,
    title_timeout: Duration,
}

impl YtDlpFetcher {
    pub fn new(program: impl Into<String>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            download_dir: download_dir.into(),
            title_timeout: DEFAULT_TITLE_TIMEOUT,
        }
    }

    pub fn with_title_timeout(mut self, timeout: Duration) -> Self {
        self.title_timeout = timeout;
        self
    }

    /// Command line for one download, without the program name.
    pub fn build_args(&self, request: &FetchRequest) -> Vec<String> {
        let mut args: Vec<String> = match request.download_type {
            DownloadType::Audio => ["-f", "bestaudio", "--extract-audio", "--audio-format", "mp3"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            DownloadType::Video => ["-f", "bv*+ba/b", "--merge-output-format", "mp4"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };

        if let Some(referer) = &request.referer_url {
            args.push("--referer".to_string());
            args.push(referer.clone());
        }

        args.push("-o".to_string());
        args.push(
            self.download_dir
                .join("%(title)s.%(ext)s")
                .to_string_lossy()
                .into_owned(),
        );
        args.push(request.video_url.clone());
        args
    }

    fn spawn_error(&self, e: std::io::Error) -> FetchError {
        if e.kind() == std::io::ErrorKind::NotFound {
            FetchError::NotInstalled(self.program.clone())
        } else {
            FetchError::Io(e)
        }
    }
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM, "downloads")
    }
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchOutput, FetchError> {
        tokio::fs::create_dir_all(&self.download_dir).await?;

        let args = self.build_args(request);
        tracing::debug!(program = %self.program, ?args, "Spawning downloader");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        let text = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );

        if output.status.success() {
            Ok(FetchOutput {
                destination: parse_destination(&text),
                output: text,
            })
        } else {
            Err(FetchError::Exit {
                program: self.program.clone(),
                // No code means the child was killed by a signal.
                code: output.status.code().unwrap_or(-1),
                output: text,
            })
        }
    }

    async fn lookup_title(&self, video_url: &str, referer_url: Option<&str>) -> Option<String> {
        let mut command = Command::new(&self.program);
        command.arg("--get-title");
        if let Some(referer) = referer_url {
            command.arg("--referer").arg(referer);
        }
        command.arg(video_url).stdin(Stdio::null()).kill_on_drop(true);

        match tokio::time::timeout(self.title_timeout, command.output()).await {
            Ok(Ok(output)) if output.status.success() => {
                let title = String::from_utf8_lossy(&output.stdout).trim().to_string();
                (!title.is_empty()).then_some(title)
            }
            Ok(Ok(output)) => {
                tracing::warn!(url = %video_url, code = ?output.status.code(), "Title lookup failed");
                None
            }
            Ok(Err(e)) => {
                tracing::warn!(url = %video_url, error = %self.spawn_error(e), "Title lookup failed");
                None
            }
            Err(_) => {
                tracing::warn!(url = %video_url, "Title lookup timed out");
                None
            }
        }
    }
}

/// Extract the final output path from yt-dlp's log.
pub fn parse_destination(output: &str) -> Option<String> {
    DESTINATION_PATTERN
        .captures_iter(output)
        .last()
        .and_then(|caps| (1..=3).find_map(|i| caps.get(i)))
        .map(|m| m.as_str().trim().to_string())
}
