// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use vidqueue::fetch::{FetchError, FetchOutput, FetchRequest, Fetcher};
use vidqueue::queue::{NewJob, QueueManager, QueueOptions, StatusSnapshot};

/// In-process download collaborator driven by the URL.
///
/// - URLs containing `fail` exit with code 1
/// - URLs containing `panic` panic
/// - URLs containing `slow` sleep for ten seconds
/// - everything else succeeds and reports `/downloads/<last path segment>.mp4`
///
/// With a gate, every call waits for one permit before doing anything, so a
/// test can hold a job in flight and release it when ready.
pub struct ScriptedFetcher {
    calls: Mutex<Vec<String>>,
    gate: Option<Arc<Semaphore>>,
    title: Option<String>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            gate: None,
            title: None,
        }
    }

    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let fetcher = Self {
            gate: Some(gate.clone()),
            ..Self::new()
        };
        (fetcher, gate)
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// URLs fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchOutput, FetchError> {
        self.calls.lock().unwrap().push(request.video_url.clone());

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        let url = request.video_url.as_str();
        if url.contains("panic") {
            panic!("scripted panic for {}", url);
        }
        if url.contains("fail") {
            return Err(FetchError::Exit {
                program: "yt-dlp".to_string(),
                code: 1,
                output: format!("ERROR: Unsupported URL: {}", url),
            });
        }
        if url.contains("slow") {
            tokio::time::sleep(Duration::from_secs(10)).await;
        }

        let name = url.rsplit('/').next().unwrap_or("video");
        Ok(FetchOutput {
            output: format!("[download] Destination: /downloads/{}.mp4", name),
            destination: Some(format!("/downloads/{}.mp4", name)),
        })
    }

    async fn lookup_title(&self, _video_url: &str, _referer_url: Option<&str>) -> Option<String> {
        self.title.clone()
    }
}

/// Fast options for tests: quick polling, no timeout, no title lookup.
pub fn test_options() -> QueueOptions {
    QueueOptions {
        poll_interval: Duration::from_millis(10),
        download_timeout: Duration::ZERO,
        resolve_titles: false,
        ..QueueOptions::default()
    }
}

pub fn start(fetcher: Arc<ScriptedFetcher>) -> QueueManager {
    QueueManager::start(test_options(), fetcher)
}

pub fn job(name: &str) -> NewJob {
    NewJob::new(format!("https://media.example.com/{}", name)).with_title(name)
}

/// Poll the status until `check` passes. Panics after five seconds.
pub async fn wait_for<F>(manager: &QueueManager, what: &str, check: F) -> StatusSnapshot
where
    F: Fn(&StatusSnapshot) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let status = manager.status();
        if check(&status) {
            return status;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}: {:#?}", what, status);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub fn current_title(status: &StatusSnapshot) -> Option<&str> {
    status.current_download.as_ref().map(|job| job.title.as_str())
}

pub fn finished_titles(status: &StatusSnapshot) -> Vec<&str> {
    status.completed.iter().map(|job| job.title.as_str()).collect()
}
