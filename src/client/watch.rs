// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Polling observer for `vidqueue watch`.
//!
//! Re-fetches `/queue-status` on a fixed cadence and prints one line per
//! change. When the server is unreachable the delay doubles up to a cap and
//! drops back to the normal cadence after the next successful poll.

use std::time::Duration;

use colored::Colorize;

use super::{ClientError, QueueClient};
use crate::queue::{diff, DownloadJob, JobStatus, StatusChange, StatusSnapshot};

/// Longest wait between polls while the server is down.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Exponential backoff with a cap.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            current: base,
        }
    }

    /// Delay to use after a failure. Each call doubles the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

/// Observer state between polls.
pub struct Watcher {
    client: QueueClient,
    interval: Duration,
    backoff: Backoff,
    last: Option<StatusSnapshot>,
    connected: Option<bool>,
}

impl Watcher {
    pub fn new(client: QueueClient, interval: Duration) -> Self {
        Self {
            client,
            interval,
            backoff: Backoff::new(interval, MAX_BACKOFF.max(interval)),
            last: None,
            connected: None,
        }
    }

    /// Poll once. Returns the lines to print and how long to wait before the
    /// next poll.
    pub async fn poll_once(&mut self) -> (Vec<String>, Duration) {
        match self.client.status().await {
            Ok(snapshot) => {
                let mut lines = Vec::new();
                if self.connected != Some(true) {
                    lines.push(format!(
                        "{} Connected to {}",
                        "[✓]".green(),
                        self.client.base_url()
                    ));
                    if self.last.is_none() {
                        lines.push(render_status(&snapshot));
                    }
                }
                lines.extend(diff(self.last.as_ref(), &snapshot).iter().map(describe_change));

                self.connected = Some(true);
                self.last = Some(snapshot);
                self.backoff.reset();
                (lines, self.interval)
            }
            Err(e) => {
                let delay = self.backoff.next_delay();
                let mut lines = Vec::new();
                if e.is_connectivity() {
                    tracing::debug!(error = %e, "Status poll failed");
                    if self.connected != Some(false) {
                        lines.push(format!("{} {}", "[!]".yellow(), e));
                    }
                    self.connected = Some(false);
                } else {
                    lines.push(format!("{} {}", "[✗]".red(), e));
                }
                lines.push(format!("    retrying in {}s", delay.as_secs()));
                (lines, delay)
            }
        }
    }

    /// Poll forever, handing each line to `emit`.
    pub async fn run<F: FnMut(&str)>(&mut self, mut emit: F) {
        loop {
            let (lines, delay) = self.poll_once().await;
            for line in &lines {
                emit(line);
            }
            tokio::time::sleep(delay).await;
        }
    }

    pub fn last(&self) -> Option<&StatusSnapshot> {
        self.last.as_ref()
    }
}

/// One line for one change.
pub fn describe_change(change: &StatusChange) -> String {
    match change {
        StatusChange::Queued(job) => format!("{} queued     {}", "+".cyan(), label(job)),
        StatusChange::Removed(job) => format!("{} removed    {}", "-".dimmed(), label(job)),
        StatusChange::Started(job) => format!("{} started    {}", ">".blue(), label(job)),
        StatusChange::Finished(job) => match job.status {
            JobStatus::Failed => format!(
                "{} failed     {}: {}",
                "✗".red(),
                label(job),
                job.error
                    .as_deref()
                    .and_then(|e| e.lines().next())
                    .unwrap_or("unknown error")
            ),
            _ => match &job.destination {
                Some(path) => format!("{} completed  {} -> {}", "✓".green(), label(job), path),
                None => format!("{} completed  {}", "✓".green(), label(job)),
            },
        },
    }
}

/// Multi-line summary for `vidqueue status` and the first watch poll.
pub fn render_status(status: &StatusSnapshot) -> String {
    let mut out = String::new();

    match &status.current_download {
        Some(job) => out.push_str(&format!("{} {}\n", "Downloading:".bold(), label(job))),
        None => out.push_str(&format!("{} idle\n", "Downloading:".bold())),
    }

    out.push_str(&format!("{} {}\n", "Queued:".bold(), status.queue_length));
    for (i, job) in status.queue.iter().enumerate() {
        out.push_str(&format!("  {:>3}. {}  {}\n", i + 1, label(job), job.id.dimmed()));
    }

    let failed = status.failed.len();
    out.push_str(&format!(
        "{} {} ({} failed)",
        "Finished:".bold(),
        status.completed.len(),
        failed
    ));
    for job in status.completed.iter().rev().take(5) {
        let mark = match job.status {
            JobStatus::Failed => "✗".red(),
            _ => "✓".green(),
        };
        out.push_str(&format!("\n    {} {}", mark, label(job)));
    }

    out
}

fn label(job: &DownloadJob) -> String {
    format!("{} [{}]", job.title, job.download_type)
}

/// Convenience for callers that only want the last error text.
pub fn describe_error(error: &ClientError) -> String {
    match error {
        ClientError::Rejected {
            message, reference, ..
        } => match reference {
            Some(reference) => format!("{} (reference {})", message, reference),
            None => message.clone(),
        },
        other => other.to_string(),
    }
}
