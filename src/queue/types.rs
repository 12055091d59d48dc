// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Job types for the download queue.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::utils::{is_valid_url, non_blank};

/// Title used when the caller gave none and none could be looked up.
pub const DEFAULT_TITLE: &str = "Untitled video";

/// Lifecycle status of a job.
///
/// The only legal path is `Queued -> Processing -> Completed | Failed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting in the pending queue
    Queued,
    /// Claimed by the worker
    Processing,
    /// Collaborator reported success
    Completed,
    /// Collaborator reported failure
    Failed,
}

impl JobStatus {
    /// Returns true if the job is finished (success or failure).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal forward step.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which output the collaborator should produce.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DownloadType {
    /// Full video (merged to mp4)
    #[default]
    Video,
    /// Audio track only (extracted to mp3)
    Audio,
}

impl DownloadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadType::Video => "video",
            DownloadType::Audio => "audio",
        }
    }
}

impl fmt::Display for DownloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A download request as submitted by a client.
///
/// Used by both add-to-queue and direct download.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewJob {
    #[serde(default)]
    pub video_url: String,
    #[serde(default)]
    pub referer_url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub download_type: DownloadType,
}

impl NewJob {
    /// Create a video request for a URL.
    pub fn new(video_url: impl Into<String>) -> Self {
        Self {
            video_url: video_url.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer_url = Some(referer.into());
        self
    }

    pub fn audio(mut self) -> Self {
        self.download_type = DownloadType::Audio;
        self
    }

    /// Trim the request and reject anything that must never reach the queue.
    pub fn validate(self) -> Result<Self, QueueError> {
        let video_url = self.video_url.trim().to_string();
        if video_url.is_empty() {
            return Err(QueueError::invalid("video_url is required"));
        }
        if !is_valid_url(&video_url) {
            return Err(QueueError::invalid(format!("invalid video URL: {}", video_url)));
        }

        let referer_url = non_blank(self.referer_url);
        if let Some(referer) = &referer_url {
            if !is_valid_url(referer) {
                return Err(QueueError::invalid(format!("invalid referer URL: {}", referer)));
            }
        }

        Ok(Self {
            video_url,
            referer_url,
            title: non_blank(self.title),
            download_type: self.download_type,
        })
    }
}

/// Terminal result of running one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Collaborator succeeded with this payload
    Completed {
        output: String,
        destination: Option<String>,
    },
    /// Collaborator failed with this message
    Failed { error: String },
}

impl JobOutcome {
    pub fn completed(output: impl Into<String>) -> Self {
        JobOutcome::Completed {
            output: output.into(),
            destination: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        JobOutcome::Failed {
            error: error.into(),
        }
    }
}

/// One requested download and its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadJob {
    /// Unique identifier, never reused
    pub id: String,
    pub title: String,
    pub video_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer_url: Option<String>,
    pub download_type: DownloadType,
    pub status: JobStatus,
    /// Set only when failed; carries the tail of the collaborator output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Collaborator output; set only when completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// File the collaborator reported writing, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl DownloadJob {
    /// Create a queued job from an already validated request.
    pub fn new(request: NewJob) -> Self {
        Self {
            id: new_job_id(),
            title: request.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            video_url: request.video_url,
            referer_url: request.referer_url,
            download_type: request.download_type,
            status: JobStatus::Queued,
            error: None,
            output: None,
            destination: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), QueueError> {
        if !self.status.can_transition_to(next) {
            return Err(QueueError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// queued -> processing
    pub fn start(&mut self) -> Result<(), QueueError> {
        self.transition(JobStatus::Processing)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// processing -> completed | failed, attaching the outcome payload.
    pub fn finish(&mut self, outcome: JobOutcome) -> Result<(), QueueError> {
        match outcome {
            JobOutcome::Completed { output, destination } => {
                self.transition(JobStatus::Completed)?;
                self.output = Some(output);
                self.destination = destination;
                self.error = None;
            }
            JobOutcome::Failed { error } => {
                self.transition(JobStatus::Failed)?;
                self.error = Some(error);
                self.output = None;
                self.destination = None;
            }
        }
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}

/// Generate a random UUID v4 string for job ids.
pub fn new_job_id() -> String {
    use rand::Rng;

    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);

    // Set version (4) and variant (RFC 4122) bits
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}
