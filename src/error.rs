// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Queue error taxonomy and CLI error formatting.
//!
//! [`QueueError`] is what the queue core returns. Collaborator failures are not
//! errors of the core: they are recorded on the job (see
//! [`crate::fetch::FetchError`]). [`ErrorBuilder`] renders actionable messages
//! for the command line, e.g. when the server cannot be reached.

use std::fmt;

use thiserror::Error;

use crate::queue::JobStatus;

/// Errors raised by the queue core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Missing or malformed input, rejected before enqueue.
    #[error("invalid job: {0}")]
    InvalidJob(String),

    /// A status change that does not follow queued -> processing -> finished.
    #[error("illegal status transition {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    /// A result was recorded for a job that is not the one in flight.
    #[error("job {0} is not being processed")]
    NotInFlight(String),
}

impl QueueError {
    /// Shorthand for [`QueueError::InvalidJob`].
    pub fn invalid(message: impl Into<String>) -> Self {
        QueueError::InvalidJob(message.into())
    }
}

/// Hint appended to every formatted CLI error.
pub const HELP_HINT: &str = "Run `vidqueue --help` for usage.";

/// Formats an error message with title, causes and fixes.
///
/// # Example
///
/// ```
/// use vidqueue::error::format_error;
///
/// let error = format_error(
///     "Cannot reach the queue server",
///     &["Server not started", "Wrong --server URL"],
///     &["Start it: vidqueue serve"],
/// );
/// assert!(error.contains("Possible causes:"));
/// ```
pub fn format_error(title: &str, causes: &[&str], fixes: &[&str]) -> String {
    let mut output = format!("[✗] {}\n\n", title);

    if !causes.is_empty() {
        output.push_str("Possible causes:\n");
        for cause in causes {
            output.push_str(&format!("  - {}\n", cause));
        }
        output.push('\n');
    }

    if !fixes.is_empty() {
        output.push_str("Try these fixes:\n");
        for (i, fix) in fixes.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", i + 1, fix));
        }
        output.push('\n');
    }

    output.push_str(HELP_HINT);
    output
}

/// Builder for constructing formatted error messages.
#[derive(Debug, Clone)]
pub struct ErrorBuilder {
    title: String,
    causes: Vec<String>,
    fixes: Vec<String>,
}

impl ErrorBuilder {
    /// Create a new error builder with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            causes: Vec::new(),
            fixes: Vec::new(),
        }
    }

    /// Add a possible cause.
    pub fn cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    /// Add a suggested fix.
    pub fn fix(mut self, fix: impl Into<String>) -> Self {
        self.fixes.push(fix.into());
        self
    }

    /// Build the formatted error message.
    pub fn build(&self) -> String {
        let causes: Vec<&str> = self.causes.iter().map(|s| s.as_str()).collect();
        let fixes: Vec<&str> = self.fixes.iter().map(|s| s.as_str()).collect();
        format_error(&self.title, &causes, &fixes)
    }
}

impl fmt::Display for ErrorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build())
    }
}
