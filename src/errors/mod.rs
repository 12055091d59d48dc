// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP-facing error handling.
//!
//! Every error returned by the API carries a reference code that also appears
//! in the server log, so a failed request seen by a client can be matched to
//! the log line with the full details.
//!
//! Error bodies always have the shape:
//!
//! ```json
//! {"success": false, "error": "...", "reference": "ERR-20250101-A3F8K2"}
//! ```

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use rand::Rng;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::error::QueueError;
use crate::fetch::FetchError;
use crate::queue::DirectDownloadError;
use crate::utils::MAX_PAYLOAD_BYTES;

// =============================================================================
// ERROR REFERENCE CODE GENERATION
// =============================================================================

/// Generate a unique error reference code.
/// Format: ERR-YYYYMMDD-XXXXXX (e.g., ERR-20240115-A3F8K2)
pub fn generate_reference_code() -> String {
    let date = Utc::now().format("%Y%m%d");
    let mut rng = rand::thread_rng();
    let chars: Vec<char> = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789".chars().collect();
    let random: String = (0..6)
        .map(|_| chars[rng.gen_range(0..chars.len())])
        .collect();
    format!("ERR-{}-{}", date, random)
}

// =============================================================================
// API ERROR TYPE
// =============================================================================

/// Error returned by HTTP handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Malformed body or a job that failed validation (400)
    InvalidRequest { message: String, reference: String },

    /// Direct download ran and failed (502). The collaborator's output is
    /// passed back so the caller can see why.
    DownloadFailed {
        message: String,
        output: Option<String>,
        reference: String,
    },

    /// Request body over the limit (413)
    PayloadTooLarge { message: String, reference: String },

    /// Anything else (500). Never exposes internal details.
    Internal { message: String, reference: String },
}

/// JSON body of an error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody<'a> {
    pub success: bool,
    pub error: &'a str,
    pub reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<&'a str>,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::DownloadFailed { .. } => StatusCode::BAD_GATEWAY,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn reference(&self) -> &str {
        match self {
            ApiError::InvalidRequest { reference, .. }
            | ApiError::DownloadFailed { reference, .. }
            | ApiError::PayloadTooLarge { reference, .. }
            | ApiError::Internal { reference, .. } => reference,
        }
    }

    /// The user-facing message.
    pub fn message(&self) -> &str {
        match self {
            ApiError::InvalidRequest { message, .. }
            | ApiError::DownloadFailed { message, .. }
            | ApiError::PayloadTooLarge { message, .. }
            | ApiError::Internal { message, .. } => message,
        }
    }

    fn output(&self) -> Option<&str> {
        match self {
            ApiError::DownloadFailed { output, .. } => output.as_deref(),
            _ => None,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (reference {})", self.message(), self.reference())
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            success: false,
            error: self.message(),
            reference: self.reference(),
            output: self.output(),
        };

        let body = serde_json::to_string(&body).unwrap_or_else(|_| {
            r#"{"success":false,"error":"An unexpected error occurred","reference":"ERR-FALLBACK"}"#
                .to_string()
        });

        (status, [("content-type", "application/json")], body).into_response()
    }
}

// =============================================================================
// ERROR CONSTRUCTORS (WITH LOGGING)
// =============================================================================

impl ApiError {
    /// A rejected request. The message is shown to the caller as-is.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        let reference = generate_reference_code();
        let message = message.into();

        tracing::warn!(reference = %reference, error = %message, "Invalid request");

        Self::InvalidRequest { message, reference }
    }

    /// A direct download that the collaborator could not complete.
    pub fn download_failed(error: &FetchError) -> Self {
        let reference = generate_reference_code();

        tracing::error!(reference = %reference, error = %error, "Direct download failed");

        Self::DownloadFailed {
            message: error.to_string(),
            output: error.output().map(str::to_string),
            reference,
        }
    }

    pub fn payload_too_large(max_size: usize) -> Self {
        let reference = generate_reference_code();

        tracing::warn!(reference = %reference, max_size, "Payload too large");

        Self::PayloadTooLarge {
            message: format!("Request body too large. Maximum size is {} bytes.", max_size),
            reference,
        }
    }

    /// Internal failure. Full details go to the log only.
    pub fn internal(internal_error: &str) -> Self {
        let reference = generate_reference_code();
        let sanitized = sanitize_error_details(internal_error);

        tracing::error!(
            reference = %reference,
            internal_error = %sanitized,
            "Internal server error"
        );

        Self::Internal {
            message: format!("An internal error occurred. Reference: {}", reference),
            reference,
        }
    }
}

// =============================================================================
// MAPPING FROM LIBRARY ERRORS
// =============================================================================

impl From<QueueError> for ApiError {
    fn from(error: QueueError) -> Self {
        match error {
            QueueError::InvalidJob(message) => ApiError::invalid_request(message),
            other => ApiError::internal(&other.to_string()),
        }
    }
}

impl From<DirectDownloadError> for ApiError {
    fn from(error: DirectDownloadError) -> Self {
        match error {
            DirectDownloadError::Invalid(e) => e.into(),
            DirectDownloadError::Failed(e) => ApiError::download_failed(&e),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::payload_too_large(MAX_PAYLOAD_BYTES);
        }
        ApiError::invalid_request(rejection.body_text())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(error: std::io::Error) -> Self {
        ApiError::internal(&error.to_string())
    }
}

/// Result type for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// LOG SANITIZATION
// =============================================================================

/// Patterns scrubbed from internal errors before they are logged.
static SANITIZE_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        // Credentials embedded in URLs
        (Regex::new(r"(?i)(https?://)[^/\s:@]+:[^/\s@]+@").expect("URL credential regex"), "${1}[CREDENTIALS_REDACTED]@"),
        // Home directories
        (Regex::new(r"/(?:home|Users)/[^/\s]+").expect("Unix home regex"), "/[HOME_REDACTED]"),
        (Regex::new(r"[A-Za-z]:\\Users\\[^\\\s]+").expect("Windows home regex"), "[HOME_REDACTED]"),
        // Cookie and auth headers
        (Regex::new(r"(?i)(cookie|authorization):\s*[^\r\n]+").expect("Header regex"), "${1}: [REDACTED]"),
    ]
});

/// Remove credentials and user paths from an error string.
pub fn sanitize_error_details(error: &str) -> String {
    SANITIZE_PATTERNS
        .iter()
        .fold(error.to_string(), |acc, (pattern, replacement)| {
            pattern.replace_all(&acc, *replacement).into_owned()
        })
}

// =============================================================================
// TESTS
// =============================================================================
