// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Utility functions for vidqueue.

use reqwest::Url;

/// Largest collaborator payload kept on a job record (64 KiB).
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024;

/// Marks text that was cut by [`tail_text`].
const ELLIPSIS: &str = "...";

/// Check that a string is an absolute URL with both a scheme and a host.
///
/// # Examples
///
/// ```
/// use vidqueue::utils::is_valid_url;
///
/// assert!(is_valid_url("https://example.com/watch?v=1"));
/// assert!(!is_valid_url("example.com/watch"));
/// ```
pub fn is_valid_url(input: &str) -> bool {
    match Url::parse(input.trim()) {
        Ok(url) => !url.scheme().is_empty() && url.host_str().is_some_and(|h| !h.is_empty()),
        Err(_) => false,
    }
}

/// Keep only the end of `text`, cutting on a char boundary.
///
/// The result, including the leading `...` marker, never exceeds
/// `max_bytes`. yt-dlp can be chatty; the tail is where the outcome is
/// reported.
pub fn tail_text(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }

    let marker = if max_bytes >= ELLIPSIS.len() { ELLIPSIS } else { "" };
    let mut start = text.len() - (max_bytes - marker.len());
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("{}{}", marker, &text[start..])
}

/// Normalize an optional user-supplied field: blank becomes `None`.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
