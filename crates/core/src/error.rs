//! Error taxonomy for a generation invocation and the classifier that
//! maps raw collaborator failures onto it.
//!
//! Every variant's `Display` text is short and safe to show to an end
//! user verbatim.

use std::fmt;

/// Message shown when the remote service is throttling us.
pub const RATE_LIMITED_MESSAGE: &str =
    "The AI is currently busy. Please wait a few moments before trying again. (Rate limit exceeded)";

/// Fallback when a raw error carries no usable text.
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred during video generation.";

/// Lower-case markers that identify a rate-limit failure.
const RATE_LIMIT_MARKERS: &[&str] = &["429", "rate limit", "resource_exhausted"];

/// The single error type surfaced by a generation invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// The credential is missing. Fatal, never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The request itself is unusable (blank prompt, bad image).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The service is throttling; the caller should wait and retry later.
    #[error("{}", RATE_LIMITED_MESSAGE)]
    RateLimited,

    /// The job finished but produced no result locator.
    #[error("Video generation failed: No download link found.")]
    MissingResult,

    /// The asset fetch returned a non-success status.
    #[error("Failed to download video: HTTP {status}. Details: {body}")]
    Download { status: u16, body: String },

    /// The caller cancelled the invocation.
    #[error("Video generation was cancelled.")]
    Cancelled,

    /// The configured overall deadline elapsed before the job finished.
    #[error("Video generation did not finish within the allotted time.")]
    DeadlineExceeded,

    /// Anything else, with the best message that could be extracted.
    #[error("{0}")]
    Generic(String),
}

impl GenerationError {
    /// Whether waiting and trying again later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited | Self::DeadlineExceeded)
    }
}

/// Returns `true` if the text mentions any rate-limit marker,
/// case-insensitively.
pub fn is_rate_limit_text(text: &str) -> bool {
    let lower = text.to_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Classify a raw collaborator error as [`GenerationError::RateLimited`]
/// or [`GenerationError::Generic`].
///
/// Both the `Display` and `Debug` renderings are searched, so markers
/// hidden in structured fields (status codes, response bodies) are found
/// even when the message omits them.
pub fn classify<E>(raw: &E) -> GenerationError
where
    E: fmt::Display + fmt::Debug + ?Sized,
{
    let message = raw.to_string();
    let debug = format!("{raw:?}");

    if is_rate_limit_text(&message) || is_rate_limit_text(&debug) {
        return GenerationError::RateLimited;
    }

    GenerationError::Generic(best_message(&message, &debug))
}

/// Prefer the explicit message, then the debug rendering, then a fixed
/// fallback.
fn best_message(message: &str, debug: &str) -> String {
    let message = message.trim();
    if !message.is_empty() {
        return message.to_string();
    }
    let debug = debug.trim();
    if !debug.is_empty() && debug != "\"\"" && debug != "()" {
        return debug.to_string();
    }
    UNKNOWN_ERROR_MESSAGE.to_string()
}
