//! Collaborator seams of the job client.
//!
//! [`GenerationService`] submits and polls jobs; [`AssetFetcher`] turns a
//! finished job's result locator into bytes. Production code uses
//! [`VeoApi`](crate::api::VeoApi) and
//! [`HttpAssetFetcher`](crate::fetcher::HttpAssetFetcher); tests plug in
//! in-memory doubles.

use vidgen_core::types::{GenerationRequest, JobHandle, JobStatus};

/// Errors from the remote generation service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("Request to generation service failed: {0}")]
    Transport(String),

    /// The service returned a non-2xx status code.
    #[error("Generation service error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The response body could not be decoded.
    #[error("Unexpected response from generation service: {0}")]
    Decode(String),

    /// The job finished with an error instead of a result.
    #[error("Video generation failed: {message} (code {code})")]
    Operation { code: i32, message: String },
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Errors from the asset fetcher.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The request never produced a response.
    #[error("Failed to download video: {0}")]
    Transport(String),

    /// The server answered with a non-2xx status.
    #[error("Failed to download video: HTTP {status}. Details: {body}")]
    Status { status: u16, body: String },

    /// The result locator is not a valid URL.
    #[error("Invalid result locator '{0}'")]
    InvalidLocator(String),
}

/// The request URL carries the credential as a query parameter, so it is
/// stripped before the error text can reach logs or users.
impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.without_url().to_string())
    }
}

/// Remote service that runs generation jobs.
#[async_trait::async_trait]
pub trait GenerationService: Send + Sync {
    /// Submit a new job and return its first handle and status.
    async fn submit(
        &self,
        request: &GenerationRequest,
    ) -> Result<(JobHandle, JobStatus), ServiceError>;

    /// Query the job named by `handle`. The returned handle replaces the
    /// one passed in.
    async fn poll(&self, handle: &JobHandle) -> Result<(JobHandle, JobStatus), ServiceError>;
}

/// Downloads the asset a finished job points at.
#[async_trait::async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, locator: &str, credential: &str) -> Result<Vec<u8>, FetchError>;
}
