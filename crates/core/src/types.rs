//! Request and job-state types shared by the client and its callers.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::GenerationError;

// ---------------------------------------------------------------------------
// Reference image
// ---------------------------------------------------------------------------

/// PNG reference image.
pub const MIME_PNG: &str = "image/png";
/// JPEG reference image.
pub const MIME_JPEG: &str = "image/jpeg";
/// WebP reference image.
pub const MIME_WEBP: &str = "image/webp";

/// MIME types accepted for a reference image.
pub const VALID_IMAGE_MIME_TYPES: &[&str] = &[MIME_PNG, MIME_JPEG, MIME_WEBP];

/// An optional still image the generated video should start from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    bytes: Vec<u8>,
    mime_type: String,
}

impl ReferenceImage {
    /// Build an image from raw bytes, rejecting unsupported MIME types.
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Result<Self, GenerationError> {
        let mime_type = mime_type.into().trim().to_ascii_lowercase();
        validate_image_mime_type(&mime_type)?;
        if bytes.is_empty() {
            return Err(GenerationError::InvalidRequest(
                "Reference image is empty".to_string(),
            ));
        }
        Ok(Self { bytes, mime_type })
    }

    /// Build an image from an already base64-encoded payload, as handed
    /// over by upload forms.
    pub fn from_base64(encoded: &str, mime_type: impl Into<String>) -> Result<Self, GenerationError> {
        let bytes = STANDARD.decode(encoded.trim()).map_err(|e| {
            GenerationError::InvalidRequest(format!("Reference image is not valid base64: {e}"))
        })?;
        Self::new(bytes, mime_type)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Standard-alphabet base64 encoding of the image bytes.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// Validate that a MIME type is one of [`VALID_IMAGE_MIME_TYPES`].
pub fn validate_image_mime_type(mime_type: &str) -> Result<(), GenerationError> {
    if VALID_IMAGE_MIME_TYPES.contains(&mime_type) {
        Ok(())
    } else {
        Err(GenerationError::InvalidRequest(format!(
            "Unsupported image type '{mime_type}'. Expected one of: {}",
            VALID_IMAGE_MIME_TYPES.join(", ")
        )))
    }
}

// ---------------------------------------------------------------------------
// Generation request
// ---------------------------------------------------------------------------

/// A prompt plus optional reference image. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    prompt: String,
    image: Option<ReferenceImage>,
}

impl GenerationRequest {
    /// Build a request, rejecting blank prompts.
    pub fn new(prompt: impl Into<String>, image: Option<ReferenceImage>) -> Result<Self, GenerationError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(GenerationError::InvalidRequest(
                "Prompt must not be empty".to_string(),
            ));
        }
        Ok(Self { prompt, image })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn image(&self) -> Option<&ReferenceImage> {
        self.image.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Job handle / status
// ---------------------------------------------------------------------------

/// Opaque token naming a submitted job.
///
/// The service may hand back a different handle on every poll; callers
/// must always continue with the latest one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of a job as reported by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobStatus {
    pub done: bool,
    /// URI of the generated asset; only set once the job finished successfully.
    pub result_locator: Option<String>,
}

impl JobStatus {
    /// A job that is still running.
    pub fn pending() -> Self {
        Self::default()
    }

    /// A finished job with the given (possibly absent) result locator.
    pub fn finished(result_locator: Option<String>) -> Self {
        Self {
            done: true,
            result_locator,
        }
    }

    /// The result locator, treating an empty or blank string as absent.
    pub fn usable_locator(&self) -> Option<&str> {
        self.result_locator
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}
