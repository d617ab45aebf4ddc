//! REST client for the Veo long-running video generation endpoints.
//!
//! Submission is `POST /models/{model}:predictLongRunning`; the returned
//! operation is then polled with `GET /{operation_name}` until `done`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vidgen_core::types::{GenerationRequest, JobHandle, JobStatus};

use crate::service::{GenerationService, ServiceError};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Default video model.
pub const DEFAULT_MODEL: &str = "veo-2.0-generate-001";

/// Header carrying the API key on service calls.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Generation options sent alongside every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoParameters {
    /// Number of videos to generate. Only the first one is downloaded.
    pub sample_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_generation: Option<String>,
}

impl Default for VideoParameters {
    fn default() -> Self {
        Self {
            sample_count: 1,
            aspect_ratio: None,
            duration_seconds: None,
            person_generation: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    instances: Vec<Instance<'a>>,
    parameters: &'a VideoParameters,
}

#[derive(Debug, Serialize)]
struct Instance<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<InlineImage<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineImage<'a> {
    bytes_base64_encoded: String,
    mime_type: &'a str,
}

/// Long-running operation as returned by both submit and poll.
#[derive(Debug, Deserialize)]
struct Operation {
    name: Option<String>,
    done: Option<bool>,
    response: Option<OperationResponse>,
    error: Option<OperationError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSample {
    video: Option<Video>,
}

#[derive(Debug, Deserialize)]
struct Video {
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

impl Operation {
    /// URI of the first generated sample, if any.
    fn result_locator(&self) -> Option<String> {
        self.response
            .as_ref()?
            .generate_video_response
            .as_ref()?
            .generated_samples
            .first()?
            .video
            .as_ref()?
            .uri
            .clone()
    }

    /// Convert to the opaque handle/status pair. A poll response without
    /// a name keeps the previous handle.
    fn into_handle_status(
        self,
        previous: Option<&JobHandle>,
    ) -> Result<(JobHandle, JobStatus), ServiceError> {
        let done = self.done.unwrap_or(false);

        if done {
            if let Some(err) = self.error {
                return Err(ServiceError::Operation {
                    code: err.code,
                    message: err.message,
                });
            }
        }

        let status = if done {
            JobStatus::finished(self.result_locator())
        } else {
            JobStatus::pending()
        };

        let handle = match (self.name, previous) {
            (Some(name), _) if !name.is_empty() => JobHandle::new(name),
            (_, Some(prev)) => prev.clone(),
            _ => {
                return Err(ServiceError::Decode(
                    "operation response carries no name".to_string(),
                ))
            }
        };

        Ok((handle, status))
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the Veo generation endpoints.
pub struct VeoApi {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    parameters: VideoParameters,
}

impl VeoApi {
    /// Create a new API client.
    ///
    /// * `base_url` - API root, e.g. [`DEFAULT_BASE_URL`].
    /// * `model`    - model id, e.g. [`DEFAULT_MODEL`].
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, model, api_key)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
            parameters: VideoParameters::default(),
        }
    }

    /// Replace the generation options sent with each submission.
    pub fn with_parameters(mut self, parameters: VideoParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code, or turn it into a
    /// [`ServiceError::Api`] carrying the status and body text.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ServiceError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_operation(response: reqwest::Response) -> Result<Operation, ServiceError> {
        let response = Self::ensure_success(response).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ServiceError::Decode(e.to_string()))
    }
}

#[async_trait]
impl GenerationService for VeoApi {
    async fn submit(
        &self,
        request: &GenerationRequest,
    ) -> Result<(JobHandle, JobStatus), ServiceError> {
        let body = PredictRequest {
            instances: vec![Instance {
                prompt: request.prompt(),
                image: request.image().map(|img| InlineImage {
                    bytes_base64_encoded: img.to_base64(),
                    mime_type: img.mime_type(),
                }),
            }],
            parameters: &self.parameters,
        };

        let response = self
            .client
            .post(format!("{}/models/{}:predictLongRunning", self.base_url, self.model))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await?;

        let operation = Self::parse_operation(response).await?;
        tracing::debug!(operation = ?operation.name, "Generation job submitted");
        operation.into_handle_status(None)
    }

    async fn poll(&self, handle: &JobHandle) -> Result<(JobHandle, JobStatus), ServiceError> {
        let response = self
            .client
            .get(format!("{}/{}", self.base_url, handle.as_str()))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        Self::parse_operation(response)
            .await?
            .into_handle_status(Some(handle))
    }
}
