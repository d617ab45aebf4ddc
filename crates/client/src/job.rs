//! The job client: submit -> poll with backoff -> fetch.
//!
//! One [`JobClient::generate`] call owns exactly one remote job. The only
//! condition absorbed internally is "not done yet", which drives another
//! poll after a capped, jittered exponential delay. Every other failure is
//! classified once at the top and returned as a [`GenerationError`].

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use vidgen_core::backoff::{BackoffConfig, BackoffState};
use vidgen_core::error::{classify, GenerationError};
use vidgen_core::progress::{ProgressSink, ProgressStage};
use vidgen_core::types::{GenerationRequest, ReferenceImage};

use crate::api::VeoApi;
use crate::config::{ClientConfig, ConfigError};
use crate::fetcher::HttpAssetFetcher;
use crate::service::{AssetFetcher, FetchError, GenerationService};

/// HTTP status the asset host uses for throttling.
const TOO_MANY_REQUESTS: u16 = 429;

/// Drives a single generation request against a [`GenerationService`]
/// and an [`AssetFetcher`].
pub struct JobClient<S, F> {
    service: S,
    fetcher: F,
    credential: Option<String>,
    backoff: BackoffConfig,
    deadline: Option<Duration>,
}

impl JobClient<VeoApi, HttpAssetFetcher> {
    /// Wire the Veo REST service and HTTP fetcher from configuration.
    ///
    /// A missing API key is not an error here; it is reported by
    /// [`generate`](Self::generate) before any network call.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        let http = config.http_client()?;
        let service = VeoApi::with_client(
            http.clone(),
            config.base_url.clone(),
            config.model.clone(),
            config.api_key.clone().unwrap_or_default(),
        )
        .with_parameters(config.parameters.clone());

        Ok(Self::new(service, HttpAssetFetcher::with_client(http), config.api_key.clone())
            .with_backoff(config.backoff.clone())
            .with_deadline(config.deadline))
    }
}

impl<S, F> JobClient<S, F>
where
    S: GenerationService,
    F: AssetFetcher,
{
    /// Create a client with the default backoff and no deadline.
    pub fn new(service: S, fetcher: F, credential: Option<String>) -> Self {
        Self {
            service,
            fetcher,
            credential,
            backoff: BackoffConfig::default(),
            deadline: None,
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Bound the whole invocation. `None` polls until the job ends.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Run one request to completion and return the video bytes.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<u8>, GenerationError> {
        self.generate_with_cancel(request, sink, &CancellationToken::new())
            .await
    }

    /// Form-style entry point: a prompt plus an optional
    /// `(base64, mime_type)` image.
    pub async fn generate_encoded(
        &self,
        prompt: &str,
        image: Option<(&str, &str)>,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<u8>, GenerationError> {
        let image = image
            .map(|(encoded, mime_type)| ReferenceImage::from_base64(encoded, mime_type))
            .transpose()?;
        let request = GenerationRequest::new(prompt, image)?;
        self.generate(&request, sink).await
    }

    /// Like [`generate`](Self::generate), but stops with
    /// [`GenerationError::Cancelled`] as soon as `cancel` fires, whether
    /// the client is sleeping or waiting on the network.
    pub async fn generate_with_cancel(
        &self,
        request: &GenerationRequest,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, GenerationError> {
        let credential = self
            .credential
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                GenerationError::Configuration(
                    "API key is not set. Set the GEMINI_API_KEY environment variable.".to_string(),
                )
            })?;

        let invocation_id = uuid::Uuid::new_v4();
        let run = self
            .run_with_deadline(request, credential, sink)
            .instrument(tracing::info_span!("generate", %invocation_id));

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GenerationError::Cancelled),
            result = run => result,
        };

        match &outcome {
            Ok(bytes) => tracing::info!(%invocation_id, size = bytes.len(), "Video generation complete"),
            Err(e) => tracing::warn!(%invocation_id, error = %e, "Video generation failed"),
        }
        outcome
    }

    // ---- private helpers ----

    async fn run_with_deadline(
        &self,
        request: &GenerationRequest,
        credential: &str,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<u8>, GenerationError> {
        match self.deadline {
            Some(limit) => tokio::time::timeout(limit, self.run(request, credential, sink))
                .await
                .unwrap_or(Err(GenerationError::DeadlineExceeded)),
            None => self.run(request, credential, sink).await,
        }
    }

    /// SUBMITTING -> POLLING* -> FETCHING -> DONE.
    async fn run(
        &self,
        request: &GenerationRequest,
        credential: &str,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<u8>, GenerationError> {
        sink.emit(ProgressStage::Submitting.into());
        let (mut handle, mut status) = self
            .service
            .submit(request)
            .await
            .map_err(|e| classify(&e))?;
        tracing::info!(job = %handle, done = status.done, "Generation job submitted");

        let mut backoff = BackoffState::new(&self.backoff);
        while !status.done {
            let sleep_for = backoff.sleep_duration(&self.backoff, &mut rand::rng());
            tracing::debug!(
                attempt = backoff.attempt(),
                delay_ms = sleep_for.as_millis() as u64,
                "Waiting before next poll",
            );
            tokio::time::sleep(sleep_for).await;

            let attempt = backoff.attempt();
            backoff.advance(&self.backoff);
            sink.emit(ProgressStage::Polling { attempt }.into());

            let (next_handle, next_status) =
                self.service.poll(&handle).await.map_err(|e| classify(&e))?;
            handle = next_handle;
            status = next_status;
            tracing::debug!(job = %handle, attempt, done = status.done, "Polled generation job");
        }

        let locator = status.usable_locator().ok_or(GenerationError::MissingResult)?;

        sink.emit(ProgressStage::Fetching.into());
        let bytes = self
            .fetcher
            .fetch(locator, credential)
            .await
            .map_err(fetch_error)?;

        sink.emit(ProgressStage::Complete.into());
        Ok(bytes)
    }
}

/// Map a fetch failure onto the taxonomy. Throttling wins over the
/// generic download error so callers get the "wait and retry" advice.
fn fetch_error(err: FetchError) -> GenerationError {
    match err {
        FetchError::Status {
            status: TOO_MANY_REQUESTS,
            ..
        } => GenerationError::RateLimited,
        FetchError::Status { status, body } => GenerationError::Download { status, body },
        other => classify(&other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn fetch_429_is_rate_limited() {
        let err = fetch_error(FetchError::Status {
            status: 429,
            body: "slow down".into(),
        });
        assert_eq!(err, GenerationError::RateLimited);
    }

    #[test]
    fn fetch_status_is_download_error() {
        let err = fetch_error(FetchError::Status {
            status: 404,
            body: "not found".into(),
        });
        assert_matches!(err, GenerationError::Download { status: 404, body } if body == "not found");
    }

    #[test]
    fn fetch_transport_is_classified() {
        assert_matches!(
            fetch_error(FetchError::Transport("connection reset".into())),
            GenerationError::Generic(m) if m.contains("connection reset")
        );
    }

    #[test]
    fn from_config_builds_without_key() {
        let client = JobClient::from_config(&ClientConfig::default()).unwrap();
        assert!(client.credential.is_none());
        assert_eq!(client.service.model(), crate::api::DEFAULT_MODEL);
    }
}
