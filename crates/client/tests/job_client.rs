//! Integration tests for the job client state machine.
//!
//! The remote service and asset fetcher are in-memory doubles; tokio's
//! paused clock lets the real backoff delays elapse instantly.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use assert_matches::assert_matches;
use tokio_util::sync::CancellationToken;
use vidgen_client::job::JobClient;
use vidgen_client::service::{AssetFetcher, FetchError, GenerationService, ServiceError};
use vidgen_core::backoff::BackoffConfig;
use vidgen_core::error::GenerationError;
use vidgen_core::progress::{ProgressEvent, ProgressStage};
use vidgen_core::types::{GenerationRequest, JobHandle, JobStatus};

const KEY: &str = "test-key";
const LOCATOR: &str = "https://files.example/video.mp4?alt=media";

type Step = Result<(JobHandle, JobStatus), ServiceError>;

// ---------------------------------------------------------------------------
// Doubles
// ---------------------------------------------------------------------------

/// Replays scripted submit/poll responses. Once the poll script runs out
/// the job stays pending forever.
struct ScriptedService {
    submit: Mutex<Option<Step>>,
    polls: Mutex<VecDeque<Step>>,
    submit_calls: AtomicUsize,
    polled_handles: Mutex<Vec<JobHandle>>,
}

impl ScriptedService {
    fn new(submit: Step, polls: Vec<Step>) -> Self {
        Self {
            submit: Mutex::new(Some(submit)),
            polls: Mutex::new(polls.into()),
            submit_calls: AtomicUsize::new(0),
            polled_handles: Mutex::new(Vec::new()),
        }
    }

    fn network_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst) + self.polled_handles.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl GenerationService for ScriptedService {
    async fn submit(&self, _request: &GenerationRequest) -> Step {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submit
            .lock()
            .unwrap()
            .take()
            .expect("submit called more than once")
    }

    async fn poll(&self, handle: &JobHandle) -> Step {
        self.polled_handles.lock().unwrap().push(handle.clone());
        self.polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok((handle.clone(), JobStatus::pending())))
    }
}

struct StubFetcher {
    response: Mutex<Option<Result<Vec<u8>, FetchError>>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl StubFetcher {
    fn returning(response: Result<Vec<u8>, FetchError>) -> Self {
        Self {
            response: Mutex::new(Some(response)),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl AssetFetcher for StubFetcher {
    async fn fetch(&self, locator: &str, credential: &str) -> Result<Vec<u8>, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((locator.to_string(), credential.to_string()));
        self.response
            .lock()
            .unwrap()
            .take()
            .expect("fetch called more than once")
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<ProgressEvent>>,
}

impl Recorder {
    fn stages(&self) -> Vec<ProgressStage> {
        self.events.lock().unwrap().iter().map(|e| e.stage).collect()
    }
}

impl vidgen_core::progress::ProgressSink for Recorder {
    fn emit(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn pending(name: &str) -> Step {
    Ok((JobHandle::new(name), JobStatus::pending()))
}

fn finished(name: &str, locator: Option<&str>) -> Step {
    Ok((
        JobHandle::new(name),
        JobStatus::finished(locator.map(str::to_string)),
    ))
}

fn request() -> GenerationRequest {
    GenerationRequest::new("a lighthouse in a storm", None).unwrap()
}

fn no_jitter() -> BackoffConfig {
    BackoffConfig {
        max_jitter: Duration::ZERO,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// Two pending polls then a finished one: bytes come back unchanged and
/// progress runs submitting -> polling x2 -> fetching -> complete.
#[tokio::test(start_paused = true)]
async fn resolves_with_fetched_bytes_after_polling() {
    let service = ScriptedService::new(
        pending("operations/1"),
        vec![pending("operations/2"), finished("operations/3", Some(LOCATOR))],
    );
    let fetcher = StubFetcher::returning(Ok(b"mp4-bytes".to_vec()));
    let client = JobClient::new(service, fetcher, Some(KEY.into()));
    let recorder = Recorder::default();

    let bytes = client.generate(&request(), &recorder).await.unwrap();

    assert_eq!(bytes, b"mp4-bytes");
    assert_eq!(
        recorder.stages(),
        vec![
            ProgressStage::Submitting,
            ProgressStage::Polling { attempt: 0 },
            ProgressStage::Polling { attempt: 1 },
            ProgressStage::Fetching,
            ProgressStage::Complete,
        ]
    );
}

/// Each poll uses the handle returned by the previous call.
#[tokio::test(start_paused = true)]
async fn polls_with_latest_handle_and_passes_credential_to_fetcher() {
    let service = ScriptedService::new(
        pending("operations/1"),
        vec![pending("operations/2"), finished("operations/3", Some(LOCATOR))],
    );
    let fetcher = StubFetcher::returning(Ok(vec![1, 2, 3]));
    let client = JobClient::new(service, fetcher, Some(KEY.into()));

    client.generate(&request(), &|_: ProgressEvent| {}).await.unwrap();

    let polled: Vec<String> = client.service()
        .polled_handles
        .lock()
        .unwrap()
        .iter()
        .map(|h| h.as_str().to_string())
        .collect();
    assert_eq!(polled, vec!["operations/1", "operations/2"]);
    assert_eq!(
        *client.fetcher().calls.lock().unwrap(),
        vec![(LOCATOR.to_string(), KEY.to_string())]
    );
}

/// Without jitter the waits are exactly 10s then 20s.
#[tokio::test(start_paused = true)]
async fn waits_follow_exponential_backoff() {
    let service = ScriptedService::new(
        pending("operations/1"),
        vec![pending("operations/1"), finished("operations/1", Some(LOCATOR))],
    );
    let fetcher = StubFetcher::returning(Ok(vec![0]));
    let client = JobClient::new(service, fetcher, Some(KEY.into())).with_backoff(no_jitter());

    let started = tokio::time::Instant::now();
    client.generate(&request(), &|_: ProgressEvent| {}).await.unwrap();

    assert_eq!(started.elapsed(), Duration::from_secs(30));
}

/// A job that is done straight away is fetched without polling.
#[tokio::test(start_paused = true)]
async fn finished_on_submit_skips_polling() {
    let service = ScriptedService::new(finished("operations/1", Some(LOCATOR)), vec![]);
    let fetcher = StubFetcher::returning(Ok(vec![9]));
    let client = JobClient::new(service, fetcher, Some(KEY.into()));
    let recorder = Recorder::default();

    let started = tokio::time::Instant::now();
    assert_eq!(client.generate(&request(), &recorder).await.unwrap(), vec![9]);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(
        recorder.stages(),
        vec![
            ProgressStage::Submitting,
            ProgressStage::Fetching,
            ProgressStage::Complete
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn missing_locator_fails_without_fetching() {
    let service = ScriptedService::new(
        pending("operations/1"),
        vec![finished("operations/1", None)],
    );
    let fetcher = StubFetcher::returning(Ok(vec![1]));
    let client = JobClient::new(service, fetcher, Some(KEY.into()));

    let err = client.generate(&request(), &|_: ProgressEvent| {}).await.unwrap_err();

    assert_eq!(err, GenerationError::MissingResult);
    assert_eq!(client.fetcher().call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn blank_locator_counts_as_missing() {
    let service = ScriptedService::new(finished("operations/1", Some("")), vec![]);
    let fetcher = StubFetcher::returning(Ok(vec![1]));
    let client = JobClient::new(service, fetcher, Some(KEY.into()));

    let err = client.generate(&request(), &|_: ProgressEvent| {}).await.unwrap_err();

    assert_eq!(err, GenerationError::MissingResult);
    assert_eq!(client.fetcher().call_count(), 0);
}

#[tokio::test]
async fn missing_credential_fails_before_any_network_call() {
    for credential in [None, Some("   ".to_string())] {
        let service = ScriptedService::new(pending("operations/1"), vec![]);
        let fetcher = StubFetcher::returning(Ok(vec![1]));
        let client = JobClient::new(service, fetcher, credential);
        let recorder = Recorder::default();

        let err = client.generate(&request(), &recorder).await.unwrap_err();

        assert_matches!(err, GenerationError::Configuration(_));
        assert_eq!(client.service().network_calls(), 0);
        assert_eq!(client.fetcher().call_count(), 0);
        assert!(recorder.stages().is_empty());
    }
}

#[tokio::test(start_paused = true)]
async fn throttled_submit_is_rate_limited_and_not_retried() {
    let service = ScriptedService::new(
        Err(ServiceError::Api {
            status: 429,
            body: r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#.into(),
        }),
        vec![],
    );
    let fetcher = StubFetcher::returning(Ok(vec![1]));
    let client = JobClient::new(service, fetcher, Some(KEY.into()));

    let err = client.generate(&request(), &|_: ProgressEvent| {}).await.unwrap_err();

    assert_eq!(err, GenerationError::RateLimited);
    assert_eq!(client.service().network_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn poll_failure_is_generic_with_message() {
    let service = ScriptedService::new(
        pending("operations/1"),
        vec![Err(ServiceError::Transport("network unreachable".into()))],
    );
    let fetcher = StubFetcher::returning(Ok(vec![1]));
    let client = JobClient::new(service, fetcher, Some(KEY.into()));

    let err = client.generate(&request(), &|_: ProgressEvent| {}).await.unwrap_err();

    assert_matches!(err, GenerationError::Generic(msg) if msg.contains("network unreachable"));
    assert_eq!(client.fetcher().call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn exhausted_operation_is_rate_limited() {
    let service = ScriptedService::new(
        pending("operations/1"),
        vec![Err(ServiceError::Operation {
            code: 8,
            message: "RESOURCE_EXHAUSTED".into(),
        })],
    );
    let fetcher = StubFetcher::returning(Ok(vec![1]));
    let client = JobClient::new(service, fetcher, Some(KEY.into()));

    let err = client.generate(&request(), &|_: ProgressEvent| {}).await.unwrap_err();

    assert_eq!(err, GenerationError::RateLimited);
}

#[tokio::test(start_paused = true)]
async fn failed_download_carries_status_and_body() {
    let service = ScriptedService::new(finished("operations/1", Some(LOCATOR)), vec![]);
    let fetcher = StubFetcher::returning(Err(FetchError::Status {
        status: 500,
        body: "backend exploded".into(),
    }));
    let client = JobClient::new(service, fetcher, Some(KEY.into()));
    let recorder = Recorder::default();

    let err = client.generate(&request(), &recorder).await.unwrap_err();

    assert_eq!(
        err,
        GenerationError::Download {
            status: 500,
            body: "backend exploded".into()
        }
    );
    assert!(!recorder.stages().contains(&ProgressStage::Complete));
}

#[tokio::test(start_paused = true)]
async fn cancelled_token_stops_before_submitting() {
    let service = ScriptedService::new(pending("operations/1"), vec![]);
    let fetcher = StubFetcher::returning(Ok(vec![1]));
    let client = JobClient::new(service, fetcher, Some(KEY.into()));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client
        .generate_with_cancel(&request(), &|_: ProgressEvent| {}, &cancel)
        .await
        .unwrap_err();

    assert_eq!(err, GenerationError::Cancelled);
    assert_eq!(client.service().network_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_poll_sleep() {
    let service = ScriptedService::new(pending("operations/1"), vec![]);
    let fetcher = StubFetcher::returning(Ok(vec![1]));
    let client = JobClient::new(service, fetcher, Some(KEY.into()));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });

    let err = client
        .generate_with_cancel(&request(), &|_: ProgressEvent| {}, &cancel)
        .await
        .unwrap_err();

    assert_eq!(err, GenerationError::Cancelled);
    assert!(client.service().polled_handles.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn deadline_bounds_endless_polling() {
    let service = ScriptedService::new(pending("operations/1"), vec![]);
    let fetcher = StubFetcher::returning(Ok(vec![1]));
    let client = JobClient::new(service, fetcher, Some(KEY.into()))
        .with_deadline(Some(Duration::from_secs(300)));

    let err = client.generate(&request(), &|_: ProgressEvent| {}).await.unwrap_err();

    assert_eq!(err, GenerationError::DeadlineExceeded);
    assert_eq!(client.fetcher().call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn encoded_entry_point_validates_input() {
    let service = ScriptedService::new(finished("operations/1", Some(LOCATOR)), vec![]);
    let fetcher = StubFetcher::returning(Ok(vec![7]));
    let client = JobClient::new(service, fetcher, Some(KEY.into()));

    let err = client
        .generate_encoded("a fox", Some(("aGVsbG8=", "image/gif")), &|_: ProgressEvent| {})
        .await
        .unwrap_err();
    assert_matches!(err, GenerationError::InvalidRequest(_));
    assert_eq!(client.service().network_calls(), 0);

    let bytes = client
        .generate_encoded("a fox", Some(("aGVsbG8=", "image/png")), &|_: ProgressEvent| {})
        .await
        .unwrap();
    assert_eq!(bytes, vec![7]);
}
