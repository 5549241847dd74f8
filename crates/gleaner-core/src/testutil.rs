//! Test utilities: mock implementations of the core traits plus fixtures.
//!
//! All mocks use `Arc<Mutex<_>>` for interior mutability, so clones handed
//! to the engine share state with the copy the test asserts on.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use url::Url;
use uuid::Uuid;

use crate::error::{AppError, PublishStep};
use crate::models::{Rating, Record, Submission, SubmissionType};
use crate::publish::{AttachmentRequest, AttachmentTicket, SubmissionPayload};
use crate::report::{RunEvent, RunReporter};
use crate::traits::{DedupIndex, FetchedBytes, PageClient, PayloadFetcher, Publisher};

// ---------------------------------------------------------------------------
// MockPageClient
// ---------------------------------------------------------------------------

/// Page client that replays a queue of responses and records requested URLs.
#[derive(Clone)]
pub struct MockPageClient {
    /// Each call pops the front. When empty, returns an empty `images` page.
    responses: Arc<Mutex<VecDeque<Result<serde_json::Value, AppError>>>>,
    pub requested: Arc<Mutex<Vec<Url>>>,
}

impl MockPageClient {
    pub fn with_responses(responses: Vec<Result<serde_json::Value, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            requested: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Query parameter `name` of every requested URL, in order.
    pub fn param(&self, name: &str) -> Vec<Option<String>> {
        self.requested
            .lock()
            .unwrap()
            .iter()
            .map(|url| {
                url.query_pairs()
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v.into_owned())
            })
            .collect()
    }
}

impl PageClient for MockPageClient {
    async fn get_json(&self, url: &Url) -> Result<serde_json::Value, AppError> {
        self.requested.lock().unwrap().push(url.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(serde_json::json!({"images": []})))
    }
}

// ---------------------------------------------------------------------------
// MockPayloadFetcher
// ---------------------------------------------------------------------------

/// Payload fetcher that writes fixed bytes, optionally failing first.
#[derive(Clone)]
pub struct MockPayloadFetcher {
    body: Arc<Vec<u8>>,
    /// Scripted results consumed one per call; `Ok` writes `body`.
    script: Arc<Mutex<VecDeque<Result<(), AppError>>>>,
    /// Served by `fetch_bytes`; `None` answers 404.
    thumbnail: Option<FetchedBytes>,
    pub calls: Arc<Mutex<Vec<String>>>,
    pub thumbnail_calls: Arc<Mutex<Vec<String>>>,
}

impl MockPayloadFetcher {
    pub fn new(body: &[u8]) -> Self {
        Self::with_script(body, Vec::new())
    }

    pub fn with_script(body: &[u8], script: Vec<Result<(), AppError>>) -> Self {
        Self {
            body: Arc::new(body.to_vec()),
            script: Arc::new(Mutex::new(script.into())),
            thumbnail: None,
            calls: Arc::new(Mutex::new(Vec::new())),
            thumbnail_calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_thumbnail(mut self, bytes: &[u8], content_type: Option<&str>) -> Self {
        self.thumbnail = Some(FetchedBytes {
            bytes: bytes.to_vec(),
            content_type: content_type.map(str::to_string),
        });
        self
    }
}

impl PayloadFetcher for MockPayloadFetcher {
    async fn fetch_to_path(&self, url: &str, target: &Path) -> Result<u64, AppError> {
        self.calls.lock().unwrap().push(url.to_string());
        let next = self.script.lock().unwrap().pop_front().unwrap_or(Ok(()));
        next?;
        tokio::fs::write(target, self.body.as_slice()).await?;
        Ok(self.body.len() as u64)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<FetchedBytes, AppError> {
        self.thumbnail_calls.lock().unwrap().push(url.to_string());
        self.thumbnail.clone().ok_or_else(|| AppError::Fetch {
            status: 404,
            url: url.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// MockPublisher
// ---------------------------------------------------------------------------

/// Publisher that records each step and fails the steps it is told to.
#[derive(Clone, Default)]
pub struct MockPublisher {
    existing: Arc<Mutex<HashSet<String>>>,
    failing_check: bool,
    /// Each entry fails the next call of that step once.
    failures: Arc<Mutex<Vec<PublishStep>>>,
    pub calls: Arc<Mutex<Vec<String>>>,
    pub attachment_requests: Arc<Mutex<Vec<AttachmentRequest>>>,
    pub submissions: Arc<Mutex<Vec<SubmissionPayload>>>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_existing(self, hash: &str) -> Self {
        self.existing.lock().unwrap().insert(hash.to_string());
        self
    }

    pub fn with_failing_check(mut self) -> Self {
        self.failing_check = true;
        self
    }

    pub fn with_failure(self, step: PublishStep) -> Self {
        self.failures.lock().unwrap().push(step);
        self
    }

    fn step(&self, step: PublishStep) -> Result<(), AppError> {
        self.calls.lock().unwrap().push(step.to_string());
        let mut failures = self.failures.lock().unwrap();
        if let Some(pos) = failures.iter().position(|s| *s == step) {
            failures.remove(pos);
            return Err(AppError::Fetch {
                status: 500,
                url: format!("https://aggregate.example.com/{step}"),
            });
        }
        Ok(())
    }
}

impl DedupIndex for MockPublisher {
    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        self.calls.lock().unwrap().push("exists".into());
        if self.failing_check {
            return Err(AppError::NetworkError("connection refused".into()));
        }
        Ok(self.existing.lock().unwrap().contains(key))
    }
}

impl Publisher for MockPublisher {
    async fn create_attachment(
        &self,
        request: &AttachmentRequest,
    ) -> Result<AttachmentTicket, AppError> {
        self.step(PublishStep::CreateAttachment)?;
        self.attachment_requests
            .lock()
            .unwrap()
            .push(request.clone());
        Ok(AttachmentTicket {
            presigned_url: format!("https://bucket.example.com/{}", request.name),
            id: Uuid::new_v4(),
        })
    }

    async fn upload(
        &self,
        _ticket: &AttachmentTicket,
        _mime: &str,
        _body: Vec<u8>,
    ) -> Result<(), AppError> {
        self.step(PublishStep::Upload)
    }

    async fn finalize(&self, _attachment_id: Uuid) -> Result<(), AppError> {
        self.step(PublishStep::Finalize)
    }

    async fn create_submission(&self, payload: &SubmissionPayload) -> Result<(), AppError> {
        self.step(PublishStep::CreateSubmission)?;
        self.submissions.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingReporter
// ---------------------------------------------------------------------------

/// Reporter that keeps the debug rendering of every event.
#[derive(Clone, Default)]
pub struct RecordingReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events whose variant name is `variant`.
    pub fn count(&self, variant: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.split([' ', '{']).next() == Some(variant))
            .count()
    }
}

impl RunReporter for RecordingReporter {
    fn report(&self, event: RunEvent<'_>) {
        self.events.lock().unwrap().push(format!("{event:?}"));
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A PNG record whose payload lives at `https://cdn.example.com/<id>.png`.
pub fn make_test_record(id: &str) -> Record {
    Record {
        canonical_id: id.to_string(),
        canonical_format: Some("png".into()),
        canonical_mime: Some("image/png".into()),
        canonical_size: Some(9),
        view_url: format!("https://cdn.example.com/{id}.png"),
        thumbnail_url: None,
        submission: Submission {
            name: format!("Image {id}"),
            description: "A test image".into(),
            tags: BTreeSet::from(["safe".to_string(), "artist:tester".to_string()]),
            source: format!("https://derpibooru.org/images/{id}"),
            rating: Some(Rating::Safe),
            creator: "tester".into(),
            submission_type: SubmissionType::Artwork,
            original_date: Utc.with_ymd_and_hms(2021, 6, 1, 12, 30, 0).unwrap(),
        },
    }
}

/// A raw booru search entry as the JSON API returns it.
pub fn booru_entry(id: u64, tags: &[&str], first_seen_at: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "format": "png",
        "mime_type": "image/png",
        "size": 2048,
        "animated": false,
        "view_url": format!("https://derpicdn.net/img/view/{id}.png"),
        "name": format!("image {id}"),
        "description": "uploaded for tests",
        "tags": tags,
        "first_seen_at": first_seen_at,
    })
}
