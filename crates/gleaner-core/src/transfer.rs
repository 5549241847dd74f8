use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::dedup::FsDedupIndex;
use crate::error::{AppError, PublishStep};
use crate::manifest::HarvestManifest;
use crate::models::{Record, compute_bytes_hash};
use crate::publish::{AttachmentRequest, SubmissionPayload};
use crate::rate_limit::RateLimit;
use crate::report::{RunEvent, RunReporter};
use crate::source::Source;
use crate::summary::RunSummary;
use crate::traits::{DedupIndex, FetchedBytes, PayloadFetcher, Publisher};

/// Mime type declared for payloads whose record carries none.
pub const DEFAULT_MIME: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Fetch each payload to the local directory.
    Download,
    /// Upload each local payload and its metadata to the aggregation service.
    Publish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Pending,
    Done,
    Skipped,
    Failed,
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferStatus::Pending => write!(f, "pending"),
            TransferStatus::Done => write!(f, "done"),
            TransferStatus::Skipped => write!(f, "skipped"),
            TransferStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferTarget {
    Local(PathBuf),
    Remote,
}

/// Unit of work for one record. Lives until its terminal status is reported.
#[derive(Debug, Clone)]
pub struct TransferTask {
    pub canonical_id: String,
    pub target: TransferTarget,
    pub attempts: u32,
    pub status: TransferStatus,
}

impl TransferTask {
    fn new(record: &Record, target: TransferTarget) -> Self {
        Self {
            canonical_id: record.canonical_id.clone(),
            target,
            attempts: 0,
            status: TransferStatus::Pending,
        }
    }
}

/// Terminal result of one record's transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferOutcome {
    pub canonical_id: String,
    pub status: TransferStatus,
    /// Why the record was skipped or failed.
    pub reason: Option<String>,
    pub duration: Duration,
}

/// Configuration for a transfer run.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Directory holding `<canonicalId>.<format>` payload files.
    pub payload_dir: PathBuf,
    /// Download attempts per record for retryable errors.
    pub max_attempts: u32,
    /// Base delay between download attempts, multiplied by the attempt number.
    pub retry_backoff: Duration,
    /// Publish-mode courtesy budget. Defaults to the manifest source's budget.
    pub courtesy_limit: Option<RateLimit>,
    /// Canonical ids the operator asked to leave alone.
    pub exclude: HashSet<String>,
}

impl TransferConfig {
    pub fn new(payload_dir: impl Into<PathBuf>) -> Self {
        Self {
            payload_dir: payload_dir.into(),
            max_attempts: 3,
            retry_backoff: Duration::from_secs(2),
            courtesy_limit: None,
            exclude: HashSet::new(),
        }
    }

    pub fn with_courtesy_limit(mut self, limit: RateLimit) -> Self {
        self.courtesy_limit = Some(limit);
        self
    }

    pub fn with_exclusions<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }
}

/// How a record's transfer finished when it did not fail.
enum Completion {
    Done,
    Skipped(&'static str),
}

struct Thumbnail {
    mime: String,
    bytes: Vec<u8>,
}

/// Moves payloads for the records of a manifest, one record at a time.
///
/// Per-record failures are isolated: they are recorded in the summary and
/// the run moves on to the next record.
pub struct TransferEngine<F, P>
where
    F: PayloadFetcher,
    P: Publisher + DedupIndex,
{
    fetcher: F,
    publisher: P,
    local: FsDedupIndex,
    config: TransferConfig,
    cancel: CancellationToken,
}

impl<F, P> TransferEngine<F, P>
where
    F: PayloadFetcher,
    P: Publisher + DedupIndex,
{
    pub fn new(fetcher: F, publisher: P, config: TransferConfig) -> Self {
        Self {
            fetcher,
            publisher,
            local: FsDedupIndex::new(config.payload_dir.clone()),
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Process every record of `manifest` in order.
    ///
    /// Fails only when the manifest does not verify; nothing is transferred
    /// in that case.
    pub async fn run<R: RunReporter + ?Sized>(
        &self,
        manifest: &HarvestManifest,
        mode: TransferMode,
        reporter: &R,
    ) -> Result<RunSummary, AppError> {
        manifest.verify()?;

        let started = Instant::now();
        let total = manifest.records.len();
        let courtesy = match mode {
            TransferMode::Publish => self.courtesy_limit(manifest),
            TransferMode::Download => None,
        };

        let mut summary = RunSummary::default();
        for (index, record) in manifest.records.iter().enumerate() {
            if self.cancel.is_cancelled() {
                summary.unprocessed = total - index;
                tracing::warn!(unprocessed = %summary.unprocessed, "Run cancelled");
                break;
            }

            if let Some(limit) = courtesy {
                let every = limit.requests.max(1) as usize;
                if index > 0 && index % every == 0 {
                    reporter.report(RunEvent::CourtesyPause {
                        wait: limit.interval,
                    });
                    if self.pause(limit.interval).await.is_err() {
                        summary.unprocessed = total - index;
                        tracing::warn!(unprocessed = %summary.unprocessed, "Run cancelled");
                        break;
                    }
                }
            }

            reporter.report(RunEvent::TransferStarted {
                canonical_id: &record.canonical_id,
                index: index + 1,
                total,
            });
            let outcome = self.transfer(record, mode).await;
            reporter.report(RunEvent::TransferFinished { outcome: &outcome });
            summary.record(outcome);
        }

        summary.elapsed = started.elapsed();
        Ok(summary)
    }

    /// Transfer one record. Never fails: errors become a `Failed` outcome.
    pub async fn transfer(&self, record: &Record, mode: TransferMode) -> TransferOutcome {
        let started = Instant::now();
        let target = match (mode, record.file_name()) {
            (TransferMode::Download, Some(name)) => TransferTarget::Local(self.local.path_for(&name)),
            _ => TransferTarget::Remote,
        };
        let mut task = TransferTask::new(record, target);

        let result = if self.config.exclude.contains(&record.canonical_id) {
            Ok(Completion::Skipped("excluded"))
        } else {
            match mode {
                TransferMode::Download => self.download(record, &mut task).await,
                TransferMode::Publish => self.publish(record, &mut task).await,
            }
        };

        let reason = match result {
            Ok(Completion::Done) => {
                task.status = TransferStatus::Done;
                None
            }
            Ok(Completion::Skipped(reason)) => {
                task.status = TransferStatus::Skipped;
                Some(reason.to_string())
            }
            Err(e) => {
                task.status = TransferStatus::Failed;
                Some(e.to_string())
            }
        };

        TransferOutcome {
            canonical_id: task.canonical_id,
            status: task.status,
            reason,
            duration: started.elapsed(),
        }
    }

    async fn download(
        &self,
        record: &Record,
        task: &mut TransferTask,
    ) -> Result<Completion, AppError> {
        let file_name = payload_file_name(record)?;
        if self.local.exists(&file_name).await? {
            return Ok(Completion::Skipped("already downloaded"));
        }
        let target = self.local.path_for(&file_name);

        loop {
            task.attempts += 1;
            match self.fetcher.fetch_to_path(&record.view_url, &target).await {
                Ok(bytes) => {
                    tracing::debug!(canonical_id = %record.canonical_id, %bytes, "Payload written");
                    return Ok(Completion::Done);
                }
                Err(e) if e.is_retryable() && task.attempts < self.config.max_attempts => {
                    let wait = self.config.retry_backoff * task.attempts;
                    tracing::warn!(
                        canonical_id = %record.canonical_id,
                        attempt = %task.attempts,
                        error = %e,
                        wait_ms = %wait.as_millis(),
                        "Download failed, retrying"
                    );
                    self.pause(wait).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// The publish sequence. Steps after the existence check are strictly
    /// ordered and never retried; the service cleans up orphaned uploads.
    async fn publish(
        &self,
        record: &Record,
        task: &mut TransferTask,
    ) -> Result<Completion, AppError> {
        let file_name = payload_file_name(record)?;
        task.attempts += 1;

        let payload = tokio::fs::read(self.local.path_for(&file_name)).await?;
        let hash = compute_bytes_hash(&payload);

        match self.publisher.exists(&hash).await {
            Ok(true) => return Ok(Completion::Skipped("already published")),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(
                    canonical_id = %record.canonical_id,
                    error = %e,
                    "Existence check failed, publishing anyway"
                );
            }
        }

        let mime = record.canonical_mime.as_deref().unwrap_or(DEFAULT_MIME);
        if let Some(declared) = record.canonical_size.filter(|&size| size != payload.len() as u64) {
            tracing::warn!(
                canonical_id = %record.canonical_id,
                %declared,
                actual = %payload.len(),
                "Local payload size differs from the manifest, declaring the local size"
            );
        }
        let thumbnail = if mime.starts_with("image/") {
            None
        } else {
            self.fetch_thumbnail(record).await
        };

        let request = AttachmentRequest {
            name: record.submission.name.clone(),
            mime: mime.to_string(),
            size: payload.len() as u64,
        };
        let ticket = self
            .publisher
            .create_attachment(&request)
            .await
            .map_err(|e| step_error(PublishStep::CreateAttachment, e))?;

        let mut submission = SubmissionPayload::new(record, ticket.id, mime, &payload);
        if let Some(fetched) = thumbnail {
            submission = submission.with_thumbnail(&fetched.mime, &fetched.bytes);
        }

        self.publisher
            .upload(&ticket, mime, payload)
            .await
            .map_err(|e| step_error(PublishStep::Upload, e))?;
        self.publisher
            .finalize(ticket.id)
            .await
            .map_err(|e| step_error(PublishStep::Finalize, e))?;
        self.publisher
            .create_submission(&submission)
            .await
            .map_err(|e| step_error(PublishStep::CreateSubmission, e))?;

        Ok(Completion::Done)
    }

    /// Fetch the record's remote thumbnail. Any failure just means no thumbnail.
    async fn fetch_thumbnail(&self, record: &Record) -> Option<Thumbnail> {
        let url = record.thumbnail_url.as_deref()?;
        match self.fetcher.fetch_bytes(url).await {
            Ok(FetchedBytes {
                bytes,
                content_type: Some(mime),
            }) if mime.starts_with("image/") => Some(Thumbnail { mime, bytes }),
            Ok(fetched) => {
                tracing::warn!(
                    canonical_id = %record.canonical_id,
                    content_type = fetched.content_type.as_deref().unwrap_or("none"),
                    "Thumbnail is not an image, publishing without it"
                );
                None
            }
            Err(e) => {
                tracing::warn!(
                    canonical_id = %record.canonical_id,
                    error = %e,
                    "Thumbnail fetch failed, publishing without it"
                );
                None
            }
        }
    }

    fn courtesy_limit(&self, manifest: &HarvestManifest) -> Option<RateLimit> {
        self.config.courtesy_limit.or_else(|| {
            manifest
                .source
                .parse::<Source>()
                .ok()
                .map(|source| source.rate_limit())
        })
    }

    async fn pause(&self, wait: Duration) -> Result<(), AppError> {
        tokio::select! {
            () = tokio::time::sleep(wait) => Ok(()),
            () = self.cancel.cancelled() => Err(AppError::Cancelled),
        }
    }
}

fn payload_file_name(record: &Record) -> Result<String, AppError> {
    record.file_name().ok_or_else(|| {
        AppError::Normalization(format!(
            "Record {} has no payload format",
            record.canonical_id
        ))
    })
}

fn step_error(step: PublishStep, error: AppError) -> AppError {
    match error {
        AppError::PublishStep { .. } => error,
        other => AppError::publish(step, other.to_string()),
    }
}
