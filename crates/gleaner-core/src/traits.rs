use std::future::Future;
use std::path::Path;

use url::Url;
use uuid::Uuid;

use crate::error::AppError;
use crate::publish::{AttachmentRequest, AttachmentTicket, SubmissionPayload};

/// Fetches one page of a source's list endpoint as JSON.
///
/// Implementations map HTTP 429 to [`AppError::Throttled`] and any other
/// non-success status to [`AppError::Fetch`].
pub trait PageClient: Send + Sync + Clone {
    fn get_json(&self, url: &Url)
    -> impl Future<Output = Result<serde_json::Value, AppError>> + Send;
}

/// A small resource read into memory, with the content type the server declared.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedBytes {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Moves a record's binary payload from its `viewUrl` to a local path.
pub trait PayloadFetcher: Send + Sync + Clone {
    /// Returns the number of bytes written.
    fn fetch_to_path(
        &self,
        url: &str,
        target: &Path,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    /// Read a small resource such as a thumbnail into memory.
    fn fetch_bytes(&self, url: &str) -> impl Future<Output = Result<FetchedBytes, AppError>> + Send {
        let url = url.to_string();
        async move {
            Err(AppError::ConfigError(format!(
                "This fetcher cannot read {url} into memory"
            )))
        }
    }
}

/// Existence check consulted before any transfer.
///
/// Answers are advisory: a false "absent" must never corrupt state.
pub trait DedupIndex: Send + Sync + Clone {
    fn exists(&self, key: &str) -> impl Future<Output = Result<bool, AppError>> + Send;
}

/// The aggregation service that receives published records.
// TODO: Support resuming an attachment whose upload succeeded but finalize failed
pub trait Publisher: Send + Sync + Clone {
    /// Request a presigned upload destination for a payload.
    fn create_attachment(
        &self,
        request: &AttachmentRequest,
    ) -> impl Future<Output = Result<AttachmentTicket, AppError>> + Send;

    /// Stream the payload to the presigned destination.
    fn upload(
        &self,
        ticket: &AttachmentTicket,
        mime: &str,
        body: Vec<u8>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn finalize(&self, attachment_id: Uuid) -> impl Future<Output = Result<(), AppError>> + Send;

    fn create_submission(
        &self,
        payload: &SubmissionPayload,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// A publisher for download-only runs. Every publish step fails and the
/// existence check always answers "absent".
#[derive(Debug, Clone)]
pub struct NullPublisher;

impl DedupIndex for NullPublisher {
    async fn exists(&self, _key: &str) -> Result<bool, AppError> {
        Ok(false)
    }
}

impl Publisher for NullPublisher {
    async fn create_attachment(
        &self,
        _request: &AttachmentRequest,
    ) -> Result<AttachmentTicket, AppError> {
        Err(AppError::ConfigError("No publisher configured".into()))
    }

    async fn upload(
        &self,
        _ticket: &AttachmentTicket,
        _mime: &str,
        _body: Vec<u8>,
    ) -> Result<(), AppError> {
        Err(AppError::ConfigError("No publisher configured".into()))
    }

    async fn finalize(&self, _attachment_id: Uuid) -> Result<(), AppError> {
        Err(AppError::ConfigError("No publisher configured".into()))
    }

    async fn create_submission(&self, _payload: &SubmissionPayload) -> Result<(), AppError> {
        Err(AppError::ConfigError("No publisher configured".into()))
    }
}

/// A payload fetcher for publish-only runs.
#[derive(Debug, Clone)]
pub struct NullFetcher;

impl PayloadFetcher for NullFetcher {
    async fn fetch_to_path(&self, _url: &str, _target: &Path) -> Result<u64, AppError> {
        Err(AppError::ConfigError("No payload fetcher configured".into()))
    }
}
