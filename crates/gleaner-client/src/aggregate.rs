use std::time::Duration;

use gleaner_core::error::{AppError, PublishStep};
use gleaner_core::publish::{AttachmentRequest, AttachmentTicket, SubmissionPayload};
use gleaner_core::traits::{DedupIndex, Publisher};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use uuid::Uuid;

use crate::page_client::{USER_AGENT, transport_error};

pub const DEFAULT_BASE_URL: &str = "https://ponyaggregate.com";
const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(120);

/// Client for the aggregation service that receives published records.
///
/// Every call except the presigned upload carries the bearer credential.
#[derive(Clone)]
pub struct AggregateClient {
    client: Client,
    base_url: String,
    token: String,
    timeout_secs: u64,
}

impl AggregateClient {
    pub fn new(token: &str) -> Result<Self, AppError> {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(token: &str, base_url: &str) -> Result<Self, AppError> {
        Self::build(token, base_url, DEFAULT_PUBLISH_TIMEOUT)
    }

    pub fn with_timeout(self, timeout: Duration) -> Result<Self, AppError> {
        Self::build(&self.token, &self.base_url, timeout)
    }

    fn build(token: &str, base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        if token.trim().is_empty() {
            return Err(AppError::ConfigError(
                "Aggregation service token is empty".into(),
            ));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            timeout_secs: timeout.as_secs(),
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header(AUTHORIZATION, format!("Bearer {}", self.token))
    }

    async fn send(&self, step: PublishStep, request: RequestBuilder) -> Result<Response, AppError> {
        let response = request
            .send()
            .await
            .map_err(|e| AppError::publish(step, transport_error(e, self.timeout_secs).to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let status_code = status.as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiError>(&body)
            .map(|e| e.message)
            .unwrap_or_else(|_| format!("HTTP {status_code}: {body}"));
        Err(AppError::publish(step, message))
    }
}

#[derive(Deserialize)]
struct ExistsResponse {
    exists: bool,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(alias = "error")]
    message: String,
}

impl DedupIndex for AggregateClient {
    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        let url = format!("{}/api/attachments/check/{key}", self.base_url);
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Fetch {
                status: status.as_u16(),
                url,
            });
        }

        let body: ExistsResponse = response
            .json()
            .await
            .map_err(|e| AppError::NetworkError(format!("Malformed existence check: {e}")))?;
        Ok(body.exists)
    }
}

impl Publisher for AggregateClient {
    async fn create_attachment(
        &self,
        request: &AttachmentRequest,
    ) -> Result<AttachmentTicket, AppError> {
        let step = PublishStep::CreateAttachment;
        let url = format!("{}/api/attachments/create", self.base_url);
        let response = self
            .send(step, self.authorized(self.client.post(&url)).json(request))
            .await?;

        let ticket: AttachmentTicket = response
            .json()
            .await
            .map_err(|e| AppError::publish(step, format!("Malformed attachment ticket: {e}")))?;
        tracing::debug!(attachment_id = %ticket.id, "Attachment created");
        Ok(ticket)
    }

    async fn upload(
        &self,
        ticket: &AttachmentTicket,
        mime: &str,
        body: Vec<u8>,
    ) -> Result<(), AppError> {
        // The presigned URL carries its own authorization.
        let request = self
            .client
            .put(&ticket.presigned_url)
            .header(CONTENT_TYPE, mime)
            .header(CONTENT_LENGTH, body.len())
            .body(body);
        self.send(PublishStep::Upload, request).await?;
        Ok(())
    }

    async fn finalize(&self, attachment_id: Uuid) -> Result<(), AppError> {
        let url = format!("{}/api/attachments/{attachment_id}/finalize", self.base_url);
        self.send(PublishStep::Finalize, self.authorized(self.client.put(&url)))
            .await?;
        Ok(())
    }

    async fn create_submission(&self, payload: &SubmissionPayload) -> Result<(), AppError> {
        let url = format!("{}/api/submissions/new", self.base_url);
        self.send(
            PublishStep::CreateSubmission,
            self.authorized(self.client.post(&url)).json(payload),
        )
        .await?;
        Ok(())
    }
}
