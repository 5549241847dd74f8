use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Record, Submission};

/// Body of the create-attachment call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttachmentRequest {
    pub name: String,
    pub mime: String,
    pub size: u64,
}

/// Upload destination handed out by the aggregation service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentTicket {
    pub presigned_url: String,
    /// Correlation id used to finalize the upload.
    #[serde(alias = "uuid")]
    pub id: Uuid,
}

/// Submission metadata sent as the last publish step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    #[serde(flatten)]
    pub submission: Submission,
    pub attachments: Vec<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_mime: Option<String>,
    /// `data:<mime>;base64,<payload>` URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

impl SubmissionPayload {
    /// Build the payload for `record`. Image payloads double as their own
    /// thumbnail and are embedded inline.
    pub fn new(record: &Record, attachment_id: Uuid, mime: &str, payload: &[u8]) -> Self {
        let (thumbnail_mime, thumbnail) = if mime.starts_with("image/") {
            (
                Some(mime.to_string()),
                Some(format!("data:{mime};base64,{}", STANDARD.encode(payload))),
            )
        } else {
            (None, None)
        };

        Self {
            submission: record.submission.clone(),
            attachments: vec![attachment_id],
            thumbnail_mime,
            thumbnail,
        }
    }

    /// Embed a separately fetched thumbnail, replacing any inline one.
    pub fn with_thumbnail(mut self, mime: &str, bytes: &[u8]) -> Self {
        self.thumbnail_mime = Some(mime.to_string());
        self.thumbnail = Some(format!("data:{mime};base64,{}", STANDARD.encode(bytes)));
        self
    }
}
