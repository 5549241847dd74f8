use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Content rating carried by a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rating {
    Safe,
    Suggestive,
    Mature,
}

/// Kind of work a submission represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionType {
    Artwork,
    Video,
    Animation,
}

/// Normalized metadata, identical in shape for every source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Public page of the work on its source.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
    #[serde(default)]
    pub creator: String,
    pub submission_type: SubmissionType,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub original_date: DateTime<Utc>,
}

/// Canonical unit of harvested content.
///
/// `canonical_id` is unique within a source; together with the manifest's
/// source name it identifies the record across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub canonical_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_mime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_size: Option<u64>,
    pub view_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub submission: Submission,
}

impl Record {
    /// Local file name of the payload: `<canonicalId>.<canonicalFormat>`.
    ///
    /// Returns `None` for text-only records that carry no payload format.
    pub fn file_name(&self) -> Option<String> {
        self.canonical_format
            .as_deref()
            .filter(|f| !f.is_empty())
            .map(|format| format!("{}.{}", self.canonical_id, format))
    }
}

/// Derive a rating from a tag set. First match wins: safe, suggestive,
/// then grimdark/explicit.
pub fn rating_from_tags<'a, I>(tags: I) -> Option<Rating>
where
    I: IntoIterator<Item = &'a str> + Clone,
{
    let has = |wanted: &str| tags.clone().into_iter().any(|t| t == wanted);
    if has("safe") {
        Some(Rating::Safe)
    } else if has("suggestive") {
        Some(Rating::Suggestive)
    } else if has("grimdark") || has("explicit") {
        Some(Rating::Mature)
    } else {
        None
    }
}

/// Comma-joined names captured from `artist:<name>` tags, in tag order.
pub fn creator_from_tags<'a, I>(tags: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    tags.into_iter()
        .filter_map(|t| t.split_once("artist:").map(|(_, name)| name))
        .collect::<Vec<_>>()
        .join(",")
}

/// `Artwork` for still images, `Video` for everything else.
pub fn submission_type_for(animated: bool, mime: &str) -> SubmissionType {
    if !animated && mime.contains("image/") {
        SubmissionType::Artwork
    } else {
        SubmissionType::Video
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    compute_bytes_hash(content.as_bytes())
}

/// Compute a SHA-256 hash of raw bytes, returned as 64-char hex.
pub fn compute_bytes_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}
