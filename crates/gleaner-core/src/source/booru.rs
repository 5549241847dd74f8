use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{PageParams, PageRequest, RawPage, Source, SourceAdapter, endpoint_url};
use crate::error::AppError;
use crate::models::{
    Record, Submission, creator_from_tags, rating_from_tags, submission_type_for,
};

/// Adapter for the Philomena-style image boards.
#[derive(Debug, Clone)]
pub struct BooruAdapter {
    source: Source,
}

impl BooruAdapter {
    pub fn new(source: Source) -> Self {
        Self { source }
    }
}

/// One image as returned by the search endpoint. Only the fields the
/// normalizer reads are declared.
#[derive(Debug, Deserialize)]
struct BooruImage {
    id: u64,
    format: Option<String>,
    mime_type: Option<String>,
    size: Option<u64>,
    view_url: String,
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    animated: bool,
    first_seen_at: Option<String>,
}

impl SourceAdapter for BooruAdapter {
    fn source(&self) -> Source {
        self.source
    }

    fn build_page_request(
        &self,
        query: &str,
        params: PageParams<'_>,
        api_key: Option<&str>,
    ) -> Result<PageRequest, AppError> {
        let mut url = endpoint_url(self.source)?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(key) = api_key {
                pairs.append_pair("key", key);
            }
            pairs
                .append_pair("q", query)
                .append_pair("per_page", &params.per_page.to_string())
                .append_pair("page", &params.page.to_string());
        }
        Ok(PageRequest::new(url))
    }

    fn extract_entries(&self, body: serde_json::Value) -> Result<RawPage, AppError> {
        let envelope = match self.source {
            Source::Twibooru => ["posts", "pages"]
                .into_iter()
                .find_map(|key| body.get(key).and_then(|v| v.as_array())),
            _ => body.get("images").and_then(|v| v.as_array()),
        };

        let entries = envelope
            .cloned()
            .ok_or_else(|| {
                AppError::Normalization(format!("{} page has no entry list", self.source))
            })?;

        Ok(RawPage {
            entries,
            next_cursor: None,
        })
    }

    fn normalize(&self, entry: &serde_json::Value) -> Result<Record, AppError> {
        let image: BooruImage = serde_json::from_value(entry.clone())
            .map_err(|e| AppError::Normalization(format!("Malformed {} entry: {e}", self.source)))?;

        let first_seen = image.first_seen_at.as_deref().ok_or_else(|| {
            AppError::Normalization(format!("Entry {} has no first_seen_at", image.id))
        })?;
        let original_date = DateTime::parse_from_rfc3339(first_seen)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| {
                AppError::Normalization(format!(
                    "Entry {} has unparsable first_seen_at '{first_seen}': {e}",
                    image.id
                ))
            })?;

        let tags = || image.tags.iter().map(String::as_str);
        let mime = image.mime_type.clone().unwrap_or_default();
        let canonical_id = image.id.to_string();

        Ok(Record {
            canonical_format: image.format.clone(),
            canonical_mime: image.mime_type.clone(),
            canonical_size: image.size,
            view_url: image.view_url.clone(),
            thumbnail_url: None,
            submission: Submission {
                name: image.name.clone().unwrap_or_else(|| canonical_id.clone()),
                description: image.description.clone().unwrap_or_default(),
                tags: image.tags.iter().cloned().collect(),
                source: format!("{}{}", self.source.public_url_prefix(), image.id),
                rating: rating_from_tags(tags()),
                creator: creator_from_tags(tags()),
                submission_type: submission_type_for(image.animated, &mime),
                original_date,
            },
            canonical_id,
        })
    }
}
