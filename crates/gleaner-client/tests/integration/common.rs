use std::collections::BTreeSet;

use chrono::{TimeZone, Utc};
use gleaner_core::error::AppError;
use gleaner_core::models::{Rating, Record, Submission, SubmissionType};
use gleaner_core::source::{
    BooruAdapter, PageParams, PageRequest, RawPage, Source, SourceAdapter,
};
use url::Url;

/// A raw booru entry whose payload is served by the mock server.
pub fn booru_image(id: u64, server_uri: &str, first_seen_at: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "format": "png",
        "mime_type": "image/png",
        "size": 4,
        "animated": false,
        "view_url": format!("{server_uri}/img/{id}.png"),
        "name": format!("image {id}"),
        "description": "",
        "tags": ["safe", "artist:mock"],
        "first_seen_at": first_seen_at,
    })
}

pub fn sample_record(id: &str, view_url: &str) -> Record {
    Record {
        canonical_id: id.to_string(),
        canonical_format: Some("png".into()),
        canonical_mime: Some("image/png".into()),
        canonical_size: Some(4),
        view_url: view_url.to_string(),
        thumbnail_url: None,
        submission: Submission {
            name: format!("image {id}"),
            description: String::new(),
            tags: BTreeSet::from(["safe".to_string()]),
            source: format!("https://derpibooru.org/images/{id}"),
            rating: Some(Rating::Safe),
            creator: "mock".into(),
            submission_type: SubmissionType::Artwork,
            original_date: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        },
    }
}

/// Derpibooru's adapter with its requests pointed at a local mock server.
pub struct LocalBooru {
    inner: BooruAdapter,
    base: Url,
}

impl LocalBooru {
    pub fn new(server_uri: &str) -> Self {
        Self {
            inner: BooruAdapter::new(Source::Derpibooru),
            base: Url::parse(server_uri).unwrap(),
        }
    }
}

impl SourceAdapter for LocalBooru {
    fn source(&self) -> Source {
        self.inner.source()
    }

    fn build_page_request(
        &self,
        query: &str,
        params: PageParams<'_>,
        api_key: Option<&str>,
    ) -> Result<PageRequest, AppError> {
        let upstream = self.inner.build_page_request(query, params, api_key)?;
        let mut url = self
            .base
            .join(upstream.url.path())
            .map_err(|e| AppError::ConfigError(e.to_string()))?;
        url.set_query(upstream.url.query());
        Ok(PageRequest::new(url))
    }

    fn extract_entries(&self, body: serde_json::Value) -> Result<RawPage, AppError> {
        self.inner.extract_entries(body)
    }

    fn normalize(&self, entry: &serde_json::Value) -> Result<Record, AppError> {
        self.inner.normalize(entry)
    }
}
