use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Datelike, Utc};
use serde::Deserialize;
use url::Url;

use super::{PageParams, PageRequest, Pagination, RawPage, Source, SourceAdapter, endpoint_url};
use crate::error::AppError;
use crate::models::{Rating, Record, Submission, SubmissionType};

const CHANNELS_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/channels";
const VIDEOS_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/videos";

/// Adapter for a channel's uploads on the YouTube Data API.
///
/// The operator supplies a channel handle; it is resolved to the channel's
/// uploads playlist, which is then walked with continuation tokens.
#[derive(Debug, Clone, Default)]
pub struct YouTubeAdapter;

impl YouTubeAdapter {
    pub fn new() -> Self {
        Self
    }

    fn require_key(api_key: Option<&str>) -> Result<&str, AppError> {
        api_key.ok_or_else(|| {
            AppError::ConfigError(format!(
                "youtube requires an API key ({})",
                Source::YouTube.api_key_env()
            ))
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItem {
    snippet: Snippet,
    content_details: ContentDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    title: String,
    #[serde(default)]
    description: String,
    published_at: Option<String>,
    channel_title: Option<String>,
    video_owner_channel_title: Option<String>,
    #[serde(default)]
    thumbnails: HashMap<String, Thumbnail>,
    /// Uploader tags; only present once merged from the videos endpoint.
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentDetails {
    video_id: String,
    video_published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
    #[serde(default)]
    width: u64,
    #[serde(default)]
    height: u64,
}

#[derive(Debug, Deserialize)]
struct VideoList {
    #[serde(default)]
    items: Vec<Video>,
}

#[derive(Debug, Deserialize)]
struct Video {
    id: String,
    #[serde(default)]
    snippet: VideoSnippet,
}

#[derive(Debug, Default, Deserialize)]
struct VideoSnippet {
    #[serde(default)]
    tags: Vec<String>,
}

fn video_id(entry: &serde_json::Value) -> Option<&str> {
    entry.pointer("/contentDetails/videoId").and_then(|v| v.as_str())
}

impl SourceAdapter for YouTubeAdapter {
    fn source(&self) -> Source {
        Source::YouTube
    }

    fn pagination(&self) -> Pagination {
        Pagination::Cursor
    }

    fn resolve_request(
        &self,
        query: &str,
        api_key: Option<&str>,
    ) -> Result<Option<PageRequest>, AppError> {
        let key = Self::require_key(api_key)?;
        let mut url = Url::parse(CHANNELS_ENDPOINT)
            .map_err(|e| AppError::ConfigError(format!("Invalid channels endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("key", key)
            .append_pair("part", "contentDetails")
            .append_pair("forHandle", query)
            .append_pair("maxResults", "1");
        Ok(Some(PageRequest::new(url)))
    }

    fn resolve_query(&self, body: serde_json::Value) -> Result<String, AppError> {
        body.pointer("/items/0/contentDetails/relatedPlaylists/uploads")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::ConfigError("Channel lookup returned no uploads playlist".into())
            })
    }

    /// Playlist items carry no uploader tags, so each page is followed by one
    /// batched `videos?part=snippet` lookup.
    fn details_request(
        &self,
        entries: &[serde_json::Value],
        api_key: Option<&str>,
    ) -> Result<Option<PageRequest>, AppError> {
        let ids: Vec<&str> = entries.iter().filter_map(video_id).collect();
        if ids.is_empty() {
            return Ok(None);
        }
        let key = Self::require_key(api_key)?;
        let mut url = Url::parse(VIDEOS_ENDPOINT)
            .map_err(|e| AppError::ConfigError(format!("Invalid videos endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("key", key)
            .append_pair("part", "snippet")
            .append_pair("id", &ids.join(","))
            .append_pair("maxResults", &ids.len().to_string());
        Ok(Some(PageRequest::new(url)))
    }

    fn merge_details(
        &self,
        entries: &mut [serde_json::Value],
        body: serde_json::Value,
    ) -> Result<(), AppError> {
        let details: VideoList = serde_json::from_value(body)
            .map_err(|e| AppError::Normalization(format!("Malformed youtube video list: {e}")))?;
        let mut tags_by_id: HashMap<String, Vec<String>> = details
            .items
            .into_iter()
            .map(|video| (video.id, video.snippet.tags))
            .collect();

        for entry in entries.iter_mut() {
            let Some(tags) = video_id(entry).and_then(|id| tags_by_id.remove(id)) else {
                continue;
            };
            if let Some(snippet) = entry.get_mut("snippet").and_then(|s| s.as_object_mut()) {
                snippet.insert("tags".into(), serde_json::json!(tags));
            }
        }
        Ok(())
    }

    fn build_page_request(
        &self,
        query: &str,
        params: PageParams<'_>,
        api_key: Option<&str>,
    ) -> Result<PageRequest, AppError> {
        let key = Self::require_key(api_key)?;
        let mut url = endpoint_url(Source::YouTube)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("key", key)
                .append_pair("part", "snippet,contentDetails")
                .append_pair("maxResults", &params.per_page.to_string())
                .append_pair("playlistId", query);
            if let Some(token) = params.cursor {
                pairs.append_pair("pageToken", token);
            }
        }
        Ok(PageRequest::new(url))
    }

    fn extract_entries(&self, body: serde_json::Value) -> Result<RawPage, AppError> {
        let next_cursor = body
            .get("nextPageToken")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let entries = body
            .get("items")
            .and_then(|v| v.as_array())
            .cloned()
            .ok_or_else(|| AppError::Normalization("youtube page has no items".into()))?;
        Ok(RawPage {
            entries,
            next_cursor,
        })
    }

    fn normalize(&self, entry: &serde_json::Value) -> Result<Record, AppError> {
        let item: PlaylistItem = serde_json::from_value(entry.clone())
            .map_err(|e| AppError::Normalization(format!("Malformed youtube entry: {e}")))?;
        let video_id = item.content_details.video_id;

        let published = item
            .content_details
            .video_published_at
            .as_deref()
            .or(item.snippet.published_at.as_deref())
            .ok_or_else(|| {
                AppError::Normalization(format!("Video {video_id} has no publish date"))
            })?;
        let original_date: DateTime<Utc> = DateTime::parse_from_rfc3339(published)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| {
                AppError::Normalization(format!(
                    "Video {video_id} has unparsable publish date '{published}': {e}"
                ))
            })?;

        let thumbnail_url = item
            .snippet
            .thumbnails
            .values()
            .max_by_key(|t| t.width * t.height)
            .map(|t| t.url.clone());

        let mut tags: BTreeSet<String> = item.snippet.tags.into_iter().collect();
        tags.extend([
            original_date.year().to_string(),
            "imported from youtube".to_string(),
            "automated".to_string(),
        ]);

        let watch_url = format!("{}{}", Source::YouTube.public_url_prefix(), video_id);
        let creator = item
            .snippet
            .video_owner_channel_title
            .or(item.snippet.channel_title)
            .unwrap_or_default();

        Ok(Record {
            canonical_id: video_id,
            canonical_format: Some("mp4".into()),
            canonical_mime: Some("video/mp4".into()),
            canonical_size: None,
            view_url: watch_url.clone(),
            thumbnail_url,
            submission: Submission {
                name: item.snippet.title,
                description: item.snippet.description,
                tags,
                source: watch_url,
                rating: Some(Rating::Safe),
                creator,
                submission_type: SubmissionType::Animation,
                original_date,
            },
        })
    }
}
