//! Source adapters: one per external API shape.
//!
//! The set of sources is closed ([`Source`]). Each source knows how to
//! build a list request, unwrap its JSON envelope and normalize one raw entry
//! into a [`Record`]. The pagination driver only talks to the
//! [`SourceAdapter`] trait, so per-source quirks stay in this module.

mod booru;
mod youtube;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::AppError;
use crate::models::Record;
use crate::rate_limit::RateLimit;

pub use booru::BooruAdapter;
pub use youtube::YouTubeAdapter;

/// The supported content sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Derpibooru,
    Manebooru,
    Ponerpics,
    Twibooru,
    YouTube,
}

impl Source {
    pub const ALL: [Source; 5] = [
        Source::Derpibooru,
        Source::Manebooru,
        Source::Ponerpics,
        Source::Twibooru,
        Source::YouTube,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Derpibooru => "derpibooru",
            Source::Manebooru => "manebooru",
            Source::Ponerpics => "ponerpics",
            Source::Twibooru => "twibooru",
            Source::YouTube => "youtube",
        }
    }

    /// List endpoint for the source.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Source::Derpibooru => "https://derpibooru.org/api/v1/json/search/images",
            Source::Manebooru => "https://manebooru.art/api/v1/json/search/images",
            Source::Ponerpics => "https://ponerpics.org/api/v1/json/search/images",
            Source::Twibooru => "https://twibooru.org/api/v3/search/posts",
            Source::YouTube => "https://www.googleapis.com/youtube/v3/playlistItems",
        }
    }

    /// Prefix of the public page for a record, completed with its id.
    pub fn public_url_prefix(&self) -> &'static str {
        match self {
            Source::Derpibooru => "https://derpibooru.org/images/",
            Source::Manebooru => "https://manebooru.art/images/",
            Source::Ponerpics => "https://ponerpics.org/images/",
            Source::Twibooru => "https://twibooru.org/",
            Source::YouTube => "https://youtube.com/watch?v=",
        }
    }

    /// Maximum entries per page the source will return.
    pub fn page_size(&self) -> u32 {
        match self {
            Source::Twibooru => 15,
            _ => 50,
        }
    }

    /// Published request budget.
    pub fn rate_limit(&self) -> RateLimit {
        match self {
            // https://derpibooru.org/pages/api#ratelimits
            Source::Derpibooru | Source::Manebooru | Source::Ponerpics => {
                RateLimit::new(20, Duration::from_secs(10))
            }
            // https://twibooru.org/pages/api#rate-limits
            Source::Twibooru => RateLimit::new(10, Duration::from_secs(60)),
            Source::YouTube => RateLimit::new(1, Duration::from_secs(1)),
        }
    }

    /// Environment variable the CLI reads this source's API key from.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Source::Derpibooru => "DERPIBOORU_API_KEY",
            Source::Manebooru => "MANEBOORU_API_KEY",
            Source::Ponerpics => "PONERPICS_API_KEY",
            Source::Twibooru => "TWIBOORU_API_KEY",
            Source::YouTube => "GOOGLE_API_KEY",
        }
    }

    /// Video sources are downloaded through an external tool, not HTTP.
    pub fn is_video(&self) -> bool {
        matches!(self, Source::YouTube)
    }

    pub fn adapter(&self) -> Box<dyn SourceAdapter> {
        match self {
            Source::YouTube => Box::new(YouTubeAdapter::new()),
            booru => Box::new(BooruAdapter::new(*booru)),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Source {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Source::ALL
            .into_iter()
            .find(|source| source.as_str() == wanted)
            .ok_or_else(|| {
                let names: Vec<_> = Source::ALL.iter().map(Source::as_str).collect();
                AppError::UnsupportedSource(format!("{s} (expected one of {})", names.join(", ")))
            })
    }
}

/// How a source advances between pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// `page=N`; a short page means the results are exhausted.
    PageNumber,
    /// Opaque continuation token; no token means the results are exhausted.
    Cursor,
}

/// Position of the page being requested.
#[derive(Debug, Clone, Copy)]
pub struct PageParams<'a> {
    /// 1-based page number.
    pub page: u32,
    pub per_page: u32,
    /// Continuation token from the previous page, for cursor sources.
    pub cursor: Option<&'a str>,
}

/// A GET request against a source's API.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub url: Url,
}

impl PageRequest {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    /// The URL with any `key` parameter masked, for logging.
    pub fn redacted(&self) -> String {
        let mut url = self.url.clone();
        let pairs: Vec<(String, String)> = self
            .url
            .query_pairs()
            .map(|(k, v)| {
                let v = if k == "key" { "***".into() } else { v.into_owned() };
                (k.into_owned(), v)
            })
            .collect();
        url.query_pairs_mut().clear().extend_pairs(pairs);
        url.to_string()
    }
}

/// Entries unwrapped from one page's envelope.
#[derive(Debug, Clone, Default)]
pub struct RawPage {
    pub entries: Vec<serde_json::Value>,
    pub next_cursor: Option<String>,
}

/// Per-source API behavior.
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> Source;

    fn page_size(&self) -> u32 {
        self.source().page_size()
    }

    fn rate_limit(&self) -> RateLimit {
        self.source().rate_limit()
    }

    fn pagination(&self) -> Pagination {
        Pagination::PageNumber
    }

    /// A request that turns the operator's query into the value pagination
    /// runs against (e.g. a channel handle into a playlist id).
    fn resolve_request(
        &self,
        _query: &str,
        _api_key: Option<&str>,
    ) -> Result<Option<PageRequest>, AppError> {
        Ok(None)
    }

    /// Read the resolved query out of the resolve response.
    fn resolve_query(&self, _body: serde_json::Value) -> Result<String, AppError> {
        Err(AppError::ConfigError(format!(
            "{} does not resolve queries",
            self.source()
        )))
    }

    /// A follow-up request for fields the list endpoint leaves out of a page.
    fn details_request(
        &self,
        _entries: &[serde_json::Value],
        _api_key: Option<&str>,
    ) -> Result<Option<PageRequest>, AppError> {
        Ok(None)
    }

    /// Fold the details response into the page's raw entries.
    fn merge_details(
        &self,
        _entries: &mut [serde_json::Value],
        _body: serde_json::Value,
    ) -> Result<(), AppError> {
        Ok(())
    }

    fn build_page_request(
        &self,
        query: &str,
        params: PageParams<'_>,
        api_key: Option<&str>,
    ) -> Result<PageRequest, AppError>;

    fn extract_entries(&self, body: serde_json::Value) -> Result<RawPage, AppError>;

    fn normalize(&self, entry: &serde_json::Value) -> Result<Record, AppError>;
}

/// Parse a static endpoint URL.
fn endpoint_url(source: Source) -> Result<Url, AppError> {
    Url::parse(source.endpoint())
        .map_err(|e| AppError::ConfigError(format!("Invalid endpoint for {source}: {e}")))
}
