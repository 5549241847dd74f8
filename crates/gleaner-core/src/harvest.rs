use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::time::Duration;

use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::manifest::HarvestManifest;
use crate::models::Record;
use crate::rate_limit::RateLimiter;
use crate::report::{RunEvent, RunReporter, TracingRunReporter};
use crate::source::{PageParams, PageRequest, Pagination, SourceAdapter};
use crate::traits::PageClient;

/// Default cap on consecutive 429 waits for a single page.
pub const DEFAULT_MAX_THROTTLE_WAITS: u32 = 10;

/// Explicit configuration for a harvesting run.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Source API key, passed as a request parameter when present.
    pub api_key: Option<String>,
    /// Consecutive 429 responses tolerated for one page before giving up.
    pub max_throttle_waits: u32,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            max_throttle_waits: DEFAULT_MAX_THROTTLE_WAITS,
        }
    }
}

impl HarvestConfig {
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_max_throttle_waits(mut self, waits: u32) -> Self {
        self.max_throttle_waits = waits;
        self
    }
}

/// Result of a completed harvesting run.
#[derive(Debug, Clone)]
pub struct HarvestReport {
    pub manifest: HarvestManifest,
    /// Entries dropped because they could not be normalized.
    pub dropped: usize,
    /// Pages actually requested.
    pub pages: u32,
}

/// Number of pages needed to reach `target_count`; at least one.
pub fn page_count(target_count: usize, page_size: u32) -> u32 {
    let page_size = page_size.max(1) as usize;
    target_count.div_ceil(page_size).max(1) as u32
}

/// Pagination state for one run. Not restartable: a fresh run starts at page 1.
struct Pager<'a> {
    adapter: &'a dyn SourceAdapter,
    limiter: RateLimiter,
    query: &'a str,
    resolved_query: Option<String>,
    page: u32,
    pages: u32,
    per_page: u32,
    cursor: Option<String>,
    remaining: usize,
    seen: HashSet<String>,
    dropped: usize,
    fetched: u32,
    finished: bool,
}

impl<'a> Pager<'a> {
    fn new(adapter: &'a dyn SourceAdapter, query: &'a str, target_count: usize) -> Self {
        let page_size = adapter.page_size();
        Self {
            adapter,
            limiter: RateLimiter::new(adapter.source().as_str(), adapter.rate_limit()),
            query,
            resolved_query: None,
            page: 1,
            pages: page_count(target_count, page_size),
            per_page: (target_count.min(page_size as usize)) as u32,
            cursor: None,
            remaining: target_count,
            seen: HashSet::new(),
            dropped: 0,
            fetched: 0,
            finished: target_count == 0,
        }
    }
}

/// Drives a source adapter across pages under the source's rate budget.
///
/// Generic over the page client so it can be exercised without real HTTP.
pub struct HarvestDriver<C>
where
    C: PageClient,
{
    client: C,
    config: HarvestConfig,
    cancel: CancellationToken,
}

impl<C> HarvestDriver<C>
where
    C: PageClient,
{
    pub fn new(client: C, config: HarvestConfig) -> Self {
        Self {
            client,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort the run between pages and during waits when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Harvest up to `target_count` records into an in-memory manifest.
    ///
    /// Any non-throttling failure aborts the run; no partial manifest is
    /// returned.
    pub async fn harvest<R: RunReporter + ?Sized>(
        &self,
        adapter: &dyn SourceAdapter,
        query: &str,
        target_count: usize,
        reporter: &R,
    ) -> Result<HarvestReport, AppError> {
        if target_count == 0 {
            return Err(AppError::ConfigError(
                "Target count must be at least 1".into(),
            ));
        }

        let mut pager = Pager::new(adapter, query, target_count);
        reporter.report(RunEvent::HarvestStarted {
            source: adapter.source().as_str(),
            query,
            pages: pager.pages,
        });

        let mut records = Vec::new();
        while !pager.finished {
            records.extend(self.next_page(&mut pager, reporter).await?);
        }

        reporter.report(RunEvent::HarvestCompleted {
            records: records.len(),
            dropped: pager.dropped,
        });

        Ok(HarvestReport {
            manifest: HarvestManifest::new(adapter.source().as_str(), records)?,
            dropped: pager.dropped,
            pages: pager.fetched,
        })
    }

    /// Harvest and write the manifest to `path`. The file is written once,
    /// and only when the whole run succeeded.
    pub async fn harvest_to_file<R: RunReporter + ?Sized>(
        &self,
        adapter: &dyn SourceAdapter,
        query: &str,
        target_count: usize,
        path: &Path,
        reporter: &R,
    ) -> Result<HarvestReport, AppError> {
        let report = self.harvest(adapter, query, target_count, reporter).await?;
        report.manifest.write(path)?;
        Ok(report)
    }

    /// Lazily yield normalized records page by page.
    ///
    /// The stream ends after the first error.
    pub fn stream<'a>(
        &'a self,
        adapter: &'a dyn SourceAdapter,
        query: &'a str,
        target_count: usize,
    ) -> impl Stream<Item = Result<Record, AppError>> + 'a {
        let state = (Pager::new(adapter, query, target_count), VecDeque::new());
        futures::stream::try_unfold(state, move |(mut pager, mut buffer)| async move {
            loop {
                if let Some(record) = buffer.pop_front() {
                    return Ok::<_, AppError>(Some((record, (pager, buffer))));
                }
                if pager.finished {
                    return Ok(None);
                }
                let records = self.next_page(&mut pager, &TracingRunReporter).await?;
                buffer.extend(records);
            }
        })
    }

    /// Fetch, unwrap and normalize the next page, advancing the pager.
    async fn next_page<R: RunReporter + ?Sized>(
        &self,
        pager: &mut Pager<'_>,
        reporter: &R,
    ) -> Result<Vec<Record>, AppError> {
        let adapter = pager.adapter;
        let api_key = self.config.api_key.as_deref();

        if pager.resolved_query.is_none() {
            let resolved = match adapter.resolve_request(pager.query, api_key)? {
                Some(request) => {
                    let body = self.fetch_with_budget(pager, &request, 0, reporter).await?;
                    let resolved = adapter.resolve_query(body)?;
                    tracing::debug!(query = %pager.query, %resolved, "Resolved query");
                    resolved
                }
                None => pager.query.to_string(),
            };
            pager.resolved_query = Some(resolved);
        }
        let query = pager.resolved_query.clone().unwrap_or_default();

        let page = pager.page;
        let request = adapter.build_page_request(
            &query,
            PageParams {
                page,
                per_page: pager.per_page,
                cursor: pager.cursor.as_deref(),
            },
            api_key,
        )?;
        tracing::debug!(%page, url = %request.redacted(), "Requesting page");

        let body = self
            .fetch_with_budget(pager, &request, page, reporter)
            .await?;
        let mut raw = adapter.extract_entries(body)?;
        if let Some(details) = adapter.details_request(&raw.entries, api_key)? {
            tracing::debug!(%page, url = %details.redacted(), "Requesting entry details");
            let body = self
                .fetch_with_budget(pager, &details, page, reporter)
                .await?;
            adapter.merge_details(&mut raw.entries, body)?;
        }
        let entry_count = raw.entries.len();

        let mut records = Vec::with_capacity(entry_count);
        for entry in &raw.entries {
            match adapter.normalize(entry) {
                Ok(record) => {
                    if !pager.seen.insert(record.canonical_id.clone()) {
                        tracing::debug!(canonical_id = %record.canonical_id, "Duplicate entry across pages");
                        continue;
                    }
                    records.push(record);
                }
                Err(e) => {
                    pager.dropped += 1;
                    let reason = e.to_string();
                    reporter.report(RunEvent::EntryDropped {
                        page,
                        reason: &reason,
                    });
                }
            }
        }
        records.truncate(pager.remaining);
        pager.remaining -= records.len();

        reporter.report(RunEvent::PageFetched {
            page,
            entries: entry_count,
            kept: records.len(),
        });

        let exhausted = match adapter.pagination() {
            Pagination::PageNumber => entry_count < pager.per_page as usize,
            Pagination::Cursor => raw.next_cursor.is_none() || entry_count == 0,
        };
        pager.cursor = raw.next_cursor;
        pager.fetched += 1;
        pager.page += 1;
        pager.finished = exhausted || pager.page > pager.pages || pager.remaining == 0;

        Ok(records)
    }

    /// Issue one request under the rate budget, waiting out 429 responses.
    ///
    /// A 429 does not count against the budget and is retried after a full
    /// window, up to `max_throttle_waits` times.
    async fn fetch_with_budget<R: RunReporter + ?Sized>(
        &self,
        pager: &Pager<'_>,
        request: &PageRequest,
        page: u32,
        reporter: &R,
    ) -> Result<serde_json::Value, AppError> {
        let window = pager.limiter.limit().interval;
        let mut throttle_waits = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }
            pager.limiter.acquire(&self.cancel).await?;

            match self.client.get_json(&request.url).await {
                Ok(body) => return Ok(body),
                Err(AppError::Throttled { .. }) => {
                    throttle_waits += 1;
                    if throttle_waits > self.config.max_throttle_waits {
                        return Err(AppError::Throttled {
                            retry_after_ms: window.as_millis() as u64,
                        });
                    }
                    pager.limiter.refund();
                    reporter.report(RunEvent::Throttled { page, wait: window });
                    self.pause(window).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn pause(&self, wait: Duration) -> Result<(), AppError> {
        tokio::select! {
            () = tokio::time::sleep(wait) => Ok(()),
            () = self.cancel.cancelled() => Err(AppError::Cancelled),
        }
    }
}
