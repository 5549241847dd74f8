use std::time::Duration;

use gleaner_core::error::AppError;
use gleaner_core::traits::PageClient;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use url::Url;

pub(crate) const USER_AGENT: &str = concat!("gleaner/", env!("CARGO_PKG_VERSION"));
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON page client for source list endpoints.
#[derive(Clone)]
pub struct ReqwestPageClient {
    client: Client,
    timeout_secs: u64,
}

impl ReqwestPageClient {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            timeout_secs: timeout.as_secs(),
        })
    }
}

impl PageClient for ReqwestPageClient {
    async fn get_json(&self, url: &Url) -> Result<serde_json::Value, AppError> {
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(0);
            return Err(AppError::Throttled { retry_after_ms });
        }
        if !status.is_success() {
            return Err(AppError::Fetch {
                status: status.as_u16(),
                url: redact(url),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Map a reqwest transport failure onto the retryable error variants.
pub(crate) fn transport_error(e: reqwest::Error, timeout_secs: u64) -> AppError {
    if e.is_timeout() {
        AppError::Timeout(timeout_secs)
    } else if e.is_connect() {
        AppError::NetworkError(format!("Connection failed: {e}"))
    } else {
        AppError::NetworkError(e.to_string())
    }
}

/// The URL without its query string, so API keys never reach error messages.
fn redact(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}
