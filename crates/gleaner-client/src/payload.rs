use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use futures::StreamExt;
use gleaner_core::error::AppError;
use gleaner_core::traits::{FetchedBytes, PayloadFetcher};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::page_client::{DEFAULT_TIMEOUT, USER_AGENT, transport_error};

/// Sibling path a payload is streamed into before it is renamed into place.
pub fn partial_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

/// Streams a payload over HTTP straight to disk.
///
/// Connecting and each read are bounded; the transfer as a whole is not.
#[derive(Clone)]
pub struct HttpPayloadFetcher {
    client: Client,
    idle_timeout_secs: u64,
}

impl HttpPayloadFetcher {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeouts(DEFAULT_TIMEOUT, DEFAULT_TIMEOUT)
    }

    /// `idle` bounds the wait for each chunk, not the transfer as a whole.
    pub fn with_timeouts(connect: Duration, idle: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(connect)
            .read_timeout(idle)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            idle_timeout_secs: idle.as_secs(),
        })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, AppError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(e, self.idle_timeout_secs))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::Throttled { retry_after_ms: 0 });
        }
        if !status.is_success() {
            return Err(AppError::Fetch {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    async fn stream_to(&self, response: reqwest::Response, path: &Path) -> Result<u64, AppError> {
        let mut file = tokio::fs::File::create(path).await?;
        let mut body = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| transport_error(e, self.idle_timeout_secs))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

impl PayloadFetcher for HttpPayloadFetcher {
    async fn fetch_to_path(&self, url: &str, target: &Path) -> Result<u64, AppError> {
        let response = self.get(url).await?;

        let partial = partial_path(target);
        match self.stream_to(response, &partial).await {
            Ok(written) => {
                tokio::fs::rename(&partial, target).await?;
                Ok(written)
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    tracing::debug!(path = %partial.display(), error = %cleanup, "Could not remove partial download");
                }
                Err(e)
            }
        }
    }

    async fn fetch_bytes(&self, url: &str) -> Result<FetchedBytes, AppError> {
        let response = self.get(url).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(e, self.idle_timeout_secs))?;
        Ok(FetchedBytes {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

/// Downloads video payloads by running `yt-dlp`.
///
/// `yt-dlp` keeps its own `.part` file and only renames it into place once
/// the download and remux finished.
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    program: PathBuf,
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self {
            program: PathBuf::from("yt-dlp"),
        }
    }
}

impl YtDlpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl PayloadFetcher for YtDlpFetcher {
    async fn fetch_to_path(&self, url: &str, target: &Path) -> Result<u64, AppError> {
        let output = Command::new(&self.program)
            .arg(url)
            .arg("-o")
            .arg(target)
            .args(["-t", "mp4"])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                AppError::ConfigError(format!(
                    "Could not run {}: {e}",
                    self.program.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last_line = stderr.lines().last().unwrap_or("").trim();
            return Err(AppError::NetworkError(format!(
                "{} exited with {}: {last_line}",
                self.program.display(),
                output.status
            )));
        }

        Ok(tokio::fs::metadata(target).await?.len())
    }
}
