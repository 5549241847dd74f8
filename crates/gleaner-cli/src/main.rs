use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use gleaner_client::aggregate::DEFAULT_BASE_URL;
use gleaner_client::{AggregateClient, HttpPayloadFetcher, ReqwestPageClient, YtDlpFetcher};
use gleaner_core::harvest::{HarvestConfig, HarvestDriver};
use gleaner_core::manifest::HarvestManifest;
use gleaner_core::report::TracingRunReporter;
use gleaner_core::source::Source;
use gleaner_core::summary::RunSummary;
use gleaner_core::traits::{NullPublisher, PayloadFetcher};
use gleaner_core::transfer::{TransferConfig, TransferEngine, TransferMode};

#[derive(Parser)]
#[command(name = "gleaner", version, about = "Harvest, download and republish booru and video archives")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest records from a source into a manifest file
    Index {
        /// Source to harvest (derpibooru, manebooru, ponerpics, twibooru, youtube)
        #[arg(value_parser = parse_source)]
        source: Source,

        /// Search query, or the channel handle for youtube
        query: String,

        /// Maximum number of records to harvest
        max: usize,

        /// Where to write the manifest
        manifest: PathBuf,

        /// Source API key (defaults to the source's own environment variable)
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Download every payload of a manifest into a directory
    Download {
        manifest: PathBuf,

        /// Directory holding `<id>.<format>` payload files
        dir: PathBuf,

        /// Canonical ids to skip, comma separated
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,

        /// Attempts per payload for transient network errors
        #[arg(long, default_value_t = 3)]
        attempts: u32,

        /// Seconds to wait for the next chunk of a payload before giving up
        #[arg(long, default_value_t = 30)]
        idle_timeout: u64,
    },

    /// Publish downloaded payloads and their metadata to the aggregation service
    Upload {
        manifest: PathBuf,

        /// Directory the payloads were downloaded to
        dir: PathBuf,

        /// Canonical ids to skip, comma separated
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,

        /// Aggregation service base URL
        #[arg(long, env = "PA_BASE_URL", default_value = DEFAULT_BASE_URL)]
        base_url: String,

        /// Bearer token for the aggregation service
        #[arg(long, env = "PA_API_KEY", hide_env_values = true)]
        token: String,
    },

    /// Check a manifest's record count and checksum
    Verify { manifest: PathBuf },
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

fn parse_source(value: &str) -> Result<Source, String> {
    value.parse().map_err(|e: gleaner_core::AppError| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("gleaner=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cancel = install_interrupt_handler();

    match cli.command {
        Commands::Index {
            source,
            query,
            max,
            manifest,
            api_key,
        } => {
            let api_key = api_key
                .or_else(|| std::env::var(source.api_key_env()).ok())
                .filter(|key| !key.trim().is_empty());
            cmd_index(source, &query, max, &manifest, api_key, cancel).await?;
        }
        Commands::Download {
            manifest,
            dir,
            exclude,
            attempts,
            idle_timeout,
        } => {
            let config = TransferConfig::new(&dir)
                .with_exclusions(exclude)
                .with_max_attempts(attempts);
            let idle = Duration::from_secs(idle_timeout.max(1));
            cmd_download(&manifest, config, idle, cancel).await?;
        }
        Commands::Upload {
            manifest,
            dir,
            exclude,
            base_url,
            token,
        } => {
            let config = TransferConfig::new(&dir).with_exclusions(exclude);
            cmd_upload(&manifest, config, &base_url, &token, cancel).await?;
        }
        Commands::Verify { manifest } => {
            cmd_verify(&manifest)?;
        }
    }

    Ok(())
}

/// Cancel the run on the first Ctrl-C.
fn install_interrupt_handler() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping");
            token.cancel();
        }
    });
    cancel
}

async fn cmd_index(
    source: Source,
    query: &str,
    max: usize,
    manifest_path: &Path,
    api_key: Option<String>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut config = HarvestConfig::default();
    if let Some(key) = api_key {
        config = config.with_api_key(key);
    }

    let client = ReqwestPageClient::new().context("Failed to create HTTP client")?;
    let driver = HarvestDriver::new(client, config).with_cancellation(cancel);
    let adapter = source.adapter();

    let report = driver
        .harvest_to_file(adapter.as_ref(), query, max, manifest_path, &TracingRunReporter)
        .await
        .with_context(|| format!("Harvesting {source} failed, no manifest written"))?;

    println!(
        "{} records from {} pages written to {} ({} entries dropped)",
        report.manifest.result_count,
        report.pages,
        manifest_path.display(),
        report.dropped
    );
    Ok(())
}

async fn cmd_download(
    manifest_path: &Path,
    config: TransferConfig,
    idle_timeout: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    let manifest = load_manifest(manifest_path)?;
    std::fs::create_dir_all(&config.payload_dir).with_context(|| {
        format!("Failed to create directory: {}", config.payload_dir.display())
    })?;

    let is_video = manifest
        .source
        .parse::<Source>()
        .is_ok_and(|source| source.is_video());

    let summary = if is_video {
        download_with(YtDlpFetcher::new(), &manifest, config, cancel).await?
    } else {
        let fetcher = HttpPayloadFetcher::with_timeouts(CONNECT_TIMEOUT, idle_timeout)
            .context("Failed to create HTTP client")?;
        download_with(fetcher, &manifest, config, cancel).await?
    };
    finish(&summary)
}

async fn download_with<F: PayloadFetcher>(
    fetcher: F,
    manifest: &HarvestManifest,
    config: TransferConfig,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let engine = TransferEngine::new(fetcher, NullPublisher, config).with_cancellation(cancel);
    Ok(engine
        .run(manifest, TransferMode::Download, &TracingRunReporter)
        .await?)
}

async fn cmd_upload(
    manifest_path: &Path,
    config: TransferConfig,
    base_url: &str,
    token: &str,
    cancel: CancellationToken,
) -> Result<()> {
    let manifest = load_manifest(manifest_path)?;
    let client =
        AggregateClient::with_base_url(token, base_url).context("Failed to create publish client")?;

    // The fetcher only reads remote thumbnails in publish mode.
    let thumbnails = HttpPayloadFetcher::new().context("Failed to create HTTP client")?;
    let engine = TransferEngine::new(thumbnails, client, config).with_cancellation(cancel);
    let summary = engine
        .run(&manifest, TransferMode::Publish, &TracingRunReporter)
        .await?;
    finish(&summary)
}

fn cmd_verify(manifest_path: &Path) -> Result<()> {
    let manifest = load_manifest(manifest_path)?;
    println!(
        "{}: {} records from {}, checksum {}",
        manifest_path.display(),
        manifest.result_count,
        manifest.source,
        manifest.checksum
    );
    Ok(())
}

fn load_manifest(path: &Path) -> Result<HarvestManifest> {
    HarvestManifest::load(path)
        .with_context(|| format!("Failed to load manifest: {}", path.display()))
}

/// Print the summary and turn failed or interrupted runs into an error exit.
fn finish(summary: &RunSummary) -> Result<()> {
    println!("{summary}");
    for failure in summary.failures() {
        println!(
            "  failed {}: {}",
            failure.canonical_id,
            failure.reason.as_deref().unwrap_or("unknown error")
        );
    }

    if summary.has_failures() {
        anyhow::bail!("{} of {} records failed", summary.failed, summary.total());
    }
    if summary.unprocessed > 0 {
        anyhow::bail!("Run interrupted with {} records unprocessed", summary.unprocessed);
    }
    Ok(())
}
