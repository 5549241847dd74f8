use std::time::Duration;

use crate::transfer::{TransferOutcome, TransferStatus};

/// Events emitted by the harvest driver and the transfer engine.
#[derive(Debug, Clone)]
pub enum RunEvent<'a> {
    HarvestStarted {
        source: &'a str,
        query: &'a str,
        pages: u32,
    },
    PageFetched {
        page: u32,
        entries: usize,
        kept: usize,
    },
    EntryDropped {
        page: u32,
        reason: &'a str,
    },
    Throttled {
        page: u32,
        wait: Duration,
    },
    HarvestCompleted {
        records: usize,
        dropped: usize,
    },
    TransferStarted {
        canonical_id: &'a str,
        index: usize,
        total: usize,
    },
    TransferFinished {
        outcome: &'a TransferOutcome,
    },
    CourtesyPause {
        wait: Duration,
    },
}

/// Trait for receiving run events (decoupled logging).
pub trait RunReporter: Send + Sync {
    fn report(&self, event: RunEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRunReporter;

impl RunReporter for TracingRunReporter {
    fn report(&self, event: RunEvent<'_>) {
        match event {
            RunEvent::HarvestStarted {
                source,
                query,
                pages,
            } => {
                tracing::info!(%source, %query, %pages, "Harvest started");
            }
            RunEvent::PageFetched {
                page,
                entries,
                kept,
            } => {
                tracing::info!(%page, %entries, %kept, "Page fetched");
            }
            RunEvent::EntryDropped { page, reason } => {
                tracing::warn!(%page, %reason, "Entry dropped");
            }
            RunEvent::Throttled { page, wait } => {
                tracing::warn!(%page, wait_ms = %wait.as_millis(), "Source throttled request, waiting");
            }
            RunEvent::HarvestCompleted { records, dropped } => {
                tracing::info!(%records, %dropped, "Harvest completed");
            }
            RunEvent::TransferStarted {
                canonical_id,
                index,
                total,
            } => {
                tracing::debug!(%canonical_id, "Transfer {}/{}", index, total);
            }
            RunEvent::TransferFinished { outcome } => {
                let elapsed_ms = outcome.duration.as_millis();
                let id = &outcome.canonical_id;
                let reason = outcome.reason.as_deref().unwrap_or("");
                match outcome.status {
                    TransferStatus::Done => {
                        tracing::info!(canonical_id = %id, %elapsed_ms, "Transferred");
                    }
                    TransferStatus::Skipped => {
                        tracing::info!(canonical_id = %id, %reason, "Skipped");
                    }
                    TransferStatus::Failed => {
                        tracing::warn!(canonical_id = %id, %reason, "Transfer failed");
                    }
                    TransferStatus::Pending => {}
                }
            }
            RunEvent::CourtesyPause { wait } => {
                tracing::info!(wait_ms = %wait.as_millis(), "Pausing to stay under the rate budget");
            }
        }
    }
}
