use std::fmt;
use std::time::Duration;

use crate::transfer::{TransferOutcome, TransferStatus};

/// Aggregated outcome of one transfer run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Records never attempted because the run was cancelled.
    pub unprocessed: usize,
    pub elapsed: Duration,
    pub outcomes: Vec<TransferOutcome>,
}

impl RunSummary {
    pub fn record(&mut self, outcome: TransferOutcome) {
        match outcome.status {
            TransferStatus::Done => self.succeeded += 1,
            TransferStatus::Skipped => self.skipped += 1,
            TransferStatus::Failed => self.failed += 1,
            // A record that never reached a terminal status did not succeed.
            TransferStatus::Pending => {
                tracing::warn!(canonical_id = %outcome.canonical_id, "Outcome still pending, counting as failed");
                self.failed += 1;
            }
        }
        self.outcomes.push(outcome);
    }

    /// Every record of the manifest, whether or not it was attempted.
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed + self.unprocessed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &TransferOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, TransferStatus::Failed | TransferStatus::Pending))
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records: {} succeeded, {} skipped, {} failed",
            self.total(),
            self.succeeded,
            self.skipped,
            self.failed
        )?;
        if self.unprocessed > 0 {
            write!(f, ", {} unprocessed", self.unprocessed)?;
        }
        write!(f, " in {:.1}s", self.elapsed.as_secs_f64())
    }
}
