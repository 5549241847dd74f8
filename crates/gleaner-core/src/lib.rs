pub mod dedup;
pub mod error;
pub mod harvest;
pub mod manifest;
pub mod models;
pub mod publish;
pub mod rate_limit;
pub mod report;
pub mod source;
pub mod summary;
pub mod traits;
pub mod transfer;

#[cfg(test)]
pub mod testutil;

pub use error::{AppError, PublishStep};
pub use harvest::{HarvestConfig, HarvestDriver, HarvestReport};
pub use manifest::HarvestManifest;
pub use models::{Rating, Record, Submission, SubmissionType, compute_bytes_hash, compute_hash};
pub use report::{RunEvent, RunReporter, TracingRunReporter};
pub use source::{Source, SourceAdapter};
pub use summary::RunSummary;
pub use traits::{DedupIndex, PageClient, PayloadFetcher, Publisher};
pub use transfer::{TransferConfig, TransferEngine, TransferMode, TransferOutcome, TransferStatus};
