//! Persisted, checksummed output of one harvesting run.
//!
//! The manifest is written once, at the end of a successful pagination run,
//! and is read-only afterwards. Consumers must go through [`HarvestManifest::load`]
//! (or call [`HarvestManifest::verify`]) before trusting its records.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{Record, compute_hash};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestManifest {
    /// Source name (see [`crate::source::Source`]).
    pub source: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub result_count: usize,
    /// SHA-256 over the serialized `records` array.
    pub checksum: String,
    pub records: Vec<Record>,
}

impl HarvestManifest {
    /// Build a manifest for `records`, stamping the current time and checksum.
    pub fn new(source: impl Into<String>, records: Vec<Record>) -> Result<Self, AppError> {
        let checksum = records_checksum(&records)?;
        Ok(Self {
            source: source.into(),
            timestamp: Utc::now(),
            result_count: records.len(),
            checksum,
            records,
        })
    }

    /// Recompute the checksum and record count and compare with the stored values.
    pub fn verify(&self) -> Result<(), AppError> {
        if self.result_count != self.records.len() {
            return Err(AppError::ManifestIntegrity {
                expected: format!("{} records", self.result_count),
                actual: format!("{} records", self.records.len()),
            });
        }
        let actual = records_checksum(&self.records)?;
        if actual != self.checksum {
            return Err(AppError::ManifestIntegrity {
                expected: self.checksum.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Read a manifest from disk and verify it.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        let manifest: HarvestManifest = serde_json::from_str(&raw)?;
        manifest.verify()?;
        tracing::debug!(
            path = %path.display(),
            source = %manifest.source,
            records = manifest.result_count,
            "Manifest verified"
        );
        Ok(manifest)
    }

    /// Write the manifest to `path` via a sibling temp file and a rename,
    /// so readers never observe a partial write.
    pub fn write(&self, path: &Path) -> Result<(), AppError> {
        let json = serde_json::to_string(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        tracing::info!(
            path = %path.display(),
            records = self.result_count,
            checksum = %self.checksum.get(..8).unwrap_or(&self.checksum),
            "Manifest written"
        );
        Ok(())
    }
}

/// Checksum of the serialized records sequence.
pub fn records_checksum(records: &[Record]) -> Result<String, AppError> {
    Ok(compute_hash(&serde_json::to_string(records)?))
}
