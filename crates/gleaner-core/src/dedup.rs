use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::traits::DedupIndex;

/// Local dedup index: a key is present when a file of that name exists
/// under `root`.
///
/// Existence is the only signal. A truncated file from an interrupted
/// run would read as present, which is why downloads land on a `.part`
/// path first.
#[derive(Debug, Clone)]
pub struct FsDedupIndex {
    root: PathBuf,
}

impl FsDedupIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl DedupIndex for FsDedupIndex {
    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        Ok(tokio::fs::try_exists(self.path_for(key)).await?)
    }
}
