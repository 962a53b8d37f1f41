//! Staleness oracle
//!
//! A slot is stale when the build number reported upstream differs from the
//! watermark stored in the slot. The comparison is exact: build numbers are
//! opaque tokens here, even though producers usually increment them.

use super::install::write_file;
use super::slot::CacheSlot;
use crate::descriptor::CacheKey;
use crate::error::{RegcacheError, RegcacheResult};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Decides whether cache slots need refreshing
#[derive(Debug, Clone)]
pub struct StalenessOracle {
    root: PathBuf,
}

impl StalenessOracle {
    /// Create an oracle over the cache rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The slot for `key`
    pub fn slot(&self, key: &CacheKey) -> CacheSlot {
        CacheSlot::new(&self.root, key.clone())
    }

    /// Whether the slot for `key` lacks content for `latest`.
    ///
    /// Creates the slot directory if needed. A slot without a watermark is
    /// always stale.
    pub async fn is_stale(&self, key: &CacheKey, latest: &str) -> RegcacheResult<bool> {
        let slot = self.slot(key);
        ensure_dir(slot.dir()).await?;

        match slot.read_watermark().await? {
            None => {
                info!("{} is being processed for the first time", key);
                Ok(true)
            }
            Some(stored) => {
                let stale = stored != latest.trim();
                debug!(
                    "{}: stored build {} vs latest {} (stale: {})",
                    key, stored, latest, stale
                );
                Ok(stale)
            }
        }
    }

    /// Persist `build_number` as the slot's watermark
    pub async fn record_watermark(&self, key: &CacheKey, build_number: &str) -> RegcacheResult<()> {
        let slot = self.slot(key);
        ensure_dir(slot.dir()).await?;

        write_file(&slot.watermark_path(), build_number.trim().as_bytes()).await?;
        debug!("{}: recorded build {}", key, build_number);
        Ok(())
    }
}

/// Create a slot directory (and parents) with a permissive mode
async fn ensure_dir(dir: &Path) -> RegcacheResult<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o777);

    builder
        .create(dir)
        .await
        .map_err(|e| RegcacheError::io(format!("creating slot directory {}", dir.display()), e))
}
