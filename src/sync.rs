//! Batch synchronization of cache slots
//!
//! [`sync_batch`] launches one task per descriptor. Each task checks the
//! slot's watermark, refreshes the slot if stale and records the new
//! watermark. Tasks own their slot and scratch paths exclusively, so they
//! write results straight to disk and report back only a summary.
//!
//! Per-item failures never cancel siblings or fail the batch. The batch
//! fails only if it cannot create the cache root or its scratch namespace.

use crate::cache::{self, Fallback, Installed, StalenessOracle};
use crate::config::Config;
use crate::descriptor::{CacheKey, ProjectDescriptor};
use crate::error::{RegcacheError, RegcacheResult};
use crate::fetch::SourceFetcher;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything a batch needs, passed in explicitly per call
#[derive(Clone)]
pub struct SyncContext {
    /// Root of the slot tree
    pub cache_root: PathBuf,
    /// Directory the per-batch scratch namespace is created in
    pub scratch_dir: PathBuf,
    /// Slot file name for descriptors whose target file has no name
    pub build_definition_name: String,
    /// Fetch strategy
    pub fetcher: Arc<dyn SourceFetcher>,
}

impl SyncContext {
    /// Build a context from configuration and a fetcher
    pub fn new(config: &Config, fetcher: Arc<dyn SourceFetcher>) -> Self {
        Self {
            cache_root: config.cache.root.clone(),
            scratch_dir: config.cache.scratch_dir.clone(),
            build_definition_name: config.cache.build_definition_name.clone(),
            fetcher,
        }
    }
}

/// Final state of one item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Watermark matched, nothing fetched
    Fresh,
    /// Fetched build definition installed
    Refreshed,
    /// Placeholder build definition installed
    FallbackInstalled,
    /// Slot left in its previous state
    Failed,
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fresh => "fresh",
            Self::Refreshed => "refreshed",
            Self::FallbackInstalled => "fallback",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Result of syncing one descriptor
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub key: CacheKey,
    pub build_number: String,
    pub outcome: SyncOutcome,
    pub readme_installed: bool,
    pub warnings: Vec<String>,
}

impl ItemReport {
    fn new(key: CacheKey, build_number: &str) -> Self {
        Self {
            key,
            build_number: build_number.to_string(),
            outcome: SyncOutcome::Failed,
            readme_installed: false,
            warnings: Vec::new(),
        }
    }

    fn warn(&mut self, message: impl fmt::Display) {
        let message = message.to_string();
        warn!("{}: {}", self.key, message);
        self.warnings.push(message);
    }

    fn fail(mut self, error: impl fmt::Display) -> Self {
        self.warn(error);
        self.outcome = SyncOutcome::Failed;
        self
    }
}

/// Result of a whole batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub items: Vec<ItemReport>,
}

impl BatchReport {
    /// Number of items that ended in `outcome`
    pub fn count(&self, outcome: SyncOutcome) -> usize {
        self.items.iter().filter(|i| i.outcome == outcome).count()
    }

    /// Report for `key`, if it was part of the batch
    pub fn item(&self, key: &CacheKey) -> Option<&ItemReport> {
        self.items.iter().find(|i| &i.key == key)
    }
}

/// State shared read-only by every task of a batch
struct Unit {
    oracle: StalenessOracle,
    fetcher: Arc<dyn SourceFetcher>,
    scratch_root: PathBuf,
    build_definition_name: String,
}

/// Sync every descriptor concurrently and wait for all of them
pub async fn sync_batch(
    ctx: &SyncContext,
    descriptors: Vec<ProjectDescriptor>,
) -> RegcacheResult<BatchReport> {
    let started_at = Utc::now();

    tokio::fs::create_dir_all(&ctx.cache_root).await.map_err(|e| {
        RegcacheError::io(
            format!("creating cache root {}", ctx.cache_root.display()),
            e,
        )
    })?;
    tokio::fs::create_dir_all(&ctx.scratch_dir).await.map_err(|e| {
        RegcacheError::io(
            format!("creating scratch directory {}", ctx.scratch_dir.display()),
            e,
        )
    })?;
    let scratch = tempfile::Builder::new()
        .prefix("regcache-sync-")
        .tempdir_in(&ctx.scratch_dir)
        .map_err(|e| RegcacheError::io("creating scratch namespace", e))?;

    info!(
        "Syncing {} project(s) with the {} strategy",
        descriptors.len(),
        ctx.fetcher.strategy()
    );

    let unit = Arc::new(Unit {
        oracle: StalenessOracle::new(&ctx.cache_root),
        fetcher: Arc::clone(&ctx.fetcher),
        scratch_root: scratch.path().to_path_buf(),
        build_definition_name: ctx.build_definition_name.clone(),
    });

    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    let mut pending = Vec::with_capacity(descriptors.len());

    for descriptor in descriptors {
        let key = descriptor.key();
        if !seen.insert(key.clone()) {
            duplicates.push(
                ItemReport::new(key, &descriptor.build_number)
                    .fail("duplicate key in batch, skipped"),
            );
            continue;
        }

        let unit = Arc::clone(&unit);
        let build_number = descriptor.build_number.clone();
        let handle = tokio::spawn(async move { sync_one(&unit, descriptor).await });
        pending.push((key, build_number, handle));
    }

    let (keys, handles): (Vec<_>, Vec<_>) = pending
        .into_iter()
        .map(|(key, build_number, handle)| ((key, build_number), handle))
        .unzip();

    let mut items: Vec<ItemReport> = join_all(handles)
        .await
        .into_iter()
        .zip(keys)
        .map(|(joined, (key, build_number))| match joined {
            Ok(report) => report,
            Err(e) => ItemReport::new(key, &build_number).fail(format!("sync task failed: {}", e)),
        })
        .collect();
    items.extend(duplicates);

    let scratch_path = scratch.path().to_path_buf();
    if let Err(e) = scratch.close() {
        warn!(
            "{}",
            RegcacheError::ScratchCleanupFailed {
                path: scratch_path,
                source: e,
            }
        );
    }

    let report = BatchReport {
        started_at,
        finished_at: Utc::now(),
        items,
    };
    info!(
        "Batch complete: {} refreshed, {} fallback, {} fresh, {} failed",
        report.count(SyncOutcome::Refreshed),
        report.count(SyncOutcome::FallbackInstalled),
        report.count(SyncOutcome::Fresh),
        report.count(SyncOutcome::Failed)
    );
    Ok(report)
}

async fn sync_one(unit: &Unit, descriptor: ProjectDescriptor) -> ItemReport {
    let key = descriptor.key();
    let mut report = ItemReport::new(key.clone(), &descriptor.build_number);

    if let Err(e) = key.validate() {
        return report.fail(e);
    }

    let stale = match unit.oracle.is_stale(&key, &descriptor.build_number).await {
        Ok(stale) => stale,
        Err(e) => return report.fail(e),
    };

    if !stale {
        debug!("{} is up to date", key);
        if let Err(e) = unit
            .oracle
            .record_watermark(&key, &descriptor.build_number)
            .await
        {
            report.warn(e);
        }
        report.outcome = SyncOutcome::Fresh;
        return report;
    }

    let artifacts = unit
        .fetcher
        .fetch_artifacts(&descriptor, &unit.scratch_root)
        .await;
    let slot = unit.oracle.slot(&key);
    let file_name = descriptor.build_definition_name(&unit.build_definition_name);

    if let Err(ref e) = artifacts.build_definition.content {
        report.warn(format!("build definition unavailable: {}", e));
    }
    let build_definition = cache::install(
        &slot,
        file_name,
        &artifacts.build_definition,
        Fallback::BuildDefinition {
            pre_build_requested: descriptor.pre_build_requested,
        },
    )
    .await;

    if let Err(ref e) = artifacts.readme.content {
        report.warn(format!("README unavailable: {}", e));
    }
    report.readme_installed = matches!(
        cache::install_readme(&slot, &artifacts.readme).await,
        Installed::Fetched(_)
    );

    artifacts.finish().await;

    let outcome = match build_definition {
        Ok(Installed::Fetched(_)) => SyncOutcome::Refreshed,
        Ok(_) => SyncOutcome::FallbackInstalled,
        Err(e) => return report.fail(e),
    };
    report.outcome = outcome;

    if let Err(e) = unit
        .oracle
        .record_watermark(&key, &descriptor.build_number)
        .await
    {
        report.warn(e);
    }

    info!("{} synced to build {} ({})", key, descriptor.build_number, report.outcome);
    report
}
