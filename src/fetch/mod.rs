//! Remote content fetching
//!
//! Two interchangeable strategies sit behind [`SourceFetcher`]:
//!
//! | Strategy | Used for | Mechanism |
//! |----------|----------|-----------|
//! | [`RawUrlFetcher`] | index build | HTTP GET against a raw-content URL |
//! | [`CloneFetcher`] | tag sync | shallow single-branch clone, then file reads |
//!
//! Fetching never fails as a whole. Every file comes back as a
//! [`FetchResult`] carrying either content or the reason it is missing, and
//! callers decide what a missing file means.

mod clone;
mod raw;

pub use clone::{CloneFetcher, ScratchClone};
pub use raw::RawUrlFetcher;

use crate::config::Config;
use crate::descriptor::ProjectDescriptor;
use crate::error::RegcacheResult;
use crate::source::FetchStrategy;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// File name of the README looked up next to the build definition
pub const README_NAME: &str = "README.md";

/// Fetched file content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Content held in memory (raw-URL strategy)
    Bytes(Vec<u8>),
    /// Content already materialized on disk (inside a scratch clone)
    File(PathBuf),
}

impl Payload {
    /// Read the payload into memory
    pub async fn to_bytes(&self) -> std::io::Result<Vec<u8>> {
        match self {
            Self::Bytes(bytes) => Ok(bytes.clone()),
            Self::File(path) => tokio::fs::read(path).await,
        }
    }
}

/// Outcome of fetching one file
#[derive(Debug)]
pub struct FetchResult {
    /// Repository-relative path that was (last) attempted
    pub path: PathBuf,
    /// Content, or why it could not be obtained
    pub content: RegcacheResult<Payload>,
}

impl FetchResult {
    pub fn ok(path: impl Into<PathBuf>, payload: Payload) -> Self {
        Self {
            path: path.into(),
            content: Ok(payload),
        }
    }

    pub fn failed(path: impl Into<PathBuf>, error: crate::error::RegcacheError) -> Self {
        Self {
            path: path.into(),
            content: Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.content.is_ok()
    }

    /// Content as lossy UTF-8, if the fetch succeeded and the content is readable
    pub async fn text(&self) -> Option<String> {
        match &self.content {
            Ok(payload) => payload
                .to_bytes()
                .await
                .ok()
                .map(|b| String::from_utf8_lossy(&b).into_owned()),
            Err(_) => None,
        }
    }
}

/// The two artifacts fetched for one descriptor.
///
/// When produced by the clone strategy this owns the scratch clone that
/// [`Payload::File`] paths point into; the clone is removed by
/// [`Artifacts::finish`] or, failing that, on drop.
#[derive(Debug)]
pub struct Artifacts {
    pub build_definition: FetchResult,
    pub readme: FetchResult,
    scratch: Option<ScratchClone>,
}

impl Artifacts {
    pub fn new(build_definition: FetchResult, readme: FetchResult) -> Self {
        Self {
            build_definition,
            readme,
            scratch: None,
        }
    }

    fn with_scratch(mut self, scratch: ScratchClone) -> Self {
        self.scratch = Some(scratch);
        self
    }

    /// Release the scratch clone, logging (not returning) cleanup failures
    pub async fn finish(self) {
        if let Some(scratch) = self.scratch {
            if let Err(e) = scratch.remove().await {
                warn!("{}", e);
            }
        }
    }
}

/// A place individual files can be fetched from
#[async_trait]
pub(crate) trait FileSource: Send + Sync {
    /// Fetch `file` located in repository directory `dir`
    async fn fetch_file(&self, dir: &str, file: &str) -> FetchResult;
}

/// Retrieves a descriptor's build definition and README
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch both artifacts. Never fails; failures live in the results.
    async fn fetch_artifacts(&self, descriptor: &ProjectDescriptor, scratch_root: &Path)
        -> Artifacts;

    /// Strategy implemented by this fetcher
    fn strategy(&self) -> FetchStrategy;
}

/// Create the fetcher for a strategy
pub fn create_fetcher(strategy: FetchStrategy, config: &Config) -> Arc<dyn SourceFetcher> {
    match strategy {
        FetchStrategy::RawUrl => Arc::new(RawUrlFetcher::new(&config.fetch)),
        FetchStrategy::Clone => Arc::new(CloneFetcher::new(&config.fetch)),
    }
}

/// Fetch the README next to the build definition, then at the repository root.
///
/// Only the last failure is reported when both locations miss.
pub(crate) async fn fetch_readme(source: &dyn FileSource, git_path: &str) -> FetchResult {
    let primary = source.fetch_file(git_path, README_NAME).await;
    if primary.is_success() || git_path.trim_matches('/').is_empty() {
        return primary;
    }

    if let Err(ref e) = primary.content {
        warn!(
            "README not found at {}: {}. Trying the repository root",
            primary.path.display(),
            e
        );
    }

    source.fetch_file("", README_NAME).await
}

/// Join a repository directory and file name into a relative path
pub(crate) fn relative_path(dir: &str, file: &str) -> PathBuf {
    Path::new(dir.trim_matches('/')).join(file.trim_start_matches('/'))
}
