//! Raw-URL fetch strategy

use super::{fetch_readme, relative_path, Artifacts, FetchResult, FileSource, Payload, SourceFetcher};
use crate::config::schema::FetchConfig;
use crate::descriptor::ProjectDescriptor;
use crate::error::{RegcacheError, RegcacheResult};
use crate::source::{self, FetchStrategy};
use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

/// Fetches files over HTTP from github/gitlab raw-content URLs
#[derive(Clone)]
pub struct RawUrlFetcher {
    agent: ureq::Agent,
    user_agent: String,
}

impl RawUrlFetcher {
    /// Create a fetcher from fetch settings
    pub fn new(config: &FetchConfig) -> Self {
        let agent = ureq::Agent::new_with_config(
            ureq::Agent::config_builder()
                .http_status_as_error(false)
                .build(),
        );

        Self {
            agent,
            user_agent: config.user_agent.clone(),
        }
    }

    /// Fetch `file` from the descriptor's build-definition directory
    pub async fn fetch(&self, descriptor: &ProjectDescriptor, file: &str) -> FetchResult {
        self.fetch_at(descriptor, &descriptor.git_path, file).await
    }

    async fn fetch_at(&self, descriptor: &ProjectDescriptor, dir: &str, file: &str) -> FetchResult {
        let path = relative_path(dir, file);

        let url = match source::raw_file_url(&descriptor.git_url, &descriptor.git_branch, dir, file)
        {
            Ok(url) => url,
            Err(e) => return FetchResult::failed(path, e),
        };

        debug!("Fetching file: {}", url);

        let agent = self.agent.clone();
        let user_agent = self.user_agent.clone();
        let task_url = url.clone();
        let content = tokio::task::spawn_blocking(move || get_bytes(&agent, &task_url, &user_agent))
            .await
            .unwrap_or_else(|e| {
                Err(RegcacheError::FetchFailed {
                    url,
                    reason: format!("fetch task failed: {}", e),
                })
            });

        FetchResult {
            path,
            content: content.map(Payload::Bytes),
        }
    }
}

fn get_bytes(agent: &ureq::Agent, url: &str, user_agent: &str) -> RegcacheResult<Vec<u8>> {
    let failed = |reason: String| RegcacheError::FetchFailed {
        url: url.to_string(),
        reason,
    };

    let response = agent
        .get(url)
        .header("User-Agent", user_agent)
        .call()
        .map_err(|e| failed(e.to_string()))?;

    let status = response.status().as_u16();
    if status != 200 {
        return Err(failed(format!("HTTP {}", status)));
    }

    response
        .into_body()
        .read_to_vec()
        .map_err(|e| failed(e.to_string()))
}

struct DescriptorSource<'a> {
    fetcher: &'a RawUrlFetcher,
    descriptor: &'a ProjectDescriptor,
}

#[async_trait]
impl FileSource for DescriptorSource<'_> {
    async fn fetch_file(&self, dir: &str, file: &str) -> FetchResult {
        self.fetcher.fetch_at(self.descriptor, dir, file).await
    }
}

#[async_trait]
impl SourceFetcher for RawUrlFetcher {
    async fn fetch_artifacts(
        &self,
        descriptor: &ProjectDescriptor,
        _scratch_root: &Path,
    ) -> Artifacts {
        let build_definition = self.fetch(descriptor, &descriptor.target_file).await;

        let source = DescriptorSource {
            fetcher: self,
            descriptor,
        };
        let readme = fetch_readme(&source, &descriptor.git_path).await;

        Artifacts::new(build_definition, readme)
    }

    fn strategy(&self) -> FetchStrategy {
        FetchStrategy::RawUrl
    }
}
