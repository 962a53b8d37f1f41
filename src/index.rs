//! Container index
//!
//! The index repository holds one YAML file per namespace under `index.d/`,
//! each listing the projects built from it. Building the index means reading
//! those files and fetching every project's build definition and README over
//! raw-content URLs.

use crate::config::schema::{CacheConfig, FetchConfig, IndexConfig};
use crate::descriptor::ProjectDescriptor;
use crate::error::{RegcacheError, RegcacheResult};
use crate::fetch::{ScratchClone, SourceFetcher};
use futures_util::future::join_all;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One project entry of an index file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct IndexProject {
    pub id: i64,
    pub app_id: String,
    pub job_id: String,
    pub desired_tag: String,
    pub git_url: String,
    pub git_branch: String,
    pub git_path: String,
    pub target_file: String,
    pub build_context: String,
    #[serde(deserialize_with = "one_or_many")]
    pub depends_on: Vec<String>,
    pub notify_email: String,
    pub prebuild_script: String,
    pub prebuild_context: String,
}

impl IndexProject {
    /// Whether the project declares a pre-build step
    pub fn pre_build_requested(&self) -> bool {
        !self.prebuild_script.trim().is_empty()
    }

    /// Descriptor for this project at `build_number`
    pub fn to_descriptor(&self, build_number: &str) -> ProjectDescriptor {
        ProjectDescriptor {
            app_id: self.app_id.clone(),
            job_id: self.job_id.clone(),
            tag: self.desired_tag.clone(),
            git_url: self.git_url.clone(),
            git_branch: self.git_branch.clone(),
            git_path: self.git_path.clone(),
            target_file: self.target_file.clone(),
            pre_build_requested: self.pre_build_requested(),
            build_number: build_number.to_string(),
        }
    }
}

/// `depends-on` is written either as a single string or as a list
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
    })
}

/// One parsed `index.d` file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexFile {
    /// File name the entries were read from
    #[serde(skip_deserializing)]
    pub name: String,

    #[serde(rename = "Projects", default)]
    pub projects: Vec<IndexProject>,
}

/// A project together with the content fetched for it
#[derive(Debug, Clone, Serialize)]
pub struct IndexedProject {
    #[serde(flatten)]
    pub project: IndexProject,
    pub build_definition: Option<String>,
    pub readme: Option<String>,
}

/// Parse every index file in `dir`, skipping template files.
///
/// A single unreadable or malformed file fails the whole load.
pub async fn load_index_dir(dir: &Path, template_marker: &str) -> RegcacheResult<Vec<IndexFile>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| RegcacheError::io(format!("reading index directory {}", dir.display()), e))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| RegcacheError::io("reading index entry", e))?
    {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if !template_marker.is_empty() && name.contains(template_marker) {
            debug!("Skipping index template {}", name);
            continue;
        }
        if path.is_file() {
            paths.push((name, path));
        }
    }
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for (name, path) in paths {
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| RegcacheError::io(format!("reading index file {}", path.display()), e))?;

        let mut file: IndexFile =
            serde_yaml::from_str(&content).map_err(|e| RegcacheError::IndexInvalid {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        file.name = name;
        files.push(file);
    }

    debug!("Loaded {} index file(s) from {}", files.len(), dir.display());
    Ok(files)
}

/// Clone the index repository and parse its index folder
pub async fn retrieve_index(
    index: &IndexConfig,
    cache: &CacheConfig,
    fetch: &FetchConfig,
) -> RegcacheResult<Vec<IndexFile>> {
    tokio::fs::create_dir_all(&cache.scratch_dir)
        .await
        .map_err(|e| RegcacheError::io("creating scratch directory", e))?;
    let scratch = tempfile::Builder::new()
        .prefix("regcache-index-")
        .tempdir_in(&cache.scratch_dir)
        .map_err(|e| RegcacheError::io("creating scratch namespace", e))?;

    info!("Retrieving index from {}", index.repo_url);
    let clone = ScratchClone::checkout(
        &fetch.git_binary,
        &crate::source::normalize_url(&index.repo_url),
        &index.branch,
        scratch.path().join("index"),
    )
    .await?;

    let files = load_index_dir(&clone.path().join(&index.folder), &index.template_marker).await;

    if let Err(e) = clone.remove().await {
        warn!("{}", e);
    }
    files
}

/// Fetch build definitions and READMEs for every project in `files`.
///
/// Projects are fetched concurrently; failures leave the field empty.
pub async fn build_index(
    fetcher: Arc<dyn SourceFetcher>,
    files: &[IndexFile],
    scratch_dir: &Path,
) -> RegcacheResult<Vec<IndexedProject>> {
    tokio::fs::create_dir_all(scratch_dir)
        .await
        .map_err(|e| RegcacheError::io("creating scratch directory", e))?;
    let scratch = tempfile::Builder::new()
        .prefix("regcache-index-")
        .tempdir_in(scratch_dir)
        .map_err(|e| RegcacheError::io("creating scratch namespace", e))?;

    let projects: Vec<IndexProject> = files.iter().flat_map(|f| f.projects.clone()).collect();
    info!(
        "Fetching build definitions for {} project(s) with the {} strategy",
        projects.len(),
        fetcher.strategy()
    );

    let handles = projects.iter().cloned().map(|project| {
        let fetcher = Arc::clone(&fetcher);
        let scratch_root = scratch.path().to_path_buf();
        tokio::spawn(async move {
            let descriptor = project.to_descriptor("");
            let artifacts = fetcher.fetch_artifacts(&descriptor, &scratch_root).await;

            if let Err(ref e) = artifacts.build_definition.content {
                warn!("Unable to retrieve '{}' '{}': {}", project.git_url, project.git_branch, e);
            }
            if let Err(ref e) = artifacts.readme.content {
                warn!(
                    "Unable to retrieve README for '{}' '{}': {}",
                    project.git_url, project.git_branch, e
                );
            }

            let build_definition = artifacts.build_definition.text().await;
            let readme = artifacts.readme.text().await;
            artifacts.finish().await;

            IndexedProject {
                project,
                build_definition,
                readme,
            }
        })
    });

    let indexed = join_all(handles)
        .await
        .into_iter()
        .zip(projects)
        .map(|(joined, project)| {
            joined.unwrap_or_else(|e| {
                warn!("Index task for {} failed: {}", project.job_id, e);
                IndexedProject {
                    project,
                    build_definition: None,
                    readme: None,
                }
            })
        })
        .collect();

    Ok(indexed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{Artifacts, FetchResult, Payload};
    use crate::source::FetchStrategy;
    use async_trait::async_trait;
    use tempfile::TempDir;

    const NAMESPACE: &str = r#"
Projects:
  - id: 1
    app-id: centos
    job-id: nginx
    git-url: https://github.com/CentOS/container-images
    git-path: nginx/1.12
    git-branch: master
    target-file: Dockerfile
    desired-tag: "1.12"
    notify-email: ops@example.org
    depends-on: centos/centos:7
  - id: 2
    app-id: centos
    job-id: httpd
    git-url: https://gitlab.com/centos/httpd.git
    git-path: /
    git-branch: master
    target-file: Dockerfile
    desired-tag: latest
    notify-email: ops@example.org
    depends-on:
      - centos/centos:7
      - centos/base:1
    prebuild-script: hooks/prebuild.sh
    prebuild-context: /
"#;

    #[tokio::test]
    async fn parses_index_files_and_skips_template() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("centos.yaml"), NAMESPACE).unwrap();
        std::fs::write(temp.path().join("index_template.yml"), "not: [valid").unwrap();

        let files = load_index_dir(temp.path(), "index_template").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "centos.yaml");

        let projects = &files[0].projects;
        assert_eq!(projects.len(), 2);
        assert_eq!(projects[0].depends_on, vec!["centos/centos:7"]);
        assert_eq!(projects[1].depends_on.len(), 2);
        assert!(!projects[0].pre_build_requested());
        assert!(projects[1].pre_build_requested());
        assert_eq!(projects[0].desired_tag, "1.12");
    }

    #[tokio::test]
    async fn malformed_file_fails_load() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("broken.yaml"), "Projects: {").unwrap();

        let err = load_index_dir(temp.path(), "index_template").await.unwrap_err();
        assert!(matches!(err, RegcacheError::IndexInvalid { .. }));
    }

    #[test]
    fn descriptor_from_project() {
        let file: IndexFile = serde_yaml::from_str(NAMESPACE).unwrap();
        let d = file.projects[1].to_descriptor("17");

        assert_eq!(d.key().relative_path(), std::path::PathBuf::from("centos/httpd/latest"));
        assert_eq!(d.build_number, "17");
        assert!(d.pre_build_requested);
    }

    struct NginxOnly;

    #[async_trait]
    impl SourceFetcher for NginxOnly {
        async fn fetch_artifacts(&self, d: &ProjectDescriptor, _scratch: &Path) -> Artifacts {
            if d.job_id == "nginx" {
                Artifacts::new(
                    FetchResult::ok("Dockerfile", Payload::Bytes(b"FROM centos:7".to_vec())),
                    FetchResult::ok("README.md", Payload::Bytes(b"# nginx".to_vec())),
                )
            } else {
                Artifacts::new(
                    FetchResult::failed("Dockerfile", RegcacheError::UnsupportedHost(d.git_url.clone())),
                    FetchResult::failed("README.md", RegcacheError::UnsupportedHost(d.git_url.clone())),
                )
            }
        }

        fn strategy(&self) -> FetchStrategy {
            FetchStrategy::RawUrl
        }
    }

    #[tokio::test]
    async fn build_index_keeps_order_and_isolates_failures() {
        let temp = TempDir::new().unwrap();
        let file: IndexFile = serde_yaml::from_str(NAMESPACE).unwrap();

        let indexed = build_index(Arc::new(NginxOnly), &[file], temp.path())
            .await
            .unwrap();

        assert_eq!(indexed.len(), 2);
        assert_eq!(indexed[0].project.job_id, "nginx");
        assert_eq!(indexed[0].build_definition.as_deref(), Some("FROM centos:7"));
        assert_eq!(indexed[0].readme.as_deref(), Some("# nginx"));
        assert_eq!(indexed[1].project.job_id, "httpd");
        assert!(indexed[1].build_definition.is_none());
        assert!(indexed[1].readme.is_none());
    }
}
