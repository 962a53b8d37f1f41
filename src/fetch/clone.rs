//! Clone fetch strategy
//!
//! Each sync operation gets its own [`ScratchClone`]: a `--depth 1
//! --single-branch` checkout under the batch's scratch namespace, named after
//! the cache key so concurrent operations never share a directory.

use super::{fetch_readme, relative_path, Artifacts, FetchResult, FileSource, Payload, SourceFetcher};
use crate::config::schema::FetchConfig;
use crate::descriptor::ProjectDescriptor;
use crate::error::{RegcacheError, RegcacheResult};
use crate::source::{self, FetchStrategy};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Temporary shallow checkout, removed when dropped
#[derive(Debug)]
pub struct ScratchClone {
    root: PathBuf,
    removed: bool,
}

impl ScratchClone {
    /// Shallow-clone `branch` of `url` into `dest`.
    ///
    /// `dest` is owned by the returned guard from the start, so a failed
    /// clone leaves nothing behind either.
    pub async fn checkout(
        git_binary: &str,
        url: &str,
        branch: &str,
        dest: PathBuf,
    ) -> RegcacheResult<Self> {
        let clone = Self {
            root: dest,
            removed: false,
        };

        let clone_failed = |reason: String| RegcacheError::CloneFailed {
            url: url.to_string(),
            branch: branch.to_string(),
            reason,
        };

        if let Some(parent) = clone.root.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| clone_failed(format!("creating {}: {}", parent.display(), e)))?;
        }
        if clone.root.exists() {
            // Leftover from an interrupted run with the same key
            tokio::fs::remove_dir_all(&clone.root)
                .await
                .map_err(|e| clone_failed(format!("clearing {}: {}", clone.root.display(), e)))?;
        }

        debug!("Cloning {} ({}) into {}", url, branch, clone.root.display());

        let output = Command::new(git_binary)
            .args(["clone", "--quiet", "--depth", "1", "--single-branch", "--branch"])
            .arg(branch)
            .arg("--")
            .arg(url)
            .arg(&clone.root)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| clone_failed(format!("running {}: {}", git_binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(clone_failed(stderr.trim().to_string()));
        }

        Ok(clone)
    }

    /// Root of the checkout
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Remove the checkout now, reporting failures
    pub async fn remove(mut self) -> RegcacheResult<()> {
        self.removed = true;
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RegcacheError::ScratchCleanupFailed {
                path: self.root.clone(),
                source: e,
            }),
        }
    }
}

impl Drop for ScratchClone {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "{}",
                RegcacheError::ScratchCleanupFailed {
                    path: self.root.clone(),
                    source: e,
                }
            ),
        }
    }
}

#[async_trait]
impl FileSource for ScratchClone {
    async fn fetch_file(&self, dir: &str, file: &str) -> FetchResult {
        let relative = relative_path(dir, file);

        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return FetchResult::failed(relative.clone(), RegcacheError::FileNotFound(relative));
        }

        let full = self.root.join(&relative);
        match tokio::fs::metadata(&full).await {
            Ok(meta) if meta.is_file() => FetchResult::ok(relative, Payload::File(full)),
            _ => FetchResult::failed(relative.clone(), RegcacheError::FileNotFound(relative)),
        }
    }
}

/// Fetches artifacts by shallow-cloning the source repository
#[derive(Debug, Clone)]
pub struct CloneFetcher {
    git_binary: String,
}

impl CloneFetcher {
    /// Create a fetcher from fetch settings
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            git_binary: config.git_binary.clone(),
        }
    }
}

#[async_trait]
impl SourceFetcher for CloneFetcher {
    async fn fetch_artifacts(&self, descriptor: &ProjectDescriptor, scratch_root: &Path) -> Artifacts {
        let url = source::normalize_url(&descriptor.git_url);
        let dest = scratch_root.join(descriptor.key().scratch_name());
        let build_definition_path = descriptor.build_definition_path();

        let clone =
            match ScratchClone::checkout(&self.git_binary, &url, &descriptor.git_branch, dest).await
            {
                Ok(clone) => clone,
                Err(e) => {
                    warn!("{}: {}", descriptor.key(), e);
                    let readme_error = RegcacheError::CloneFailed {
                        url,
                        branch: descriptor.git_branch.clone(),
                        reason: "repository unavailable".to_string(),
                    };
                    return Artifacts::new(
                        FetchResult::failed(build_definition_path, e),
                        FetchResult::failed(super::README_NAME, readme_error),
                    );
                }
            };

        let build_definition = clone
            .fetch_file(&descriptor.git_path, &descriptor.target_file)
            .await;
        let readme = fetch_readme(&clone, &descriptor.git_path).await;

        Artifacts::new(build_definition, readme).with_scratch(clone)
    }

    fn strategy(&self) -> FetchStrategy {
        FetchStrategy::Clone
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn git(dir: &Path, args: &[&str]) -> bool {
        std::process::Command::new("git")
            .args(args)
            .current_dir(dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Create a committed repository with `files`; None if git is unavailable
    fn init_repo(dir: &Path, branch: &str, files: &[(&str, &str)]) -> Option<PathBuf> {
        fs::create_dir_all(dir).unwrap();
        for (name, content) in files {
            let path = dir.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        let ok = git(dir, &["init", "--quiet"])
            && git(dir, &["checkout", "--quiet", "-b", branch])
            && git(dir, &["add", "."])
            && git(
                dir,
                &[
                    "-c",
                    "user.name=regcache",
                    "-c",
                    "user.email=regcache@localhost",
                    "commit",
                    "--quiet",
                    "-m",
                    "init",
                ],
            );
        ok.then(|| dir.to_path_buf())
    }

    fn file_url(path: &Path) -> String {
        format!("file://{}", path.display())
    }

    fn descriptor(url: String, git_path: &str) -> ProjectDescriptor {
        ProjectDescriptor {
            app_id: "centos".to_string(),
            job_id: "nginx".to_string(),
            tag: "1.0".to_string(),
            git_url: url,
            git_branch: "main".to_string(),
            git_path: git_path.to_string(),
            target_file: "Dockerfile".to_string(),
            pre_build_requested: false,
            build_number: "1".to_string(),
        }
    }

    #[tokio::test]
    async fn clone_reads_files_and_cleans_up() {
        let temp = TempDir::new().unwrap();
        let Some(repo) = init_repo(
            &temp.path().join("repo"),
            "main",
            &[
                ("nginx/Dockerfile", "FROM centos:7\n"),
                ("README.md", "root readme\n"),
            ],
        ) else {
            return;
        };

        let scratch = temp.path().join("scratch");
        let fetcher = CloneFetcher::new(&FetchConfig::default());
        let artifacts = fetcher
            .fetch_artifacts(&descriptor(file_url(&repo), "nginx"), &scratch)
            .await;

        assert_eq!(
            artifacts.build_definition.text().await.as_deref(),
            Some("FROM centos:7\n")
        );
        assert_eq!(artifacts.readme.text().await.as_deref(), Some("root readme\n"));
        assert_eq!(artifacts.readme.path, PathBuf::from("README.md"));

        let clone_dir = scratch.join(descriptor(String::new(), "").key().scratch_name());
        assert!(clone_dir.exists());
        artifacts.finish().await;
        assert!(!clone_dir.exists());
    }

    #[tokio::test]
    async fn missing_branch_is_clone_failure() {
        let temp = TempDir::new().unwrap();
        let Some(repo) = init_repo(&temp.path().join("repo"), "main", &[("Dockerfile", "x")])
        else {
            return;
        };

        let mut d = descriptor(file_url(&repo), "");
        d.git_branch = "does-not-exist".to_string();

        let scratch = temp.path().join("scratch");
        let artifacts = CloneFetcher::new(&FetchConfig::default())
            .fetch_artifacts(&d, &scratch)
            .await;

        assert!(matches!(
            artifacts.build_definition.content,
            Err(RegcacheError::CloneFailed { .. })
        ));
        assert!(!artifacts.readme.is_success());
        assert!(!scratch.join(d.key().scratch_name()).exists());
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let temp = TempDir::new().unwrap();
        let Some(repo) = init_repo(&temp.path().join("repo"), "main", &[("other.txt", "x")])
        else {
            return;
        };

        let clone = ScratchClone::checkout(
            "git",
            &file_url(&repo),
            "main",
            temp.path().join("scratch").join("one"),
        )
        .await
        .unwrap();

        let result = clone.fetch_file("", "Dockerfile").await;
        assert!(matches!(result.content, Err(RegcacheError::FileNotFound(_))));

        let escaped = clone.fetch_file("../..", "etc/passwd").await;
        assert!(!escaped.is_success());

        let root = clone.path().to_path_buf();
        drop(clone);
        assert!(!root.exists());
    }
}
