//! Cache installation
//!
//! Files land in a slot through a staging file in the same directory that is
//! renamed over the destination, so readers never observe a partial file.
//! Materialized sources (files inside a scratch clone) are hard-linked into
//! the staging path when the filesystem allows it and copied otherwise.

use super::slot::CacheSlot;
use crate::error::{RegcacheError, RegcacheResult};
use crate::fetch::{FetchResult, Payload};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Installed when pre-build was requested and no build definition exists yet
pub const PRE_BUILD_PLACEHOLDER: &str = "# Pre-build was requested for this project.\n\
# The build definition file is generated by the pre-build step and is not available yet.\n";

/// Installed when the build definition could not be fetched
pub const MISSING_PLACEHOLDER: &str =
    "# The build definition file for this project does not exist.\n";

/// Fallback text for an unfetchable build definition
pub fn fallback_payload(pre_build_requested: bool) -> &'static str {
    if pre_build_requested {
        PRE_BUILD_PLACEHOLDER
    } else {
        MISSING_PLACEHOLDER
    }
}

/// How a file reached its destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMethod {
    /// Destination already was the source file
    Unchanged,
    /// Hard link to the source
    Linked,
    /// Full copy of the source
    Copied,
    /// Written from memory
    Written,
}

impl fmt::Display for InstallMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unchanged => "unchanged",
            Self::Linked => "linked",
            Self::Copied => "copied",
            Self::Written => "written",
        };
        write!(f, "{}", name)
    }
}

/// What to install when the fetch failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Leave the previous file (if any) in place
    None,
    /// Install the build-definition placeholder
    BuildDefinition { pre_build_requested: bool },
}

/// Result of installing one artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Installed {
    /// Fetched content is in place
    Fetched(InstallMethod),
    /// Placeholder text is in place
    Fallback,
    /// Nothing was installed
    Skipped,
}

/// Install a materialized file at `dest`: hard link, else copy + sync
pub async fn install_file(src: &Path, dest: &Path) -> RegcacheResult<InstallMethod> {
    let src = src.to_path_buf();
    let target = dest.to_path_buf();
    tokio::task::spawn_blocking(move || install_file_blocking(&src, &target))
        .await
        .map_err(|e| RegcacheError::Internal(format!("install task failed: {}", e)))?
        .map_err(|e| RegcacheError::install(dest, e))
}

/// Write `content` to `dest` through a synced temporary file
pub async fn write_file(dest: &Path, content: &[u8]) -> RegcacheResult<()> {
    let target = dest.to_path_buf();
    let content = content.to_vec();
    tokio::task::spawn_blocking(move || write_file_blocking(&target, &content))
        .await
        .map_err(|e| RegcacheError::Internal(format!("install task failed: {}", e)))?
        .map_err(|e| RegcacheError::install(dest, e))
}

/// Install a fetch result as `file_name` in `slot`.
///
/// With [`Fallback::BuildDefinition`] the destination always ends up
/// populated unless the filesystem itself fails: either with the fetched
/// content or with the matching placeholder.
pub async fn install(
    slot: &CacheSlot,
    file_name: &str,
    result: &FetchResult,
    fallback: Fallback,
) -> RegcacheResult<Installed> {
    let dest = slot.file_path(file_name);

    match &result.content {
        Ok(payload) => match install_payload(payload, &dest).await {
            Ok(method) => {
                debug!("{}: {} {} ({})", slot.key(), file_name, method, result.path.display());
                return Ok(Installed::Fetched(method));
            }
            Err(e) if fallback == Fallback::None => return Err(e),
            Err(e) => warn!("{}: {}. Installing fallback", slot.key(), e),
        },
        Err(e) => debug!("{}: {} unavailable: {}", slot.key(), result.path.display(), e),
    }

    match fallback {
        Fallback::None => Ok(Installed::Skipped),
        Fallback::BuildDefinition {
            pre_build_requested,
        } => {
            write_file(&dest, fallback_payload(pre_build_requested).as_bytes()).await?;
            Ok(Installed::Fallback)
        }
    }
}

/// Install the README, logging failures instead of returning them
pub async fn install_readme(slot: &CacheSlot, result: &FetchResult) -> Installed {
    if let Err(ref e) = result.content {
        warn!("{}: README unavailable: {}", slot.key(), e);
    }

    match install(slot, super::README_FILE, result, Fallback::None).await {
        Ok(installed) => installed,
        Err(e) => {
            warn!("{}: {}", slot.key(), e);
            Installed::Skipped
        }
    }
}

async fn install_payload(payload: &Payload, dest: &Path) -> RegcacheResult<InstallMethod> {
    match payload {
        Payload::File(src) => install_file(src, dest).await,
        Payload::Bytes(bytes) => write_file(dest, bytes)
            .await
            .map(|()| InstallMethod::Written),
    }
}

fn install_file_blocking(src: &Path, dest: &Path) -> io::Result<InstallMethod> {
    if same_file(src, dest)? {
        return Ok(InstallMethod::Unchanged);
    }

    let staging = staging_path(dest);
    remove_if_exists(&staging)?;

    let method = match fs::hard_link(src, &staging) {
        Ok(()) => InstallMethod::Linked,
        Err(e) => {
            debug!("Hard link {} failed ({}), copying", src.display(), e);
            if let Err(e) = copy_synced(src, &staging) {
                let _ = fs::remove_file(&staging);
                return Err(e);
            }
            InstallMethod::Copied
        }
    };

    if let Err(e) = fs::rename(&staging, dest) {
        let _ = fs::remove_file(&staging);
        return Err(e);
    }
    Ok(method)
}

fn copy_synced(src: &Path, dest: &Path) -> io::Result<()> {
    let mut reader = File::open(src)?;
    let mut writer = File::create(dest)?;
    io::copy(&mut reader, &mut writer)?;
    writer.sync_all()
}

fn write_file_blocking(dest: &Path, content: &[u8]) -> io::Result<()> {
    let dir = dest
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no parent"))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

/// Both paths exist as regular files and are the same inode
fn same_file(a: &Path, b: &Path) -> io::Result<bool> {
    let meta_b = match fs::metadata(b) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    let meta_a = fs::metadata(a)?;

    if !meta_a.is_file() || !meta_b.is_file() {
        return Ok(false);
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        Ok(meta_a.dev() == meta_b.dev() && meta_a.ino() == meta_b.ino())
    }
    #[cfg(not(unix))]
    {
        Ok(false)
    }
}

fn staging_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{}.staging", name))
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::CacheKey;
    use tempfile::TempDir;

    fn slot(temp: &TempDir) -> CacheSlot {
        let slot = CacheSlot::new(temp.path(), CacheKey::new("centos", "nginx", "1.0"));
        fs::create_dir_all(slot.dir()).unwrap();
        slot
    }

    fn not_found(name: &str) -> FetchResult {
        FetchResult::failed(name, RegcacheError::FileNotFound(PathBuf::from(name)))
    }

    #[tokio::test]
    async fn install_file_links_then_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("Dockerfile.src");
        let dest = temp.path().join("Dockerfile");
        fs::write(&src, "FROM centos:7\n").unwrap();

        let first = install_file(&src, &dest).await.unwrap();
        let second = install_file(&src, &dest).await.unwrap();

        assert_eq!(first, InstallMethod::Linked);
        assert_eq!(second, InstallMethod::Unchanged);
        assert_eq!(fs::read_to_string(&dest).unwrap(), "FROM centos:7\n");
        assert!(!staging_path(&dest).exists());
    }

    #[tokio::test]
    async fn install_file_replaces_existing_destination() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("new");
        let dest = temp.path().join("Dockerfile");
        fs::write(&src, "new").unwrap();
        fs::write(&dest, "old").unwrap();

        install_file(&src, &dest).await.unwrap();
        assert_eq!(fs::read_to_string(&dest).unwrap(), "new");
    }

    #[test]
    fn copy_fallback_syncs_content() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dest = temp.path().join("dest");
        fs::write(&src, "payload").unwrap();

        copy_synced(&src, &dest).unwrap();
        assert_eq!(fs::read_to_string(&dest).unwrap(), "payload");
        assert!(!same_file(&src, &dest).unwrap());
    }

    #[tokio::test]
    async fn write_file_twice_is_identical() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("README.md");

        write_file(&dest, b"# nginx\n").await.unwrap();
        write_file(&dest, b"# nginx\n").await.unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"# nginx\n");
    }

    #[tokio::test]
    async fn fallback_selection_is_total() {
        for pre_build_requested in [true, false] {
            let temp = TempDir::new().unwrap();
            let slot = slot(&temp);

            let installed = install(
                &slot,
                "Dockerfile",
                &not_found("Dockerfile"),
                Fallback::BuildDefinition {
                    pre_build_requested,
                },
            )
            .await
            .unwrap();

            assert_eq!(installed, Installed::Fallback);
            let content = slot.read_build_definition("Dockerfile").await.unwrap();
            assert!(!content.is_empty());
            assert_eq!(content, fallback_payload(pre_build_requested));
        }
        assert_ne!(PRE_BUILD_PLACEHOLDER, MISSING_PLACEHOLDER);
    }

    #[tokio::test]
    async fn fetched_bytes_are_written() {
        let temp = TempDir::new().unwrap();
        let slot = slot(&temp);
        let result = FetchResult::ok("Dockerfile", Payload::Bytes(b"FROM fedora\n".to_vec()));

        let installed = install(
            &slot,
            "Dockerfile",
            &result,
            Fallback::BuildDefinition {
                pre_build_requested: true,
            },
        )
        .await
        .unwrap();

        assert_eq!(installed, Installed::Fetched(InstallMethod::Written));
        assert_eq!(
            slot.read_build_definition("Dockerfile").await.unwrap(),
            "FROM fedora\n"
        );
    }

    #[tokio::test]
    async fn missing_source_file_falls_back() {
        let temp = TempDir::new().unwrap();
        let slot = slot(&temp);
        let result = FetchResult::ok(
            "Dockerfile",
            Payload::File(temp.path().join("vanished")),
        );

        let installed = install(
            &slot,
            "Dockerfile",
            &result,
            Fallback::BuildDefinition {
                pre_build_requested: false,
            },
        )
        .await
        .unwrap();

        assert_eq!(installed, Installed::Fallback);
        assert_eq!(
            slot.read_build_definition("Dockerfile").await.unwrap(),
            MISSING_PLACEHOLDER
        );
    }

    #[tokio::test]
    async fn readme_failure_keeps_previous_readme() {
        let temp = TempDir::new().unwrap();
        let slot = slot(&temp);
        fs::write(slot.readme_path(), "previous").unwrap();

        let installed = install_readme(&slot, &not_found("README.md")).await;

        assert_eq!(installed, Installed::Skipped);
        assert_eq!(slot.read_readme().await.unwrap().as_deref(), Some("previous"));
    }
}
