//! Cache slot paths and read-back

use crate::descriptor::CacheKey;
use crate::error::{RegcacheError, RegcacheResult};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Watermark file name inside a slot
pub const WATERMARK_FILE: &str = "BuildNumber";

/// README file name inside a slot
pub const README_FILE: &str = "README.md";

/// On-disk cache unit for one (app, job, tag)
#[derive(Debug, Clone)]
pub struct CacheSlot {
    key: CacheKey,
    dir: PathBuf,
}

impl CacheSlot {
    /// Locate the slot for `key` under `root`
    pub fn new(root: &Path, key: CacheKey) -> Self {
        let dir = root.join(key.relative_path());
        Self { key, dir }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Slot directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a named artifact in this slot
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn watermark_path(&self) -> PathBuf {
        self.dir.join(WATERMARK_FILE)
    }

    pub fn readme_path(&self) -> PathBuf {
        self.dir.join(README_FILE)
    }

    /// Stored watermark, or None if the slot was never populated
    pub async fn read_watermark(&self) -> RegcacheResult<Option<String>> {
        read_optional(&self.watermark_path())
            .await
            .map(|content| content.map(|s| s.trim().to_string()))
    }

    /// Installed build definition (real content or fallback text)
    pub async fn read_build_definition(&self, name: &str) -> RegcacheResult<String> {
        read_optional(&self.file_path(name))
            .await?
            .ok_or_else(|| RegcacheError::SlotNotFound(self.dir.clone()))
    }

    /// Installed README, if any was ever fetched
    pub async fn read_readme(&self) -> RegcacheResult<Option<String>> {
        read_optional(&self.readme_path()).await
    }
}

async fn read_optional(path: &Path) -> RegcacheResult<Option<String>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RegcacheError::io(format!("reading {}", path.display()), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn paths_follow_layout() {
        let slot = CacheSlot::new(Path::new("/cache"), CacheKey::new("centos", "nginx", "1.0"));
        assert_eq!(slot.dir(), Path::new("/cache/centos/nginx/1.0"));
        assert_eq!(
            slot.watermark_path(),
            PathBuf::from("/cache/centos/nginx/1.0/BuildNumber")
        );
        assert_eq!(
            slot.file_path("Dockerfile"),
            PathBuf::from("/cache/centos/nginx/1.0/Dockerfile")
        );

        let library = CacheSlot::new(Path::new("/cache"), CacheKey::new("", "nginx", "1.0"));
        assert_eq!(library.readme_path(), PathBuf::from("/cache/nginx/1.0/README.md"));
    }

    #[tokio::test]
    async fn empty_slot_reads() {
        let temp = TempDir::new().unwrap();
        let slot = CacheSlot::new(temp.path(), CacheKey::new("", "nginx", "1.0"));

        assert!(slot.read_watermark().await.unwrap().is_none());
        assert!(slot.read_readme().await.unwrap().is_none());
        assert!(matches!(
            slot.read_build_definition("Dockerfile").await,
            Err(RegcacheError::SlotNotFound(_))
        ));
    }
}
