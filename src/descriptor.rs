//! Project descriptors and cache keys
//!
//! A [`ProjectDescriptor`] is everything the core needs to know about one
//! buildable tag. Descriptors are produced by external collaborators (the
//! index parser, the build-tracking API client) and are immutable for the
//! duration of a sync pass.

use crate::error::{RegcacheError, RegcacheResult};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// Alias used for images without an application id
pub const LIBRARY_ALIAS: &str = "library";

/// One buildable unit: an (app, job, tag) plus where its sources live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDescriptor {
    /// Application id (empty for library images)
    #[serde(default)]
    pub app_id: String,

    /// Job id
    pub job_id: String,

    /// Desired tag
    pub tag: String,

    /// Source repository URL
    pub git_url: String,

    /// Source branch
    #[serde(default = "default_branch")]
    pub git_branch: String,

    /// Directory of the build-definition file within the repository
    #[serde(default)]
    pub git_path: String,

    /// Build-definition file name, relative to `git_path`
    #[serde(default = "default_target_file")]
    pub target_file: String,

    /// Whether a pre-build step was requested for this project
    #[serde(default)]
    pub pre_build_requested: bool,

    /// Latest build number reported by the build system (opaque token)
    #[serde(deserialize_with = "opaque_token")]
    pub build_number: String,
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_target_file() -> String {
    "Dockerfile".to_string()
}

/// Build numbers arrive as strings or integers depending on the producer.
fn opaque_token<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Token {
        Text(String),
        Number(i64),
    }

    Ok(match Token::deserialize(deserializer)? {
        Token::Text(s) => s.trim().to_string(),
        Token::Number(n) => n.to_string(),
    })
}

impl ProjectDescriptor {
    /// Cache key of this descriptor
    pub fn key(&self) -> CacheKey {
        CacheKey::new(&self.app_id, &self.job_id, &self.tag)
    }

    /// Repository-relative path of the build-definition file
    pub fn build_definition_path(&self) -> PathBuf {
        Path::new(self.git_path.trim_matches('/')).join(self.target_file.trim_start_matches('/'))
    }

    /// File name the build definition gets inside a cache slot
    pub fn build_definition_name<'a>(&'a self, default: &'a str) -> &'a str {
        Path::new(&self.target_file)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(default)
    }
}

/// Identity of a cache slot.
///
/// Equality and hashing go through [`CacheKey::app_alias`], so every
/// spelling of a library app id names the same slot.
#[derive(Debug, Clone, Serialize)]
pub struct CacheKey {
    pub app_id: String,
    pub job_id: String,
    pub tag: String,
}

impl CacheKey {
    /// Create a new key
    pub fn new(app_id: &str, job_id: &str, tag: &str) -> Self {
        Self {
            app_id: app_id.to_string(),
            job_id: job_id.to_string(),
            tag: tag.to_string(),
        }
    }

    /// Library images have no app id of their own
    pub fn is_library(&self) -> bool {
        self.app_id.is_empty() || self.app_id.eq_ignore_ascii_case(LIBRARY_ALIAS)
    }

    /// App id with the lower-case library alias applied
    pub fn app_alias(&self) -> &str {
        if self.is_library() {
            LIBRARY_ALIAS
        } else {
            &self.app_id
        }
    }

    /// Reject components that would escape the cache root
    pub fn validate(&self) -> RegcacheResult<()> {
        if !self.is_library() {
            validate_component(&self.app_id)?;
        }
        validate_component(&self.job_id)?;
        validate_component(&self.tag)
    }

    /// Slot path relative to the cache root; library images omit the app segment
    pub fn relative_path(&self) -> PathBuf {
        let mut path = PathBuf::new();
        if !self.is_library() {
            path.push(&self.app_id);
        }
        path.push(&self.job_id);
        path.push(&self.tag);
        path
    }

    /// Directory name for this key's scratch clone, unique per key
    pub fn scratch_name(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.app_alias().as_bytes());
        hasher.update([0]);
        hasher.update(self.job_id.as_bytes());
        hasher.update([0]);
        hasher.update(self.tag.as_bytes());
        let digest = hasher.finalize();

        format!(
            "{}-{}-{}-{}",
            self.app_alias(),
            self.job_id,
            self.tag,
            hex::encode(&digest[..6])
        )
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.app_alias() == other.app_alias() && self.job_id == other.job_id && self.tag == other.tag
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.app_alias().hash(state);
        self.job_id.hash(state);
        self.tag.hash(state);
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.app_alias(), self.job_id, self.tag)
    }
}

fn validate_component(component: &str) -> RegcacheResult<()> {
    let invalid = |reason: &str| RegcacheError::InvalidKey {
        component: component.to_string(),
        reason: reason.to_string(),
    };

    if component.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if component == "." || component == ".." {
        return Err(invalid("must not be a relative directory"));
    }
    if component.contains('/') || component.contains('\\') || component.contains('\0') {
        return Err(invalid("must not contain path separators"));
    }
    Ok(())
}

#[derive(Deserialize)]
struct Manifest {
    #[serde(default, rename = "project")]
    projects: Vec<ProjectDescriptor>,
}

/// Load a TOML descriptor manifest made of `[[project]]` tables
pub async fn load_manifest(path: &Path) -> RegcacheResult<Vec<ProjectDescriptor>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RegcacheError::io(format!("reading manifest {}", path.display()), e))?;

    let manifest: Manifest =
        toml::from_str(&content).map_err(|e| RegcacheError::ManifestInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    Ok(manifest.projects)
}
