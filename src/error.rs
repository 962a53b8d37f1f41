//! Error types for regcache
//!
//! All modules use `RegcacheResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for regcache operations
pub type RegcacheResult<T> = Result<T, RegcacheError>;

/// All errors that can occur in regcache
#[derive(Error, Debug)]
pub enum RegcacheError {
    // Remote content errors
    #[error("Unsupported source host: {0} (only github and gitlab raw URLs are supported)")]
    UnsupportedHost(String),

    #[error("Failed to fetch {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("Failed to clone {url} (branch {branch}): {reason}")]
    CloneFailed {
        url: String,
        branch: String,
        reason: String,
    },

    #[error("File not found in source: {0}")]
    FileNotFound(PathBuf),

    // Cache errors
    #[error("Failed to install {path}: {source}")]
    InstallFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove scratch clone {path}: {source}")]
    ScratchCleanupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid cache key component '{component}': {reason}")]
    InvalidKey { component: String, reason: String },

    #[error("Cache slot not populated: {0}")]
    SlotNotFound(PathBuf),

    // Input errors
    #[error("Invalid descriptor manifest {path}: {reason}")]
    ManifestInvalid { path: PathBuf, reason: String },

    #[error("Invalid index file {path}: {reason}")]
    IndexInvalid { path: PathBuf, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RegcacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an install error for a destination path
    pub fn install(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::InstallFailed {
            path: path.into(),
            source,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ConfigInvalid { .. } => Some("Run: regcache config init --force"),
            Self::SlotNotFound(_) => Some("Run: regcache sync <MANIFEST> to populate the cache"),
            Self::ManifestInvalid { .. } => {
                Some("Each [[project]] needs app_id, job_id, tag, git_url and build_number")
            }
            _ => None,
        }
    }
}
