//! Configuration schema for regcache
//!
//! Configuration is stored at `~/.config/regcache/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache layout settings
    pub cache: CacheConfig,

    /// Remote fetch settings
    pub fetch: FetchConfig,

    /// Index repository settings
    pub index: IndexConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Cache layout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root directory holding one slot per (app, job, tag)
    pub root: PathBuf,

    /// Parent directory for per-batch scratch clones
    pub scratch_dir: PathBuf,

    /// Slot file name used when a descriptor's target file has no name
    pub build_definition_name: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("regcache")
                .join("buildfiles"),
            scratch_dir: std::env::temp_dir(),
            build_definition_name: "Dockerfile".to_string(),
        }
    }
}

/// Remote fetch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// User-Agent sent with raw-content requests
    pub user_agent: String,

    /// Git executable used for shallow clones
    pub git_binary: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("regcache/{}", env!("CARGO_PKG_VERSION")),
            git_binary: "git".to_string(),
        }
    }
}

/// Index repository configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Repository holding the index description files
    pub repo_url: String,

    /// Branch of the index repository
    pub branch: String,

    /// Folder inside the repository containing the YAML files
    pub folder: String,

    /// Index files whose name contains this marker are skipped
    pub template_marker: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            repo_url: "https://github.com/CentOS/container-index".to_string(),
            branch: "master".to_string(),
            folder: "index.d".to_string(),
            template_marker: "index_template".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[cache]"));
        assert!(toml.contains("[index]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.cache.build_definition_name, "Dockerfile");
        assert_eq!(config.index.folder, "index.d");
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [cache]
            root = "/srv/regcache"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.cache.root, PathBuf::from("/srv/regcache"));
        assert_eq!(config.fetch.git_binary, "git"); // default preserved
    }
}
