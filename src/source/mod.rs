//! Source location
//!
//! Turns the free-form repository URLs found in project descriptors into
//! something fetchable. Users write `git://`, `http://`, trailing `.git` and
//! stray slashes; everything here is normalized before use.

use crate::error::{RegcacheError, RegcacheResult};
use std::fmt;

/// Which phase a fetch is made for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Bulk, read-only retrieval while building the index
    IndexBuild,
    /// Per-tag cache refresh
    TagSync,
}

/// How remote content is retrieved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// HTTP GET against a host-specific raw-content URL
    RawUrl,
    /// Single-branch shallow clone, then a file read
    Clone,
}

impl FetchStrategy {
    /// Strategy used for a phase.
    ///
    /// Tag sync clones because it needs to probe the repository root for
    /// the README, which raw URLs can only do per host convention.
    pub fn for_phase(phase: Phase) -> Self {
        match phase {
            Phase::IndexBuild => Self::RawUrl,
            Phase::TagSync => Self::Clone,
        }
    }
}

impl fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RawUrl => "raw-url",
            Self::Clone => "clone",
        };
        write!(f, "{}", name)
    }
}

/// Supported raw-content conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawHost {
    /// `raw.githubusercontent.com/{owner}/{repo}/{branch}/{path}`
    GitHub,
    /// `{host}/{owner}/{repo}/raw/{branch}/{path}`
    GitLab,
}

impl RawHost {
    /// Detect the convention from the URL's host
    pub fn detect(url: &str) -> RegcacheResult<Self> {
        let host = host_of(url).to_ascii_lowercase();
        if host.contains("github") {
            Ok(Self::GitHub)
        } else if host.contains("gitlab") {
            Ok(Self::GitLab)
        } else {
            Err(RegcacheError::UnsupportedHost(url.to_string()))
        }
    }
}

/// Normalize a repository URL: https scheme, no `.git`, no trailing slash
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let url = if let Some(rest) = url.strip_prefix("git://") {
        format!("https://{}", rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("https://{}", rest)
    } else {
        url.to_string()
    };

    let url = lowercase_host(&url);
    let url = url.trim_end_matches('/');
    let url = url.strip_suffix(".git").unwrap_or(url);
    url.trim_end_matches('/').to_string()
}

/// Hosts compare case-insensitively; user info and path keep their case
fn lowercase_host(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let (authority, path) = rest.split_at(rest.find('/').unwrap_or(rest.len()));
    let authority = match authority.rsplit_once('@') {
        Some((user, host)) => format!("{}@{}", user, host.to_ascii_lowercase()),
        None => authority.to_ascii_lowercase(),
    };
    format!("{}://{}{}", scheme, authority, path)
}

/// Build the raw-content URL of `file` under `path` on `branch`
pub fn raw_file_url(git_url: &str, branch: &str, path: &str, file: &str) -> RegcacheResult<String> {
    let url = normalize_url(git_url);
    let host = RawHost::detect(&url)?;

    let mut segments: Vec<&str> = Vec::with_capacity(4);
    let base = match host {
        RawHost::GitHub => url.replacen("github.com", "raw.githubusercontent.com", 1),
        RawHost::GitLab => {
            segments.push("raw");
            url
        }
    };

    segments.push(branch.trim_matches('/'));
    segments.push(path.trim_matches('/'));
    segments.push(file.trim_start_matches('/'));

    let tail: Vec<&str> = segments.into_iter().filter(|s| !s.is_empty()).collect();
    Ok(format!("{}/{}", base, tail.join("/")))
}

fn host_of(url: &str) -> &str {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let authority = rest.split('/').next().unwrap_or(rest);
    authority.rsplit('@').next().unwrap_or(authority)
}
