//! Build artifact cache
//!
//! One slot per (app, job, tag) holds the build-definition file, the README
//! and a watermark naming the build number the content was taken from.
//!
//! # Layout
//!
//! ```text
//! {root}/{app_id}/{job_id}/{tag}/Dockerfile
//! {root}/{app_id}/{job_id}/{tag}/README.md
//! {root}/{app_id}/{job_id}/{tag}/BuildNumber
//! ```
//!
//! Library images (empty app id) omit the `{app_id}` segment.
//!
//! # Slot States
//!
//! | Watermark | Build definition | Meaning |
//! |-----------|------------------|---------|
//! | absent | absent | never synced, always stale |
//! | N | fetched | content of build N |
//! | N | fallback text | build N had no fetchable build definition |

pub mod install;
pub mod slot;
pub mod watermark;

pub use install::{
    fallback_payload, install, install_file, install_readme, write_file, Fallback, InstallMethod,
    Installed, MISSING_PLACEHOLDER, PRE_BUILD_PLACEHOLDER,
};
pub use slot::{CacheSlot, README_FILE, WATERMARK_FILE};
pub use watermark::StalenessOracle;
