//! regcache - build definition and README cache for a container registry browser
//!
//! Keeps one slot per (app, job, tag) filled with the project's build
//! definition and README, refreshed from git hosts whenever the build system
//! reports a new build number.

pub mod cache;
pub mod cli;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod fetch;
pub mod index;
pub mod source;
pub mod sync;
pub mod ui;

pub use error::{RegcacheError, RegcacheResult};
