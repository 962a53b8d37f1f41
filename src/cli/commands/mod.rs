//! CLI command implementations

pub mod config;
pub mod index;
pub mod show;
pub mod sync;

pub use config::execute as config;
pub use index::execute as index;
pub use show::execute as show;
pub use sync::execute as sync;
