//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// regcache - build definition and README cache for a container registry browser
///
/// Keeps one cache slot per (app, job, tag) filled with the build definition
/// and README of the project's source repository, refreshed whenever the
/// build system reports a new build number.
#[derive(Parser, Debug)]
#[command(name = "regcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "REGCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format (overrides general.log_format)
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Refresh cache slots for the projects in a descriptor manifest
    Sync(SyncArgs),

    /// Build the project index and fetch build definitions over raw URLs
    Index(IndexArgs),

    /// Print the cached content of one slot
    Show(ShowArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the sync command
#[derive(Parser, Debug)]
pub struct SyncArgs {
    /// TOML manifest with one [[project]] table per tag
    pub manifest: PathBuf,

    /// Override the cache root
    #[arg(long)]
    pub cache_root: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the index command
#[derive(Parser, Debug)]
pub struct IndexArgs {
    /// Read index files from a local directory instead of cloning the index repository
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "json")]
    pub format: OutputFormat,
}

/// Arguments for the show command
#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Job id
    pub job: String,

    /// Tag
    pub tag: String,

    /// Application id (omit for library images)
    #[arg(long, default_value = "")]
    pub app: String,

    /// Build-definition file name inside the slot
    #[arg(long)]
    pub file: Option<String>,

    /// Print the README instead of the build definition
    #[arg(long)]
    pub readme: bool,

    /// Override the cache root
    #[arg(long)]
    pub cache_root: Option<PathBuf>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}
