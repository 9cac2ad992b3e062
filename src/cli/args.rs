//! Command-line argument parsing for devstrap
//!
//! This module defines the CLI structure using clap derive macros,
//! providing a user-friendly interface for installing components,
//! checking for stale installs, and cache management.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// devstrap - install development-environment components safely
#[derive(Parser, Debug)]
#[command(
    name = "devstrap",
    version,
    about = "Install development-environment components with verified downloads",
    long_about = "A component installer for development environments: digest-verified downloads \
with mirror fallback and retry, dependency-ordered concurrent installation, and rollback of \
partial failures."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Effective log level derived from verbosity flags
    pub fn log_level(&self) -> &'static str {
        if self.global.very_verbose {
            "debug"
        } else if self.global.verbose {
            "info"
        } else if self.global.quiet {
            "error"
        } else {
            "warn"
        }
    }
}

/// Global arguments available to all subcommands
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Cache directory path
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download and install components from a catalog
    Install(InstallArgs),

    /// Report components whose installed state is missing or stale
    CheckUpdates(CheckUpdatesArgs),

    /// Show the resolved install order and independent groups
    Graph(GraphArgs),

    /// Cache statistics and eviction
    Cache(CacheArgs),
}

/// Arguments for the install command
#[derive(Args, Debug, Clone)]
pub struct InstallArgs {
    /// Catalog file describing the installable components
    #[arg(short = 'f', long, value_name = "FILE")]
    pub catalog: PathBuf,

    /// Components to install (with their dependencies); all when empty
    pub components: Vec<String>,

    /// Bound on concurrent downloads and installs
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Roll back every installed component if any install fails
    #[arg(long)]
    pub strict_rollback: bool,

    /// Show the plan without downloading or installing anything
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the check-updates command
#[derive(Args, Debug, Clone)]
pub struct CheckUpdatesArgs {
    /// Catalog file describing the installable components
    #[arg(short = 'f', long, value_name = "FILE")]
    pub catalog: PathBuf,

    /// Components to check; all when empty
    pub components: Vec<String>,
}

/// Arguments for the graph command
#[derive(Args, Debug, Clone)]
pub struct GraphArgs {
    /// Catalog file describing the installable components
    #[arg(short = 'f', long, value_name = "FILE")]
    pub catalog: PathBuf,

    /// Components to plan; all when empty
    pub components: Vec<String>,
}

/// Arguments for cache management
#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache management actions
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show cache statistics
    Stats,
    /// Evict expired entries, then oldest-first until under the size budget
    Evict {
        /// Maximum entry age in hours (configured default when omitted)
        #[arg(long)]
        max_age_hours: Option<u64>,
        /// Size budget in bytes (configured default when omitted)
        #[arg(long)]
        max_total_bytes: Option<u64>,
    },
}
