//! Command-line interface components
//!
//! This module contains CLI-specific code for the devstrap application,
//! including argument parsing, progress display, and command handlers.

pub mod args;
pub mod commands;
pub mod progress;

pub use args::{CacheAction, CacheArgs, CheckUpdatesArgs, Cli, Commands, GlobalArgs, GraphArgs, InstallArgs};
pub use commands::{handle_cache, handle_check_updates, handle_graph, handle_install};
pub use progress::ProgressDisplay;
