//! devstrap CLI application
//!
//! Command-line interface for installing development-environment components.
//! Features verified concurrent downloads, dependency-ordered installation,
//! and rollback of partial failures.

use std::process;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use devstrap::cli::{
    handle_cache, handle_check_updates, handle_graph, handle_install, Cli, Commands,
};
use devstrap::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(&cli);

    info!("devstrap v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Install(args) => {
            info!("Executing install command");
            handle_install(&cli.global, args).await
        }
        Commands::CheckUpdates(args) => {
            info!("Executing check-updates command");
            handle_check_updates(&cli.global, args).await
        }
        Commands::Graph(args) => {
            info!("Executing graph command");
            handle_graph(&cli.global, args).await
        }
        Commands::Cache(args) => {
            info!("Executing cache command");
            handle_cache(&cli.global, args).await
        }
    }
}

/// Initialize logging based on CLI verbosity settings
fn init_logging(cli: &Cli) {
    let log_level = cli.log_level();

    let filter = EnvFilter::from_default_env()
        .add_directive(
            format!("devstrap={}", log_level)
                .parse()
                .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::WARN.into()),
        );

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose)
        .init();
}
