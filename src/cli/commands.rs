//! Command handlers for the devstrap CLI
//!
//! Each handler wires the configured services together, runs the requested
//! operation, and prints a human-readable summary. Service construction is
//! explicit: every collaborator the orchestrator needs is built here and
//! injected, nothing is global.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::app::cache::DownloadCache;
use crate::app::catalog::Catalog;
use crate::app::client::{DownloadEngine, HttpHandler, RetryCoordinator};
use crate::app::graph::DependencyGraph;
use crate::app::installer::{InstallationExecutor, ProcessRunner, RollbackManager};
use crate::app::mirrors::MirrorResolver;
use crate::app::models::{BatchStatus, ComponentSpec};
use crate::app::orchestrator::{spawn_ctrl_c_handler, BatchStats, Orchestrator};
use crate::app::progress::ChannelSink;
use crate::cli::args::{CacheAction, CacheArgs, CheckUpdatesArgs, GlobalArgs, GraphArgs, InstallArgs};
use crate::cli::progress::ProgressDisplay;
use crate::config::AppConfig;
use crate::constants::workers;
use crate::errors::{AppError, Result};

/// Load the application configuration honoring global flags
async fn load_config(global: &GlobalArgs) -> Result<AppConfig> {
    Ok(AppConfig::load_or_default(global.config.as_deref()).await?)
}

/// Load a catalog and select the requested components
async fn load_selection(catalog_path: &Path, names: &[String]) -> Result<Vec<ComponentSpec>> {
    let catalog = Catalog::load(catalog_path).await?;
    Ok(catalog.select(names)?)
}

/// Build the full service stack behind an orchestrator
async fn build_orchestrator(
    config: &AppConfig,
    global: &GlobalArgs,
    sink: Option<ChannelSink>,
) -> Result<Orchestrator> {
    let http = Arc::new(HttpHandler::new(
        config.client_config().build_http_client()?,
        config.client.rate_limit_rps,
    )?);
    let cache = Arc::new(
        DownloadCache::new(config.cache_config(global.cache_dir.clone())).await?,
    );
    let engine = Arc::new(DownloadEngine::new(http.clone(), cache.staging_dir()));
    let resolver = Arc::new(MirrorResolver::new(config.mirrors.clone()));
    let retry = Arc::new(RetryCoordinator::new(
        engine,
        resolver,
        config.retry_config(),
    ));
    let rollback = Arc::new(RollbackManager::new(config.state_dir()?).await?);
    let executor = Arc::new(InstallationExecutor::new(
        Arc::new(ProcessRunner),
        rollback.clone(),
        config.orchestrator_config().install_timeout,
    ));

    let mut builder = Orchestrator::builder()
        .config(config.orchestrator_config())
        .http(http)
        .cache(cache)
        .retry(retry)
        .executor(executor)
        .rollback(rollback);
    if let Some(sink) = sink {
        builder = builder.sink(Arc::new(sink));
    }
    Ok(builder.build()?)
}

/// Handle the install command
pub async fn handle_install(global: &GlobalArgs, args: InstallArgs) -> Result<()> {
    let mut config = load_config(global).await?;
    if let Some(concurrency) = args.concurrency {
        config.orchestrator.max_concurrency = concurrency;
    }
    if args.strict_rollback {
        config.orchestrator.strict_rollback = true;
    }

    let specs = load_selection(&args.catalog, &args.components).await?;
    info!("Selected {} components for installation", specs.len());

    if args.dry_run {
        return print_plan(&specs);
    }

    let (sink, rx) = ChannelSink::new(workers::PROGRESS_CHANNEL_CAPACITY);
    let display = ProgressDisplay::new(!global.quiet).spawn(rx);

    let orchestrator = build_orchestrator(&config, global, Some(sink)).await?;
    let ctrl_c = spawn_ctrl_c_handler(orchestrator.cancel_token());

    let result = orchestrator.install(specs).await?;

    ctrl_c.abort();
    drop(orchestrator); // Closes the progress channel
    let _ = display.await;

    for error in &result.planning_errors {
        eprintln!("error: {}", error);
    }
    for report in &result.reports {
        println!("  {:<24} {}", report.id.to_string(), report.state);
    }
    println!("{}", BatchStats::from_result(&result).summary());

    match result.status {
        BatchStatus::Completed => Ok(()),
        BatchStatus::Partial => {
            eprintln!("warning: batch completed partially");
            Ok(())
        }
        BatchStatus::Failed => Err(AppError::generic("batch failed; no components installed")),
    }
}

/// Handle the check-updates command
pub async fn handle_check_updates(global: &GlobalArgs, args: CheckUpdatesArgs) -> Result<()> {
    let config = load_config(global).await?;
    let specs = load_selection(&args.catalog, &args.components).await?;

    let orchestrator = build_orchestrator(&config, global, None).await?;
    let stale = orchestrator.check_updates(&specs).await?;

    if stale.is_empty() {
        println!("All {} components are up to date", specs.len());
    } else {
        println!("{} of {} components need installation:", stale.len(), specs.len());
        for name in stale {
            println!("  {}", name);
        }
    }
    Ok(())
}

/// Handle the graph command: print install order and independent groups
pub async fn handle_graph(_global: &GlobalArgs, args: GraphArgs) -> Result<()> {
    let specs = load_selection(&args.catalog, &args.components).await?;
    print_plan(&specs)
}

fn print_plan(specs: &[ComponentSpec]) -> Result<()> {
    let graph = DependencyGraph::build(specs)?;
    let order = graph.topological_order()?;
    let groups = graph.independent_groups()?;

    println!("Install order:");
    for (position, name) in order.iter().enumerate() {
        println!("  {:>3}. {}", position + 1, name);
    }
    println!("Independent groups (members install concurrently):");
    for (index, group) in groups.iter().enumerate() {
        println!("  group {}: {}", index, group.join(", "));
    }
    Ok(())
}

/// Handle cache management commands
pub async fn handle_cache(global: &GlobalArgs, args: CacheArgs) -> Result<()> {
    let config = load_config(global).await?;
    let cache = DownloadCache::new(config.cache_config(global.cache_dir.clone())).await?;

    match args.action {
        CacheAction::Stats => {
            let stats = cache.stats().await;
            println!("Cache root:  {}", stats.cache_root.display());
            println!("Entries:     {}", stats.entry_count);
            println!("Total bytes: {}", stats.total_bytes);
        }
        CacheAction::Evict {
            max_age_hours,
            max_total_bytes,
        } => {
            let report = cache
                .evict(
                    max_age_hours.unwrap_or(config.cache.max_age_hours),
                    max_total_bytes.unwrap_or(config.cache.max_total_bytes),
                )
                .await?;
            println!(
                "Evicted {} expired and {} oversized entries ({} bytes freed)",
                report.removed_expired, report.removed_for_size, report.bytes_freed
            );
        }
    }
    Ok(())
}
