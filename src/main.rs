mod cli;
mod orchestrator;
mod site_list;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

// Use mimalloc to prevent memory bloat under long-running high-concurrency workloads.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use hiddencrawl_core::config::AppConfig;
use hiddencrawl_networks::TransportRegistry;
use hiddencrawl_objectstore::ObjectStore;
use hiddencrawl_storage::Storage;

use crate::cli::{Cli, Commands};

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

fn load_config(path: &str) -> Result<AppConfig> {
    let config_str = std::fs::read_to_string(path).unwrap_or_else(|_| {
        warn!(path, "config file not found, using embedded defaults");
        include_str!("../config/default.toml").to_string()
    });
    let mut config: AppConfig = toml::from_str(&config_str)?;

    if let Ok(v) = std::env::var("PARALLEL_SITES") {
        if let Ok(parsed) = v.parse() {
            config.general.parallel_sites = parsed;
        }
    }

    Ok(config)
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let storage = Storage::new(&config.database.postgres_url, config.database.max_connections).await?;
    storage.run_migrations().await?;

    let object_store = ObjectStore::connect(&config.object_store).await;
    object_store.ensure_buckets().await?;

    let (registry, health_manager) = TransportRegistry::build(&config).await?;
    if let Some(manager) = health_manager {
        tokio::spawn(manager.run());
    }

    match cli.command {
        Commands::Crawl => {
            let sites = site_list::load(&config.general.site_list_path)?;
            info!(count = sites.len(), "loaded site list");

            let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
            {
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("shutdown signal received, finishing in-flight work");
                        let _ = shutdown_tx.send(());
                    }
                });
            }

            orchestrator::run_forever(
                Arc::new(config),
                Arc::new(registry),
                Arc::new(storage),
                Arc::new(object_store),
                sites,
                shutdown_tx,
            )
            .await;
        }
        Commands::Status => {
            let pages = storage.get_page_count().await?;
            let media = storage.get_media_count().await?;
            let sites = storage.get_site_count().await?;
            println!("sites: {sites}");
            println!("pages: {pages}");
            println!("media: {media}");
        }
    }

    Ok(())
}
