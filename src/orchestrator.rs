use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

use hiddencrawl_core::config::AppConfig;
use hiddencrawl_core::{FetchConfig, Site, SiteOutcome};
use hiddencrawl_crawler::crawl_site;
use hiddencrawl_networks::TransportRegistry;
use hiddencrawl_objectstore::ObjectStore;
use hiddencrawl_storage::Storage;

struct SiteAttempt {
    url: Url,
    retries: u32,
}

/// True if `site` hasn't been crawled at all, or was last crawled at least
/// `research_frequency_hours` ago.
fn is_due(site: &Site, research_frequency_hours: u64) -> bool {
    match site.last_crawled {
        None => true,
        Some(last) => Utc::now().signed_duration_since(last) >= chrono::Duration::hours(research_frequency_hours as i64),
    }
}

/// Runs the crawl forever: one full pass over every due site per cycle,
/// sleeping `research_frequency_hours` between cycles. Stops cooperatively
/// between batches (never mid-fetch) once `shutdown` fires.
pub async fn run_forever(
    config: Arc<AppConfig>,
    registry: Arc<TransportRegistry>,
    storage: Arc<Storage>,
    object_store: Arc<ObjectStore>,
    sites: Vec<Url>,
    shutdown: broadcast::Sender<()>,
) {
    let mut shutdown_rx = shutdown.subscribe();
    loop {
        let stopped = run_cycle(&config, &registry, &storage, &object_store, sites.clone(), &mut shutdown_rx).await;
        if stopped {
            info!("orchestrator stopped: shutdown requested");
            return;
        }
        info!(
            hours = config.general.research_frequency_hours,
            "crawl cycle complete, sleeping"
        );
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(config.general.research_frequency_hours * 3600)) => {}
            _ = shutdown_rx.recv() => {
                info!("shutdown signal received during sleep, stopping");
                return;
            }
        }
    }
}

/// One full working-queue-then-retry-queue pass over every due site. Returns
/// true if it exited early because a shutdown was requested.
async fn run_cycle(
    config: &Arc<AppConfig>,
    registry: &Arc<TransportRegistry>,
    storage: &Arc<Storage>,
    object_store: &Arc<ObjectStore>,
    sites: Vec<Url>,
    shutdown_rx: &mut broadcast::Receiver<()>,
) -> bool {
    let mut due = Vec::with_capacity(sites.len());
    for url in sites {
        let (is_onion, is_i2p) = Site::classify(&url);
        match storage.upsert_site(url.as_str(), is_onion, is_i2p).await {
            Ok(site) if is_due(&site, config.general.research_frequency_hours) => due.push(url),
            Ok(_) => debug!(site = %url, "skipping: crawled within research_frequency_hours"),
            Err(e) => warn!(site = %url, error = %e, "failed to look up site before crawl"),
        }
    }

    let mut working: VecDeque<SiteAttempt> = due
        .into_iter()
        .map(|url| SiteAttempt { url, retries: 0 })
        .collect();
    let mut retry_queue: VecDeque<SiteAttempt> = VecDeque::new();
    let fetch_config = FetchConfig::default();

    while !working.is_empty() || !retry_queue.is_empty() {
        if shutdown_rx.try_recv().is_ok() {
            info!(remaining = working.len() + retry_queue.len(), "stopping dispatch: shutdown requested");
            return true;
        }

        if working.is_empty() {
            info!(pending = retry_queue.len(), "promoting retry queue, pausing first");
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(30)) => {}
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received, stopping before retry promotion");
                    return true;
                }
            }
            working = std::mem::take(&mut retry_queue);
            continue;
        }

        let mut batch = Vec::new();
        while batch.len() < config.general.parallel_sites {
            match working.pop_front() {
                Some(attempt) => batch.push(attempt),
                None => break,
            }
        }

        let futures = batch.into_iter().map(|attempt| {
            let registry = registry.clone();
            let storage = storage.clone();
            let object_store = object_store.clone();
            let config = config.clone();
            let fetch_config = fetch_config.clone();
            async move {
                let outcome = crawl_site(
                    &registry,
                    &storage,
                    &object_store,
                    &config.media,
                    &config.frontier,
                    &fetch_config,
                    &attempt.url,
                )
                .await;
                (attempt, outcome)
            }
        });

        for (attempt, outcome) in join_all(futures).await {
            match outcome {
                SiteOutcome::Success { pages } => {
                    info!(site = %attempt.url, pages, "site crawled");
                }
                SiteOutcome::Failure { reason } => {
                    if attempt.retries + 1 >= config.general.max_site_retries {
                        warn!(site = %attempt.url, reason, "abandoning site after max retries");
                    } else {
                        warn!(site = %attempt.url, reason, retries = attempt.retries + 1, "will retry site");
                        retry_queue.push_back(SiteAttempt {
                            url: attempt.url,
                            retries: attempt.retries + 1,
                        });
                    }
                }
            }
        }
    }

    false
}
