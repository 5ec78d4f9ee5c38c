use tracing::{debug, info, warn};
use url::Url;

use hiddencrawl_core::config::{FrontierConfig, MediaConfig};
use hiddencrawl_core::{CrawlError, FetchConfig, Site, SiteOutcome};
use hiddencrawl_media as media;
use hiddencrawl_networks::TransportRegistry;
use hiddencrawl_objectstore::ObjectStore;
use hiddencrawl_parser::{fetch_and_parse, robots};
use hiddencrawl_storage::{PageInsert, Storage};

use crate::frontier::Frontier;

/// Crawls one site to completion: selects its transport once, fetches robots.txt
/// once, then runs a per-site breadth-first walk up to the configured depth and
/// page caps, storing every page and its media along the way.
pub async fn crawl_site(
    registry: &TransportRegistry,
    storage: &Storage,
    object_store: &ObjectStore,
    media_config: &MediaConfig,
    frontier_config: &FrontierConfig,
    fetch_config: &FetchConfig,
    site_url: &Url,
) -> SiteOutcome {
    let (is_onion, is_i2p) = Site::classify(site_url);
    let site = match storage.upsert_site(site_url.as_str(), is_onion, is_i2p).await {
        Ok(s) => s,
        Err(e) => return SiteOutcome::Failure { reason: e.to_string() },
    };

    let transport = match registry.select(site_url) {
        Ok(t) => t,
        Err(e) => return SiteOutcome::Failure { reason: e.to_string() },
    };
    debug!(site = %site_url, transport = transport.kind().as_str(), "transport selected");

    let robots_rules = robots::fetch_robots(&transport, site_url).await;
    let site_host = site_url.host_str().unwrap_or("").to_string();

    let mut frontier = Frontier::new(site_url.clone(), frontier_config.max_depth);
    let mut pages_fetched: u32 = 0;
    let mut pages_attempted: u32 = 0;

    while let Some(entry) = frontier.pop() {
        if pages_fetched >= frontier_config.max_pages_per_site {
            debug!(site = %site_url, "reached max pages per site");
            break;
        }
        pages_attempted += 1;

        match fetch_and_parse(&transport, &entry.url, &robots_rules, fetch_config).await {
            Ok(page) => {
                let page_id = match storage
                    .insert_page(PageInsert {
                        site_id: site.id,
                        url: page.url.as_str(),
                        title: &page.title,
                        body_text: &page.body_text,
                        raw_html: &page.raw_html,
                        depth: entry.depth,
                        fetched_at: page.fetched_at,
                    })
                    .await
                {
                    Ok(id) => id,
                    Err(e) => {
                        warn!(url = %page.url, error = %e, "failed to store page");
                        continue;
                    }
                };

                for link in &page.links {
                    if link.host_str() == Some(site_host.as_str()) {
                        frontier.push(link.clone(), entry.depth + 1);
                    }
                }

                for media_ref in &page.media_refs {
                    let outcome = media::process(
                        &transport,
                        storage,
                        object_store,
                        media_config,
                        page_id,
                        media_ref,
                    )
                    .await;
                    debug!(url = %media_ref.source_url, outcome = ?outcome, "media processed");
                }

                pages_fetched += 1;
            }
            Err(CrawlError::RobotsDisallowed) => {
                debug!(url = %entry.url, "skipped: disallowed by robots.txt");
            }
            Err(e) => {
                warn!(url = %entry.url, error = %e, "page fetch failed");
            }
        }
    }

    if let Err(e) = storage.touch_site_last_crawled(site.id).await {
        warn!(site = %site_url, error = %e, "failed to update last_crawled");
    }

    if pages_fetched == 0 && pages_attempted > 0 {
        return SiteOutcome::Failure {
            reason: "every page attempt failed".to_string(),
        };
    }

    info!(site = %site_url, pages = pages_fetched, "site crawl complete");
    SiteOutcome::Success { pages: pages_fetched }
}
