use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use hiddencrawl_core::{CrawlError, FetchConfig, FetchResponse, Transport, TransportKind};

/// Routes through a local I2P HTTP proxy (i2pd/I2P+'s 4444 by default).
pub struct I2pTransport {
    clients: Vec<reqwest::Client>,
    counter: AtomicUsize,
}

impl I2pTransport {
    pub fn new(
        proxy_addrs: &[String],
        connect_timeout_seconds: u64,
        request_timeout_seconds: u64,
    ) -> Result<Self, CrawlError> {
        if proxy_addrs.is_empty() {
            return Err(CrawlError::Proxy("no i2p http proxies configured".into()));
        }

        let mut clients = Vec::with_capacity(proxy_addrs.len());
        for addr in proxy_addrs {
            let proxy = reqwest::Proxy::all(addr.clone())
                .map_err(|e| CrawlError::Proxy(format!("{addr}: {e}")))?;

            let client = reqwest::Client::builder()
                .proxy(proxy)
                .connect_timeout(Duration::from_secs(connect_timeout_seconds))
                .timeout(Duration::from_secs(request_timeout_seconds))
                .pool_max_idle_per_host(4)
                .redirect(reqwest::redirect::Policy::limited(10))
                .build()
                .map_err(|e| CrawlError::Network(e.to_string()))?;

            clients.push(client);
        }

        Ok(Self {
            clients,
            counter: AtomicUsize::new(0),
        })
    }

    fn next_client(&self) -> &reqwest::Client {
        let idx = self.counter.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        &self.clients[idx]
    }

    async fn do_fetch(&self, url: &Url, config: &FetchConfig) -> Result<FetchResponse, CrawlError> {
        let start = Instant::now();
        let client = self.next_client();
        debug!(url = %url, "fetching via i2p");

        let mut resp = client.get(url.as_str()).send().await.map_err(|e| {
            warn!(url = %url, error = %e, "i2p fetch failed");
            CrawlError::Network(e.to_string())
        })?;

        let status = resp.status().as_u16();
        let final_url = Url::parse(resp.url().as_str()).unwrap_or_else(|_| url.clone());

        let mut headers = HashMap::new();
        for (k, v) in resp.headers() {
            if let Ok(val) = v.to_str() {
                headers.insert(k.as_str().to_string(), val.to_string());
            }
        }
        let content_type = headers.get("content-type").cloned();

        if let Some(len) = resp.content_length() {
            if len as usize > config.max_body_size {
                return Err(CrawlError::BodyTooLarge { size: len as usize, max: config.max_body_size });
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(|e| CrawlError::Network(e.to_string()))? {
            body.extend_from_slice(&chunk);
            if body.len() > config.max_body_size {
                return Err(CrawlError::BodyTooLarge { size: body.len(), max: config.max_body_size });
            }
        }

        Ok(FetchResponse {
            url: url.clone(),
            final_url,
            status,
            headers,
            body,
            content_type,
            fetched_at: chrono::Utc::now(),
            response_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl Transport for I2pTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::I2p
    }

    async fn fetch(&self, url: &Url, config: &FetchConfig) -> Result<FetchResponse, CrawlError> {
        crate::retry::with_retry(|| self.do_fetch(url, config)).await
    }
}
