use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use wreq_util::Emulation;
use tracing::{debug, warn};
use url::Url;

use hiddencrawl_core::{CrawlError, FetchConfig, FetchResponse, Transport, TransportKind};

/// Routes through one or more local Tor SOCKS ports. Uses `wreq` rather than
/// `reqwest` so the TLS/HTTP fingerprint resembles a real browser rather than
/// a Rust HTTP client — onion services increasingly fingerprint clients before
/// serving them.
pub struct TorTransport {
    clients: Vec<wreq::Client>,
    counter: AtomicUsize,
}

impl TorTransport {
    pub fn new(
        socks_addrs: &[String],
        connect_timeout_seconds: u64,
        request_timeout_seconds: u64,
    ) -> Result<Self, CrawlError> {
        if socks_addrs.is_empty() {
            return Err(CrawlError::Proxy("no tor socks proxies configured".into()));
        }

        let mut clients = Vec::new();
        for addr in socks_addrs {
            let proxy = wreq::Proxy::all(addr.clone())
                .map_err(|e| CrawlError::Proxy(format!("{addr}: {e}")))?;

            let client = wreq::Client::builder()
                .emulation(Emulation::Firefox128)
                .proxy(proxy)
                .cookie_store(true)
                .connect_timeout(Duration::from_secs(connect_timeout_seconds))
                .timeout(Duration::from_secs(request_timeout_seconds))
                .cert_verification(false)
                .build()
                .map_err(|e| CrawlError::Network(e.to_string()))?;

            clients.push(client);
        }

        Ok(Self {
            clients,
            counter: AtomicUsize::new(0),
        })
    }

    fn next_client(&self) -> &wreq::Client {
        let idx = self.counter.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        &self.clients[idx]
    }

    async fn do_fetch(&self, url: &Url, config: &FetchConfig) -> Result<FetchResponse, CrawlError> {
        let start = Instant::now();
        let client = self.next_client();
        debug!(url = %url, "fetching via tor");

        let mut resp = client.get(url.as_str()).send().await.map_err(|e| {
            warn!(url = %url, error = %e, "tor fetch failed");
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

        // Reject on the advertised length before pulling a single byte, then cap
        // the stream as chunks arrive so an oversized body is never fully buffered.
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
impl Transport for TorTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Tor
    }

    async fn fetch(&self, url: &Url, config: &FetchConfig) -> Result<FetchResponse, CrawlError> {
        crate::retry::with_retry(|| self.do_fetch(url, config)).await
    }
}

/// A single TCP connect against the SOCKS port, used once at startup. Tor is
/// treated as stable once reachable — the core never probes it again and never
/// restarts it.
pub async fn probe_tor_reachable(socks_addr: &str, timeout: Duration) -> bool {
    let host_port = socks_addr
        .trim_start_matches("socks5h://")
        .trim_start_matches("socks5://");
    tokio::time::timeout(timeout, tokio::net::TcpStream::connect(host_port))
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false)
}
