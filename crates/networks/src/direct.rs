use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use url::Url;

use hiddencrawl_core::{CrawlError, FetchConfig, FetchResponse, Transport, TransportKind};

/// Unproxied client. Constructed unconditionally at startup but only ever reached
/// through the registry when Tor has been administratively disabled, which itself
/// refuses to start the crawl — so in practice this exists for tests and for the
/// day a non-mandatory mode is added, not for the running crawler.
pub struct DirectTransport {
    client: reqwest::Client,
}

impl DirectTransport {
    pub fn new(connect_timeout_seconds: u64, request_timeout_seconds: u64) -> Result<Self, CrawlError> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(connect_timeout_seconds))
            .timeout(std::time::Duration::from_secs(request_timeout_seconds))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| CrawlError::Network(e.to_string()))?;
        Ok(Self { client })
    }

    async fn do_fetch(&self, url: &Url, config: &FetchConfig) -> Result<FetchResponse, CrawlError> {
        let start = Instant::now();

        let mut resp = self
            .client
            .get(url.as_str())
            .header("User-Agent", &config.user_agent)
            .send()
            .await
            .map_err(|e| CrawlError::Network(e.to_string()))?;

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
impl Transport for DirectTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Direct
    }

    async fn fetch(&self, url: &Url, config: &FetchConfig) -> Result<FetchResponse, CrawlError> {
        crate::retry::with_retry(|| self.do_fetch(url, config)).await
    }
}
