pub mod html;
pub mod robots;

use std::sync::Arc;

use tracing::debug;
use url::Url;

use hiddencrawl_core::{CrawlError, FetchConfig, PageRecord, Transport};
use robots::RobotsRules;

/// Largest body we'll hand to the HTML parser; larger pages are truncated first
/// so a single oversized page can't blow up memory during parsing.
const MAX_PARSE_SIZE: usize = 5 * 1024 * 1024;

/// Selects a transport, honors robots.txt, fetches the page, and parses it into a
/// [`PageRecord`]. Robots rules are passed in rather than fetched here so the caller
/// can cache them once per site instead of once per page.
pub async fn fetch_and_parse(
    transport: &Arc<dyn Transport>,
    url: &Url,
    robots: &RobotsRules,
    config: &FetchConfig,
) -> Result<PageRecord, CrawlError> {
    if !robots.is_allowed(url.path()) {
        debug!(%url, "skipping, disallowed by robots.txt");
        return Err(CrawlError::RobotsDisallowed);
    }

    let response = transport.fetch(url, config).await?;
    if !response.is_success() {
        debug!(%url, status = response.status, "fetch returned non-success status");
        return Err(CrawlError::HttpStatus(response.status));
    }

    let body = if response.body.len() > MAX_PARSE_SIZE {
        &response.body[..MAX_PARSE_SIZE]
    } else {
        &response.body
    };
    let body_str = String::from_utf8_lossy(body);

    let parsed = html::parse_html(&body_str, &response.final_url);
    debug!(
        %url,
        links = parsed.links.len(),
        media = parsed.media_refs.len(),
        "parsed page"
    );

    Ok(PageRecord {
        url: response.final_url.clone(),
        title: parsed.title,
        body_text: parsed.body_text,
        raw_html: body_str.to_string(),
        links: parsed.links,
        media_refs: parsed.media_refs,
        fetched_at: response.fetched_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hiddencrawl_core::{FetchResponse, TransportKind};
    use std::collections::HashMap;

    struct StubTransport {
        status: u16,
        body: Vec<u8>,
    }

    #[async_trait]
    impl Transport for StubTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::Direct
        }

        async fn fetch(&self, url: &Url, _config: &FetchConfig) -> Result<FetchResponse, CrawlError> {
            Ok(FetchResponse {
                url: url.clone(),
                final_url: url.clone(),
                status: self.status,
                headers: HashMap::new(),
                body: self.body.clone(),
                content_type: Some("text/html".to_string()),
                fetched_at: chrono::Utc::now(),
                response_time_ms: 1,
            })
        }
    }

    #[tokio::test]
    async fn robots_disallow_short_circuits_before_fetch() {
        let transport: Arc<dyn Transport> = Arc::new(StubTransport {
            status: 200,
            body: b"<html></html>".to_vec(),
        });
        let robots = robots::parse_robots_txt("User-agent: *\nDisallow: /blocked\n");
        let url = Url::parse("http://example.onion/blocked/page").unwrap();
        let result = fetch_and_parse(&transport, &url, &robots, &FetchConfig::default()).await;
        assert!(matches!(result, Err(CrawlError::RobotsDisallowed)));
    }

    #[tokio::test]
    async fn non_success_status_becomes_http_error() {
        let transport: Arc<dyn Transport> = Arc::new(StubTransport {
            status: 404,
            body: b"not found".to_vec(),
        });
        let robots = RobotsRules::default();
        let url = Url::parse("http://example.onion/missing").unwrap();
        let result = fetch_and_parse(&transport, &url, &robots, &FetchConfig::default()).await;
        assert!(matches!(result, Err(CrawlError::HttpStatus(404))));
    }

    #[tokio::test]
    async fn success_produces_a_page_record() {
        let transport: Arc<dyn Transport> = Arc::new(StubTransport {
            status: 200,
            body: b"<html><head><title>Hi</title></head><body>text</body></html>".to_vec(),
        });
        let robots = RobotsRules::default();
        let url = Url::parse("http://example.onion/").unwrap();
        let page = fetch_and_parse(&transport, &url, &robots, &FetchConfig::default())
            .await
            .unwrap();
        assert_eq!(page.title, "Hi");
        assert_eq!(page.body_text, "text");
    }
}
