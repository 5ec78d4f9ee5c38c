use std::future::Future;
use std::time::Duration;

use tracing::warn;

use hiddencrawl_core::{CrawlError, FetchResponse};

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(500);

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Retries a single fetch attempt up to `MAX_ATTEMPTS` times with exponential
/// backoff when the response status is 429/500/502/503/504. Network-level
/// errors (refused connections, timeouts, oversized bodies) are not retried
/// here — a dead proxy or an oversized body won't heal between attempts, and
/// each transport already round-robins across its own client pool.
pub async fn with_retry<F, Fut>(mut attempt: F) -> Result<FetchResponse, CrawlError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<FetchResponse, CrawlError>>,
{
    let mut delay = BASE_BACKOFF;
    let mut result = attempt().await;

    for attempt_no in 1..MAX_ATTEMPTS {
        let status = match &result {
            Ok(resp) if is_retryable_status(resp.status) => resp.status,
            _ => break,
        };
        warn!(status, attempt = attempt_no, delay_ms = delay.as_millis() as u64, "retrying transient status");
        tokio::time::sleep(delay).await;
        delay *= 2;
        result = attempt().await;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::Utc;
    use url::Url;

    fn response(status: u16) -> FetchResponse {
        let url = Url::parse("http://example.onion/").unwrap();
        FetchResponse {
            url: url.clone(),
            final_url: url,
            status,
            headers: HashMap::new(),
            body: vec![],
            content_type: None,
            fetched_at: Utc::now(),
            response_time_ms: 0,
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry_on_first_try() {
        let calls = AtomicU32::new(0);
        let result = with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(response(200)) }
        })
        .await
        .unwrap();
        assert_eq!(result.status, 200);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_on_retryable_status_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retry(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(response(if n == 0 { 503 } else { 200 })) }
        })
        .await
        .unwrap();
        assert_eq!(result.status, 200);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result = with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(response(500)) }
        })
        .await
        .unwrap();
        assert_eq!(result.status, 500);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_status() {
        let calls = AtomicU32::new(0);
        let result = with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(response(404)) }
        })
        .await
        .unwrap();
        assert_eq!(result.status, 404);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn does_not_retry_network_errors() {
        let calls = AtomicU32::new(0);
        let result = with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CrawlError::Network("connection refused".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
