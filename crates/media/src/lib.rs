use std::sync::Arc;

use tracing::{debug, warn};

use hiddencrawl_core::config::MediaConfig;
use hiddencrawl_core::{CrawlError, FetchConfig, MediaCategory, MediaOutcome, MediaRef, SkipReason, Transport};
use hiddencrawl_objectstore::ObjectStore;
use hiddencrawl_storage::{MediaInsert, Storage};

fn extension_of(url: &url::Url) -> &str {
    url.path().rsplit('.').next().unwrap_or("bin")
}

/// Downloads one media reference, categorizes it, enforces the per-category size
/// cap, uploads it to the object store, and records it. Does nothing but return
/// `Skipped(Duplicate)` if `page_id`/`source_url` was already stored.
pub async fn process(
    transport: &Arc<dyn Transport>,
    storage: &Storage,
    object_store: &ObjectStore,
    media_config: &MediaConfig,
    page_id: i64,
    media_ref: &MediaRef,
) -> MediaOutcome {
    let source_url = media_ref.source_url.as_str();

    if !media_config.download_all_media {
        debug!(url = source_url, "media download disabled, logging reference only");
        return MediaOutcome::Skipped {
            reason: SkipReason::DownloadDisabled,
        };
    }

    match storage.media_exists(page_id, source_url).await {
        Ok(true) => {
            return MediaOutcome::Skipped {
                reason: SkipReason::Duplicate,
            }
        }
        Ok(false) => {}
        Err(e) => return MediaOutcome::Error { detail: e.to_string() },
    }

    let ext = extension_of(&media_ref.source_url).to_string();
    let initial_category = MediaCategory::from_extension(&ext).unwrap_or(MediaCategory::Other);
    let initial_cap = media_config.max_bytes_for_category(initial_category);

    let mut fetch_config = FetchConfig::default();
    fetch_config.max_body_size = initial_cap as usize;

    let response = match transport.fetch(&media_ref.source_url, &fetch_config).await {
        Ok(r) => r,
        Err(CrawlError::BodyTooLarge { .. }) => {
            return MediaOutcome::Skipped {
                reason: SkipReason::TooLarge,
            }
        }
        Err(e) => return MediaOutcome::Error { detail: e.to_string() },
    };

    if !response.is_success() {
        return MediaOutcome::Error {
            detail: format!("http status {}", response.status),
        };
    }

    let category = response
        .content_type
        .as_deref()
        .and_then(MediaCategory::from_mime)
        .unwrap_or(initial_category);
    let cap = media_config.max_bytes_for_category(category);
    let size_bytes = response.body.len() as u64;
    if size_bytes > cap {
        return MediaOutcome::Skipped {
            reason: SkipReason::TooLarge,
        };
    }

    let unix_seconds = response.fetched_at.timestamp();
    let location = match object_store
        .put(
            page_id,
            category,
            source_url,
            &ext,
            response.content_type.as_deref(),
            response.body.clone(),
            unix_seconds,
        )
        .await
    {
        Ok(loc) => loc,
        Err(e) => return MediaOutcome::Error { detail: e.to_string() },
    };

    let inline_threshold = media_config.inline_threshold_bytes();
    let inline_bytes = if size_bytes <= inline_threshold {
        Some(response.body.as_slice())
    } else {
        None
    };

    let insert = MediaInsert {
        page_id,
        source_url,
        category: category.as_str(),
        mime_type: response.content_type.as_deref(),
        bucket: &location.bucket,
        object_key: &location.key,
        size_bytes: size_bytes as i64,
        inline_bytes,
        downloaded_at: response.fetched_at,
    };

    if let Err(e) = storage.insert_media(insert).await {
        // A handful of drivers reject overlong bytea values; retry once without
        // the inline copy since the object store upload already succeeded.
        if e.to_string().to_lowercase().contains("too long") {
            warn!(url = source_url, "inline bytes rejected by database, retrying without them");
            let retry = MediaInsert {
                page_id,
                source_url,
                category: category.as_str(),
                mime_type: response.content_type.as_deref(),
                bucket: &location.bucket,
                object_key: &location.key,
                size_bytes: size_bytes as i64,
                inline_bytes: None,
                downloaded_at: response.fetched_at,
            };
            if let Err(e2) = storage.insert_media(retry).await {
                return MediaOutcome::Error { detail: e2.to_string() };
            }
        } else {
            return MediaOutcome::Error { detail: e.to_string() };
        }
    }

    MediaOutcome::Stored { category, size_bytes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn extension_of_strips_leading_path() {
        let url = Url::parse("http://example.onion/a/b/pic.PNG").unwrap();
        assert_eq!(extension_of(&url), "PNG");
    }

    #[test]
    fn extension_of_defaults_to_bin_without_a_dot() {
        let url = Url::parse("http://example.onion/a/b/pic").unwrap();
        assert_eq!(extension_of(&url), "bin");
    }
}
