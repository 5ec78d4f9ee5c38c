use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;

use crate::error::CrawlError;

/// Which overlay (if any) a URL's host suffix routes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Direct,
    Tor,
    I2p,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Direct => "direct",
            TransportKind::Tor => "tor",
            TransportKind::I2p => "i2p",
        }
    }
}

/// True if `host` carries the `.onion` suffix.
pub fn is_onion_host(host: &str) -> bool {
    host.ends_with(".onion")
}

/// True if `host` carries the `.i2p` suffix.
pub fn is_i2p_host(host: &str) -> bool {
    host.ends_with(".i2p")
}

/// Every transport (direct / Tor / I2P) implements this. Transports are constructed once
/// at startup and are immutable and safe for concurrent use thereafter.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    fn kind(&self) -> TransportKind;
    async fn fetch(&self, url: &Url, config: &FetchConfig) -> Result<FetchResponse, CrawlError>;
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub max_body_size: usize,
    pub follow_redirects: bool,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_body_size: 16 * 1024 * 1024,
            follow_redirects: true,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; rv:128.0) Gecko/20100101 Firefox/128.0"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub url: Url,
    pub final_url: Url,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub response_time_ms: u64,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Media category, derived from URL extension with a `Content-Type` fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCategory {
    Image,
    Audio,
    Video,
    Document,
    Other,
}

impl MediaCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaCategory::Image => "image",
            MediaCategory::Audio => "audio",
            MediaCategory::Video => "video",
            MediaCategory::Document => "document",
            MediaCategory::Other => "other",
        }
    }

    /// The bucket a category's blobs live in. Document shares the `other` bucket —
    /// the object store's layout has four buckets, not five.
    pub fn bucket_category(&self) -> &'static str {
        match self {
            MediaCategory::Image => "images",
            MediaCategory::Audio => "audio",
            MediaCategory::Video => "video",
            MediaCategory::Document | MediaCategory::Other => "other",
        }
    }

    /// Categorize by file extension (case-insensitive, no leading dot).
    pub fn from_extension(ext: &str) -> Option<MediaCategory> {
        let ext = ext.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "webp" | "bmp" | "svg" | "ico" => Some(MediaCategory::Image),
            "mp3" | "wav" | "ogg" | "flac" | "m4a" | "aac" => Some(MediaCategory::Audio),
            "mp4" | "webm" | "avi" | "mov" | "mkv" | "flv" => Some(MediaCategory::Video),
            "pdf" | "doc" | "docx" | "txt" | "zip" | "rar" | "7z" => Some(MediaCategory::Document),
            _ => None,
        }
    }

    /// Categorize by `Content-Type`/MIME prefix, the fallback when the URL has no
    /// (or an unrecognized) extension.
    pub fn from_mime(mime: &str) -> Option<MediaCategory> {
        let mime = mime.split(';').next().unwrap_or(mime).trim();
        if mime.starts_with("image/") {
            Some(MediaCategory::Image)
        } else if mime.starts_with("audio/") {
            Some(MediaCategory::Audio)
        } else if mime.starts_with("video/") {
            Some(MediaCategory::Video)
        } else if mime == "application/pdf" || mime == "application/zip" {
            Some(MediaCategory::Document)
        } else {
            None
        }
    }
}

/// A candidate media reference pulled off a parsed page, not yet fetched.
#[derive(Debug, Clone)]
pub struct MediaRef {
    pub source_url: Url,
}

/// Everything the fetcher/parser extracted from one page.
#[derive(Debug, Clone)]
pub struct PageRecord {
    pub url: Url,
    pub title: String,
    pub body_text: String,
    pub raw_html: String,
    pub links: Vec<Url>,
    pub media_refs: Vec<MediaRef>,
    pub fetched_at: DateTime<Utc>,
}

/// A single entry in a site's BFS frontier.
#[derive(Debug, Clone)]
pub struct FrontierEntry {
    pub url: Url,
    pub depth: u32,
}

/// A site as stored by the persistence layer.
#[derive(Debug, Clone)]
pub struct Site {
    pub id: i64,
    pub url: String,
    pub is_onion: bool,
    pub is_i2p: bool,
    pub last_crawled: Option<DateTime<Utc>>,
}

impl Site {
    /// Derive the `is_onion`/`is_i2p` tags from a URL's host. The two are always
    /// mutually exclusive: a host cannot carry both suffixes.
    pub fn classify(url: &Url) -> (bool, bool) {
        let host = url.host_str().unwrap_or("");
        (is_onion_host(host), is_i2p_host(host))
    }
}

/// Terminal outcome of one site's crawl within a cycle.
#[derive(Debug, Clone)]
pub enum SiteOutcome {
    Success { pages: u32 },
    Failure { reason: String },
}

/// Result of attempting to store one media reference.
#[derive(Debug, Clone)]
pub enum MediaOutcome {
    Stored { category: MediaCategory, size_bytes: u64 },
    Skipped { reason: SkipReason },
    Error { detail: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Duplicate,
    TooLarge,
    DownloadDisabled,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Duplicate => "duplicate",
            SkipReason::TooLarge => "too_large",
            SkipReason::DownloadDisabled => "download_disabled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_onion_host() {
        let url = Url::parse("http://example123abc.onion/page").unwrap();
        assert_eq!(Site::classify(&url), (true, false));
    }

    #[test]
    fn classifies_i2p_host() {
        let url = Url::parse("http://example.i2p/page").unwrap();
        assert_eq!(Site::classify(&url), (false, true));
    }

    #[test]
    fn classifies_clearnet_host() {
        let url = Url::parse("https://example.com/page").unwrap();
        assert_eq!(Site::classify(&url), (false, false));
    }

    #[test]
    fn document_and_other_share_a_bucket() {
        assert_eq!(
            MediaCategory::Document.bucket_category(),
            MediaCategory::Other.bucket_category()
        );
    }

    #[test]
    fn categorizes_known_extensions() {
        assert_eq!(MediaCategory::from_extension("JPG"), Some(MediaCategory::Image));
        assert_eq!(MediaCategory::from_extension("mp3"), Some(MediaCategory::Audio));
        assert_eq!(MediaCategory::from_extension("mkv"), Some(MediaCategory::Video));
        assert_eq!(MediaCategory::from_extension("pdf"), Some(MediaCategory::Document));
        assert_eq!(MediaCategory::from_extension("exe"), None);
    }

    #[test]
    fn categorizes_known_mime_types() {
        assert_eq!(MediaCategory::from_mime("image/png"), Some(MediaCategory::Image));
        assert_eq!(MediaCategory::from_mime("video/mp4; charset=binary"), Some(MediaCategory::Video));
        assert_eq!(MediaCategory::from_mime("text/html"), None);
    }
}
