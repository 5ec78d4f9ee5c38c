use thiserror::Error;

/// Errors raised by the transport and fetch layer.
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("network error: {0}")]
    Network(String),

    #[error("timeout after {0}s")]
    Timeout(u64),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("no transport available for this URL")]
    NoTransport,

    #[error("http error: status {0}")]
    HttpStatus(u16),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("proxy error: {0}")]
    Proxy(String),

    #[error("body too large: {size} bytes (max {max})")]
    BodyTooLarge { size: usize, max: usize },

    #[error("disallowed by robots.txt")]
    RobotsDisallowed,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}
