use serde::Deserialize;

/// Top-level configuration, loaded once at startup and never re-read. No component
/// performs its own environment lookups after this has been parsed.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub tor: TorConfig,
    pub i2p: I2pConfig,
    pub database: DatabaseConfig,
    pub object_store: ObjectStoreConfig,
    pub media: MediaConfig,
    pub frontier: FrontierConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_research_frequency_hours")]
    pub research_frequency_hours: u64,
    #[serde(default = "default_parallel_sites")]
    pub parallel_sites: usize,
    #[serde(default = "default_max_site_retries")]
    pub max_site_retries: u32,
    pub site_list_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TorConfig {
    pub enabled: bool,
    pub socks_proxies: Vec<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct I2pConfig {
    pub enabled: bool,
    pub http_proxies: Vec<String>,
    pub router_console_url: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default)]
    pub router_restart_command: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub postgres_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ObjectStoreConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default = "default_region")]
    pub region: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MediaConfig {
    #[serde(default = "default_true")]
    pub download_all_media: bool,
    #[serde(default = "default_max_image_mb")]
    pub max_image_size_mb: u64,
    #[serde(default = "default_max_audio_mb")]
    pub max_audio_size_mb: u64,
    #[serde(default = "default_max_video_mb")]
    pub max_video_size_mb: u64,
    #[serde(default = "default_max_other_mb")]
    pub max_other_size_mb: u64,
    #[serde(default = "default_inline_threshold_kb")]
    pub inline_threshold_kb: u64,
}

impl MediaConfig {
    pub fn max_bytes_for_category(&self, category: crate::types::MediaCategory) -> u64 {
        use crate::types::MediaCategory::*;
        let mb = match category {
            Image => self.max_image_size_mb,
            Audio => self.max_audio_size_mb,
            Video => self.max_video_size_mb,
            Document | Other => self.max_other_size_mb,
        };
        mb * 1024 * 1024
    }

    pub fn inline_threshold_bytes(&self) -> u64 {
        self.inline_threshold_kb * 1024
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FrontierConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_max_pages_per_site")]
    pub max_pages_per_site: u32,
}

fn default_log_format() -> String {
    "pretty".to_string()
}
fn default_research_frequency_hours() -> u64 {
    24
}
fn default_parallel_sites() -> usize {
    3
}
fn default_max_site_retries() -> u32 {
    10
}
fn default_connect_timeout() -> u64 {
    30
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_connections() -> u32 {
    10
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_true() -> bool {
    true
}
fn default_max_image_mb() -> u64 {
    10
}
fn default_max_audio_mb() -> u64 {
    10
}
fn default_max_video_mb() -> u64 {
    50
}
fn default_max_other_mb() -> u64 {
    10
}
fn default_inline_threshold_kb() -> u64 {
    1024
}
fn default_max_depth() -> u32 {
    3
}
fn default_max_pages_per_site() -> u32 {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let toml_str = r#"
            [general]
            site_list_path = "sites.txt"

            [tor]
            enabled = true
            socks_proxies = ["socks5h://127.0.0.1:9050"]

            [i2p]
            enabled = true
            http_proxies = ["http://127.0.0.1:4444"]
            router_console_url = "http://127.0.0.1:7657"

            [database]
            postgres_url = "postgres://localhost/hiddencrawl"

            [object_store]
            endpoint = "http://127.0.0.1:9000"
            access_key = "minioadmin"
            secret_key = "minioadmin"

            [media]

            [frontier]
        "#;
        let cfg: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.general.parallel_sites, 3);
        assert_eq!(cfg.frontier.max_depth, 3);
        assert_eq!(cfg.frontier.max_pages_per_site, 500);
        assert_eq!(cfg.tor.request_timeout_seconds, 30);
        assert_eq!(cfg.media.max_bytes_for_category(crate::types::MediaCategory::Video), 50 * 1024 * 1024);
    }
}
