use std::sync::Arc;
use std::time::Duration;

use tracing::warn;
use url::Url;

use hiddencrawl_core::{config::AppConfig, is_i2p_host, is_onion_host, CrawlError, Transport, TransportKind};

use crate::direct::DirectTransport;
use crate::health::{HealthHandle, HealthManager};
use crate::i2p::I2pTransport;
use crate::tor::{probe_tor_reachable, TorTransport};

/// Selects which transport a URL should be fetched through, and owns every
/// transport's lifetime. Tor is mandatory: a clearnet or unclassified host
/// always routes through Tor when Tor is enabled, and construction refuses
/// to proceed at all when it is not.
pub struct TransportRegistry {
    #[allow(dead_code)]
    direct: Arc<DirectTransport>,
    tor: Option<Arc<TorTransport>>,
    i2p: Option<Arc<I2pTransport>>,
    i2p_health: Option<HealthHandle>,
}

impl TransportRegistry {
    /// Builds every configured transport and runs the one-shot Tor reachability
    /// probe. Returns an error if Tor is disabled — this crawler never falls
    /// back to direct fetches for anything but tests.
    pub async fn build(config: &AppConfig) -> Result<(Self, Option<HealthManager>), CrawlError> {
        if !config.tor.enabled {
            return Err(CrawlError::Config(
                "tor must be enabled: this crawler refuses to fetch clearnet or onion pages without it".into(),
            ));
        }

        let direct = Arc::new(DirectTransport::new(
            config.tor.connect_timeout_seconds,
            config.tor.request_timeout_seconds,
        )?);

        let tor = Arc::new(TorTransport::new(
            &config.tor.socks_proxies,
            config.tor.connect_timeout_seconds,
            config.tor.request_timeout_seconds,
        )?);

        let reachable = config
            .tor
            .socks_proxies
            .first()
            .map(|addr| addr.as_str())
            .unwrap_or("");
        if !probe_tor_reachable(reachable, Duration::from_secs(10)).await {
            warn!(addr = %reachable, "tor socks proxy did not respond to startup probe");
        }

        let (i2p, i2p_health, health_manager) = if config.i2p.enabled {
            let transport = Arc::new(I2pTransport::new(
                &config.i2p.http_proxies,
                config.i2p.connect_timeout_seconds,
                config.i2p.request_timeout_seconds,
            )?);
            let manager = HealthManager::new(
                config.i2p.router_console_url.clone(),
                config.i2p.router_restart_command.clone(),
            );
            let handle = manager.handle();
            (Some(transport), Some(handle), Some(manager))
        } else {
            (None, None, None)
        };

        Ok((
            Self {
                direct,
                tor: Some(tor),
                i2p,
                i2p_health,
            },
            health_manager,
        ))
    }

    /// Deterministic, total over every well-formed URL: every branch resolves
    /// to either a transport or `NoTransport`, never panics.
    pub fn select(&self, url: &Url) -> Result<Arc<dyn Transport>, CrawlError> {
        let host = url.host_str().unwrap_or("");

        if is_onion_host(host) {
            return self
                .tor
                .clone()
                .map(|t| t as Arc<dyn Transport>)
                .ok_or(CrawlError::NoTransport);
        }

        if is_i2p_host(host) {
            let i2p_healthy = self
                .i2p_health
                .as_ref()
                .map(|h| h.is_usable())
                .unwrap_or(false);
            if i2p_healthy {
                if let Some(i2p) = &self.i2p {
                    return Ok(i2p.clone() as Arc<dyn Transport>);
                }
            }
            // I2P unhealthy or disabled: fall back to Tor rather than give up.
            return self
                .tor
                .clone()
                .map(|t| t as Arc<dyn Transport>)
                .ok_or(CrawlError::NoTransport);
        }

        // Clearnet, or anything else: always Tor, never direct.
        self.tor
            .clone()
            .map(|t| t as Arc<dyn Transport>)
            .ok_or(CrawlError::NoTransport)
    }

    pub fn kind_for(&self, url: &Url) -> Option<TransportKind> {
        self.select(url).ok().map(|t| t.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(tor: bool, i2p: bool, i2p_healthy: bool) -> TransportRegistry {
        let direct = Arc::new(DirectTransport::new(5, 5).unwrap());
        let tor_t = if tor {
            Some(Arc::new(TorTransport::new(&["socks5h://127.0.0.1:9050".into()], 5, 5).unwrap()))
        } else {
            None
        };
        let (i2p_t, i2p_health) = if i2p {
            let transport = Arc::new(I2pTransport::new(&["http://127.0.0.1:4444".into()], 5, 5).unwrap());
            let handle = HealthHandle::new();
            if i2p_healthy {
                handle.set(crate::health::HealthState::Ready);
            }
            (Some(transport), Some(handle))
        } else {
            (None, None)
        };
        TransportRegistry {
            direct,
            tor: tor_t,
            i2p: i2p_t,
            i2p_health,
        }
    }

    #[test]
    fn onion_routes_to_tor() {
        let registry = registry_with(true, false, false);
        let url = Url::parse("http://abc123.onion/").unwrap();
        assert_eq!(registry.kind_for(&url), Some(TransportKind::Tor));
    }

    #[test]
    fn clearnet_routes_to_tor_never_direct() {
        let registry = registry_with(true, false, false);
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(registry.kind_for(&url), Some(TransportKind::Tor));
    }

    #[test]
    fn i2p_falls_back_to_tor_when_unhealthy() {
        let registry = registry_with(true, true, false);
        let url = Url::parse("http://example.i2p/").unwrap();
        assert_eq!(registry.kind_for(&url), Some(TransportKind::Tor));
    }

    #[test]
    fn i2p_routes_to_i2p_when_healthy() {
        let registry = registry_with(true, true, true);
        let url = Url::parse("http://example.i2p/").unwrap();
        assert_eq!(registry.kind_for(&url), Some(TransportKind::I2p));
    }

    #[test]
    fn i2p_falls_back_to_tor_when_degraded() {
        let registry = registry_with(true, true, false);
        if let Some(handle) = &registry.i2p_health {
            handle.set(crate::health::HealthState::Degraded);
        }
        let url = Url::parse("http://example.i2p/").unwrap();
        assert_eq!(registry.kind_for(&url), Some(TransportKind::Tor));
    }

    #[test]
    fn onion_has_no_transport_when_tor_disabled() {
        let registry = registry_with(false, false, false);
        let url = Url::parse("http://abc123.onion/").unwrap();
        assert!(registry.select(&url).is_err());
    }
}
