use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

/// State machine for the I2P overlay. Tor gets only a one-shot startup probe
/// (see `tor::probe_tor_reachable`) and never enters this machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Initializing,
    Ready,
    Degraded,
    Restarting,
    Unavailable,
}

impl HealthState {
    fn to_u8(self) -> u8 {
        match self {
            HealthState::Initializing => 0,
            HealthState::Ready => 1,
            HealthState::Degraded => 2,
            HealthState::Restarting => 3,
            HealthState::Unavailable => 4,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => HealthState::Ready,
            2 => HealthState::Degraded,
            3 => HealthState::Restarting,
            4 => HealthState::Unavailable,
            _ => HealthState::Initializing,
        }
    }
}

const PATIENT_WAIT_INTERVAL: Duration = Duration::from_secs(30);
const PATIENT_WAIT_ATTEMPTS: u32 = 16; // 16 * 30s = 8 minutes
const MIN_UPTIME_FOR_RESTART: Duration = Duration::from_secs(20 * 60);

/// Pure transition function, exercised directly in tests without any network I/O.
///
/// `consecutive_failures` counts failed probes since the machine last left `Ready`.
/// `process_uptime` is how long the current I2P router process has been running.
pub fn decide_transition(
    current: HealthState,
    probe_ok: bool,
    consecutive_failures: u32,
    process_uptime: Duration,
) -> HealthState {
    if probe_ok {
        return HealthState::Ready;
    }

    match current {
        HealthState::Unavailable => HealthState::Unavailable,
        HealthState::Ready | HealthState::Initializing | HealthState::Restarting => {
            HealthState::Degraded
        }
        HealthState::Degraded => {
            if consecutive_failures < PATIENT_WAIT_ATTEMPTS {
                HealthState::Degraded
            } else if process_uptime >= MIN_UPTIME_FOR_RESTART {
                HealthState::Restarting
            } else {
                HealthState::Unavailable
            }
        }
    }
}

/// Shared, lock-free health flag the I2P transport can be gated on without
/// touching the health manager's background task.
#[derive(Clone)]
pub struct HealthHandle {
    state: Arc<AtomicU8>,
}

impl HealthHandle {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(HealthState::Initializing.to_u8())),
        }
    }

    pub fn get(&self) -> HealthState {
        HealthState::from_u8(self.state.load(Ordering::Relaxed))
    }

    /// Only `Ready` counts as usable — anything short of a healthy probe,
    /// including `Degraded`, routes callers to Tor instead.
    pub fn is_usable(&self) -> bool {
        matches!(self.get(), HealthState::Ready)
    }

    pub(crate) fn set(&self, state: HealthState) {
        self.state.store(state.to_u8(), Ordering::Relaxed);
    }
}

impl Default for HealthHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives the I2P health state machine against the router console.
pub struct HealthManager {
    handle: HealthHandle,
    router_console_url: String,
    client: reqwest::Client,
    restart_command: Option<String>,
    started_at: Instant,
}

impl HealthManager {
    pub fn new(router_console_url: String, restart_command: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("router console client");
        Self {
            handle: HealthHandle::new(),
            router_console_url,
            client,
            restart_command,
            started_at: Instant::now(),
        }
    }

    pub fn handle(&self) -> HealthHandle {
        self.handle.clone()
    }

    async fn probe(&self) -> bool {
        self.client
            .get(&self.router_console_url)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn gentle_restart(&self) {
        let Some(cmd) = &self.restart_command else {
            warn!("i2p router unhealthy and no restart command configured, marking unavailable");
            return;
        };
        info!(command = %cmd, "attempting gentle i2p router restart");
        // Graceful signal, patient wait, then force kill if it lingers, then respawn.
        let _ = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(format!("pkill -TERM -f '{cmd}' || true"))
            .status()
            .await;
        tokio::time::sleep(Duration::from_secs(15)).await;
        let _ = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(format!("pkill -KILL -f '{cmd}' || true"))
            .status()
            .await;
        let spawned = tokio::process::Command::new("sh").arg("-c").arg(cmd).spawn();
        if let Err(e) = spawned {
            warn!(error = %e, "failed to respawn i2p router");
        }
    }

    /// Runs forever. Spawned once as a background task alongside the crawl loop.
    pub async fn run(self) {
        let mut consecutive_failures: u32 = 0;
        loop {
            let probe_ok = self.probe().await;
            let current = self.handle.get();
            let next = decide_transition(current, probe_ok, consecutive_failures, self.started_at.elapsed());

            if probe_ok {
                consecutive_failures = 0;
            } else {
                consecutive_failures += 1;
            }

            if next != current {
                info!(from = ?current, to = ?next, "i2p health transition");
            }
            self.handle.set(next);

            if next == HealthState::Restarting {
                self.gentle_restart().await;
                consecutive_failures = 0;
                self.handle.set(HealthState::Degraded);
            }

            if next == HealthState::Unavailable {
                // Terminal: stop spending probes on a router that has been
                // unreachable for the full patient-wait window with no restart path.
                return;
            }

            tokio::time::sleep(PATIENT_WAIT_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_ready_on_success() {
        assert_eq!(
            decide_transition(HealthState::Ready, true, 0, Duration::from_secs(0)),
            HealthState::Ready
        );
    }

    #[test]
    fn first_failure_degrades() {
        assert_eq!(
            decide_transition(HealthState::Ready, false, 0, Duration::from_secs(0)),
            HealthState::Degraded
        );
    }

    #[test]
    fn keeps_waiting_within_patience_window() {
        assert_eq!(
            decide_transition(HealthState::Degraded, false, 5, Duration::from_secs(0)),
            HealthState::Degraded
        );
    }

    #[test]
    fn restarts_after_patience_exhausted_if_old_enough() {
        assert_eq!(
            decide_transition(
                HealthState::Degraded,
                false,
                PATIENT_WAIT_ATTEMPTS,
                MIN_UPTIME_FOR_RESTART
            ),
            HealthState::Restarting
        );
    }

    #[test]
    fn goes_unavailable_after_patience_exhausted_if_too_young_to_restart() {
        assert_eq!(
            decide_transition(
                HealthState::Degraded,
                false,
                PATIENT_WAIT_ATTEMPTS,
                Duration::from_secs(60)
            ),
            HealthState::Unavailable
        );
    }

    #[test]
    fn unavailable_is_terminal() {
        assert_eq!(
            decide_transition(HealthState::Unavailable, false, 999, Duration::from_secs(99999)),
            HealthState::Unavailable
        );
    }

    #[test]
    fn handle_reports_usable_only_when_ready() {
        let handle = HealthHandle::new();
        assert!(!handle.is_usable());
        handle.set(HealthState::Ready);
        assert!(handle.is_usable());
        handle.set(HealthState::Degraded);
        assert!(!handle.is_usable());
        handle.set(HealthState::Unavailable);
        assert!(!handle.is_usable());
    }
}
