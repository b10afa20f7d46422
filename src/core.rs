use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::info;

use crate::config::{Config, ConfigError, ConfigPatch, ConfigStore};
use crate::events::{EventBus, StatusEvent};
use crate::login::{Login, LoginClient};
use crate::models::{LoginResult, MonitorState, PingResult};
use crate::monitor::PingMonitor;
use crate::probe::{IcmpProber, Probe};
use crate::utils::unix_now;

/// The command surface the API exposes. Owns the config store, the event
/// bus, and the watchdog.
pub struct Core {
    store: Arc<ConfigStore>,
    bus: EventBus,
    login: Arc<dyn Login>,
    prober: Arc<dyn Probe>,
    monitor: PingMonitor,
}

impl Core {
    pub fn new(store: ConfigStore) -> Result<Self> {
        let store = Arc::new(store);
        let bus = EventBus::new();
        let login: Arc<dyn Login> =
            Arc::new(LoginClient::new(bus.clone()).context("failed to build http client")?);
        let prober: Arc<dyn Probe> = Arc::new(IcmpProber::new());
        let monitor = PingMonitor::new(
            Arc::clone(&store),
            Arc::clone(&prober),
            Arc::clone(&login),
            bus.clone(),
        );
        Ok(Self {
            store,
            bus,
            login,
            prober,
            monitor,
        })
    }

    pub fn get_config(&self) -> Config {
        self.store.snapshot()
    }

    pub fn save_config(&self, patch: ConfigPatch) -> Result<Config, ConfigError> {
        self.store.save(patch)
    }

    pub fn reset_config(&self) -> Result<Config, ConfigError> {
        self.store.reset()
    }

    /// Fires a login right now with the current settings, regardless of
    /// monitor state, threshold, or backoff.
    pub async fn do_login(&self) -> LoginResult {
        let cfg = self.store.snapshot();
        let result = self.login.login(&cfg).await;
        self.monitor.record_login(result.clone()).await;
        result
    }

    /// One on-demand probe of the configured target. Does not touch the
    /// watchdog's failure count; the emitted event carries a count of 0.
    pub async fn test_ping(&self) -> PingResult {
        let cfg = self.store.snapshot();
        info!("manual ping test of {}", cfg.ping_target);
        let result = self
            .prober
            .probe(&cfg.ping_target, Duration::from_secs(cfg.ping_timeout_sec))
            .await;
        self.bus.emit(StatusEvent::PingStatus {
            host: result.host.clone(),
            success: result.success,
            consecutive_failures: 0,
            timestamp: unix_now(),
        });
        result
    }

    pub async fn start_ping_monitor(&self) {
        self.monitor.start().await;
    }

    pub async fn stop_ping_monitor(&self) {
        self.monitor.stop().await;
    }

    pub async fn is_monitor_running(&self) -> bool {
        self.monitor.is_running().await
    }

    pub async fn monitor_status(&self) -> MonitorState {
        self.monitor.status().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.bus.subscribe()
    }
}
