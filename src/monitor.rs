use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::ConfigStore;
use crate::events::{EventBus, StatusEvent};
use crate::login::Login;
use crate::models::{LoginResult, MonitorState};
use crate::probe::Probe;
use crate::utils::unix_now;

/// Owns the background watchdog task. At most one loop runs at a time and
/// start/stop are idempotent.
pub struct PingMonitor {
    store: Arc<ConfigStore>,
    prober: Arc<dyn Probe>,
    login: Arc<dyn Login>,
    bus: EventBus,
    state: Arc<Mutex<MonitorState>>,
    task: Mutex<Option<MonitorTask>>,
}

struct MonitorTask {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl PingMonitor {
    pub fn new(
        store: Arc<ConfigStore>,
        prober: Arc<dyn Probe>,
        login: Arc<dyn Login>,
        bus: EventBus,
    ) -> Self {
        Self {
            store,
            prober,
            login,
            bus,
            state: Arc::new(Mutex::new(MonitorState::default())),
            task: Mutex::new(None),
        }
    }

    pub async fn start(&self) {
        let mut slot = self.task.lock().await;
        if let Some(task) = slot.as_ref() {
            if !task.handle.is_finished() {
                warn!("ping monitor already running");
                return;
            }
        }

        // each run starts counting failures from scratch
        *self.state.lock().await = MonitorState {
            running: true,
            ..MonitorState::default()
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.store),
            Arc::clone(&self.prober),
            Arc::clone(&self.login),
            self.bus.clone(),
            Arc::clone(&self.state),
            shutdown_rx,
        ));
        *slot = Some(MonitorTask {
            handle,
            shutdown: shutdown_tx,
        });
        info!("ping monitor started");
    }

    pub async fn stop(&self) {
        let mut slot = self.task.lock().await;
        let Some(task) = slot.take() else {
            return;
        };
        let _ = task.shutdown.send(true);
        if let Err(e) = task.handle.await {
            if !e.is_cancelled() {
                error!("monitor task join failed: {}", e);
            }
        }
        self.state.lock().await.running = false;
        info!("ping monitor stopped");
    }

    pub async fn is_running(&self) -> bool {
        let slot = self.task.lock().await;
        slot.as_ref().map_or(false, |t| !t.handle.is_finished())
    }

    pub async fn status(&self) -> MonitorState {
        self.state.lock().await.clone()
    }

    /// Records the outcome of a manual login so status reflects it too.
    pub async fn record_login(&self, result: LoginResult) {
        self.state.lock().await.last_login = Some(result);
    }
}

async fn run_loop(
    store: Arc<ConfigStore>,
    prober: Arc<dyn Probe>,
    login: Arc<dyn Login>,
    bus: EventBus,
    state: Arc<Mutex<MonitorState>>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("ping monitor loop running");
    // first probe fires immediately
    let mut delay = Duration::ZERO;
    let mut last_attempt: Option<Instant> = None;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        // settings edits apply from the next cycle on
        let cfg = store.snapshot();
        let result = prober
            .probe(&cfg.ping_target, Duration::from_secs(cfg.ping_timeout_sec))
            .await;
        if *shutdown.borrow() {
            break;
        }

        let failures = {
            let mut st = state.lock().await;
            if result.success {
                if st.consecutive_failures > 0 {
                    info!("network connectivity restored");
                }
                st.consecutive_failures = 0;
            } else {
                st.consecutive_failures += 1;
            }
            st.last_ping = Some(result.clone());
            st.consecutive_failures
        };

        bus.emit(StatusEvent::PingStatus {
            host: result.host.clone(),
            success: result.success,
            consecutive_failures: failures,
            timestamp: unix_now(),
        });

        delay = Duration::from_secs(cfg.ping_interval_sec);

        if !result.success {
            let threshold = cfg.consecutive_failures_threshold;
            warn!("ping failure {}/{}", failures, threshold);

            if failures >= threshold {
                let backoff = Duration::from_secs(cfg.backoff_attempt_sec);
                let due = last_attempt.map_or(true, |t| t.elapsed() >= backoff);
                if due {
                    warn!("failure threshold reached, attempting portal login");
                    // stop must not wait out a slow portal
                    let outcome = tokio::select! {
                        biased;
                        _ = shutdown.changed() => break,
                        outcome = login.login(&cfg) => outcome,
                    };
                    last_attempt = Some(Instant::now());
                    let failed = !outcome.success;
                    state.lock().await.last_login = Some(outcome);
                    // a failed attempt waits out the backoff instead of the
                    // normal interval; the counter only resets on a probe
                    // success
                    if failed {
                        delay = backoff;
                    }
                }
            }
        }
    }
    info!("ping monitor loop exited");
}
