use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::session::store::SessionStore;

/// Periodically evicts idle sessions from the store.
pub struct SessionSweeper {
    store: Arc<SessionStore>,
    max_idle: Duration,
    interval: Duration,
}

/// Running sweeper. Dropping it without `shutdown` leaves the task running.
pub struct SweeperHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweep loop and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

impl SessionSweeper {
    pub fn new(store: Arc<SessionStore>, config: &SessionConfig) -> Self {
        Self {
            store,
            max_idle: Duration::from_secs(config.max_idle_secs),
            interval: Duration::from_secs(config.sweep_interval_secs.max(1)),
        }
    }

    /// Run one sweep now. Returns the number of evicted sessions.
    pub fn sweep_once(&self) -> usize {
        self.store.sweep_expired(self.max_idle)
    }

    pub fn spawn(self) -> SweeperHandle {
        let (stop, mut stopped) = watch::channel(false);
        let task = tokio::spawn(async move {
            info!(
                "Session sweeper started (every {}s, idle limit {}s)",
                self.interval.as_secs(),
                self.max_idle.as_secs()
            );
            let mut ticker = tokio::time::interval(self.interval);
            // First tick fires immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.sweep_once();
                        debug!("Sweep removed {} sessions", removed);
                    }
                    _ = stopped.changed() => break,
                }
            }
            info!("Session sweeper stopped");
        });
        SweeperHandle { stop, task }
    }
}
