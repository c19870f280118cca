//! The shared pause latch that gates every worker.

use std::time::Duration;

use tokio::sync::watch;
use tracing::warn;

/// How long a worker will wait on the latch before giving up and carrying
/// on. The timeout only logs; the coordinator owns the latch state.
pub const PAUSE_WAIT_TIMEOUT_SECS: u64 = 300;

/// Level-triggered binary latch with broadcast wake. Set means "run";
/// cleared means "hold at the next checkpoint". Workers never observe it
/// preemptively, only at declared wait points.
#[derive(Debug, Clone)]
pub struct PauseSignal {
    tx: watch::Sender<bool>,
}

impl PauseSignal {
    /// A new signal in the running (set) state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(true);
        Self { tx }
    }

    /// Release all waiters and let new arrivals pass.
    pub fn set(&self) {
        self.tx.send_replace(true);
    }

    /// Hold workers at their next wait point.
    pub fn clear(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the signal is set, bounded by the safety timeout. On
    /// timeout the caller proceeds; the signal itself is left untouched so
    /// this cannot race the coordinator's resume.
    pub async fn wait_ready(&self) {
        self.wait_ready_for(Duration::from_secs(PAUSE_WAIT_TIMEOUT_SECS))
            .await;
    }

    pub async fn wait_ready_for(&self, timeout: Duration) {
        let mut rx = self.tx.subscribe();
        let wait = rx.wait_for(|set| *set);
        if tokio::time::timeout(timeout, wait).await.is_err() {
            warn!("pause wait timed out after {}s; continuing without mutating the signal", timeout.as_secs());
        }
    }
}

impl Default for PauseSignal {
    fn default() -> Self {
        Self::new()
    }
}
