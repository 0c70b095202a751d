use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::metrics::EVICTED_TOTAL;
use crate::session::SessionStore;

// Eviction loop - every `period`, drop sessions idle for a whole period.
// Never returns; stop it by aborting the task.
pub async fn sweeper(store: Arc<SessionStore>, period: Duration) {
    let mut interval = interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(?period, "session sweeper started");

    // first tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;

        let evicted = store.sweep_expired(Instant::now(), period);
        if evicted > 0 {
            EVICTED_TOTAL.inc_by(evicted as f64);
            debug!(evicted, remaining = store.len(), "sweeper tick");
        }
    }
}

/// Owned handle to the background sweeper. Dropping it stops the task.
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn spawn(store: Arc<SessionStore>, period: Duration) -> Self {
        Self {
            task: tokio::spawn(sweeper(store, period)),
        }
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
