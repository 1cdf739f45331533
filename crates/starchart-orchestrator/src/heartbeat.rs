use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use starchart_storage::{Lease, ReportStore};

/// Keeps a PROCESSING record fresh while its owner is working on it.
/// Dropping the guard stops the heartbeat.
pub struct Heartbeat {
    handle: JoinHandle<()>,
}

impl Heartbeat {
    pub fn start(
        store: Arc<dyn ReportStore>,
        key: String,
        lease: Lease,
        interval: Duration,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the record was just written.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match store.heartbeat(&key, &lease).await {
                    Ok(()) => debug!(report_id = %lease.report_id, attempt = lease.attempt, "heartbeat"),
                    Err(e) => warn!(report_id = %lease.report_id, error = %e, "heartbeat failed"),
                }
            }
        });
        Self { handle }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
