use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Side effects that must not hold up a response: payment capture, worker
/// triggers, duplicate-payment release.
///
/// Every task runs under its own timeout and logs how it ended.
#[derive(Clone, Default)]
pub struct DetachedTasks {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl DetachedTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F, E>(&self, name: &'static str, timeout: Duration, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            match tokio::time::timeout(timeout, task).await {
                Ok(Ok(())) => info!(task = name, outcome = "completed", "detached task finished"),
                Ok(Err(e)) => warn!(
                    task = name,
                    outcome = "failed",
                    error = %e,
                    "detached task finished"
                ),
                Err(_) => warn!(
                    task = name,
                    outcome = "timed_out",
                    timeout_ms = timeout.as_millis() as u64,
                    "detached task finished"
                ),
            }
        });

        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Number of tasks that have not finished yet.
    pub fn pending(&self) -> usize {
        self.handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    /// Wait until every spawned task, including ones spawned while waiting,
    /// has finished.
    pub async fn wait_idle(&self) {
        loop {
            let drained: Vec<JoinHandle<()>> = {
                let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
                handles.drain(..).collect()
            };
            if drained.is_empty() {
                return;
            }
            for handle in drained {
                let _ = handle.await;
            }
        }
    }
}
