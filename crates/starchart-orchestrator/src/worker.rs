use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::TriggerError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub const WORKER_SECRET_HEADER: &str = "x-worker-secret";
pub const WORKER_PATH: &str = "/generate-report/worker";

/// Hands a heavy report to the asynchronous worker.
pub trait WorkerTrigger: Send + Sync {
    fn trigger<'a>(&'a self, report_id: &'a str) -> BoxFuture<'a, Result<(), TriggerError>>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TriggerBody<'a> {
    report_id: &'a str,
}

/// Fires the worker endpoint over HTTP.
#[derive(Clone)]
pub struct HttpWorkerTrigger {
    client: reqwest::Client,
    base_url: Option<String>,
    secret: String,
}

impl HttpWorkerTrigger {
    pub fn new(base_url: Option<String>, secret: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
            secret: secret.into(),
        }
    }

    async fn send(&self, report_id: &str) -> Result<(), TriggerError> {
        let Some(base_url) = &self.base_url else {
            warn!(report_id, "no worker URL configured, report left for poll-driven recovery");
            return Err(TriggerError::NotConfigured);
        };

        let response = match self
            .client
            .post(format!("{base_url}{WORKER_PATH}"))
            .header(WORKER_SECRET_HEADER, &self.secret)
            .json(&TriggerBody { report_id })
            .send()
            .await
        {
            Ok(response) => response,
            // The worker runs the whole generation before answering; the
            // request having been delivered is all the trigger needs.
            Err(e) if e.is_timeout() => {
                info!(report_id, "worker triggered, not waiting for it to finish");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if !response.status().is_success() {
            return Err(TriggerError::Rejected(response.status().as_u16()));
        }
        info!(report_id, "worker triggered");
        Ok(())
    }
}

impl WorkerTrigger for HttpWorkerTrigger {
    fn trigger<'a>(&'a self, report_id: &'a str) -> BoxFuture<'a, Result<(), TriggerError>> {
        Box::pin(self.send(report_id))
    }
}
