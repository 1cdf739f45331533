use std::collections::HashSet;
use std::env;
use std::time::Duration;

use eyre::{WrapErr, bail};

use starchart_orchestrator::{Environment, OrchestratorConfig};

pub const DEFAULT_BUCKET: &str = "starchart-reports";
pub const DEFAULT_MODEL_ID: &str = "us.anthropic.claude-sonnet-4-20250514-v1:0";

/// Process configuration, read once at cold start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub bucket: String,
    pub model_id: String,
    pub stripe_secret_key: Option<String>,
    pub payment_token_secret: Option<String>,
    pub test_session_ids: HashSet<String>,
    pub worker_url: Option<String>,
    pub worker_secret: Option<String>,
    pub heartbeat_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> eyre::Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> eyre::Result<Self> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let environment = match get("APP_ENV") {
            Some(raw) => raw
                .parse::<Environment>()
                .map_err(|e| eyre::eyre!(e))
                .wrap_err("invalid APP_ENV")?,
            None => Environment::Production,
        };

        let heartbeat_interval = match get("HEARTBEAT_INTERVAL_SECS") {
            Some(raw) => Duration::from_secs(
                raw.parse::<u64>()
                    .wrap_err_with(|| format!("invalid HEARTBEAT_INTERVAL_SECS {raw:?}"))?,
            ),
            None => Duration::from_secs(18),
        };

        let config = Self {
            environment,
            bucket: get("STARCHART_BUCKET").unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            model_id: get("BEDROCK_MODEL_ID").unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
            stripe_secret_key: get("STRIPE_SECRET_KEY"),
            payment_token_secret: get("PAYMENT_TOKEN_SECRET"),
            test_session_ids: get("TEST_SESSION_IDS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            worker_url: get("WORKER_URL"),
            worker_secret: get("WORKER_SECRET"),
            heartbeat_interval,
        };
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> eyre::Result<()> {
        if !self.environment.is_production() {
            return Ok(());
        }
        if self.stripe_secret_key.is_none() {
            bail!("STRIPE_SECRET_KEY is required in production");
        }
        if self.payment_token_secret.is_none() {
            bail!("PAYMENT_TOKEN_SECRET is required in production");
        }
        if self.worker_url.is_some() && self.worker_secret.is_none() {
            bail!("WORKER_SECRET is required when WORKER_URL is set");
        }
        Ok(())
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            environment: self.environment,
            test_session_ids: self.test_session_ids.clone(),
            heartbeat_interval: self.heartbeat_interval,
            ..Default::default()
        }
    }
}
