use tracing_subscriber::EnvFilter;

use starchart_lambda::config::AppConfig;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Structured JSON logging for CloudWatch
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(
        environment = %config.environment,
        bucket = %config.bucket,
        model_id = %config.model_id,
        worker = config.worker_url.is_some(),
        test_sessions = config.test_session_ids.len(),
        "starting report service"
    );

    let state = starchart_lambda::build_state(&config).await?;
    lambda_http::run(starchart_lambda::app(state))
        .await
        .map_err(|e| eyre::eyre!(e))
}
