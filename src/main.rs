use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use laas_dispatch::config::Config;
use laas_dispatch::logistics_client::{build_http_client, LaasClient};
use laas_dispatch::pipeline::Pipeline;
use laas_dispatch::record_source::JsonFileSource;
use laas_dispatch::result_sink::JsonLinesSink;
use laas_dispatch::token_cache::{CredentialCache, FileTokenStore};

/// Runs one delivery pass.
///
/// Meant to be invoked by an external scheduler once per day. Exits non-zero
/// when the run was aborted before submission.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "laas_dispatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    let http = build_http_client(config.http_timeout)?;
    let credentials = CredentialCache::new(
        http.clone(),
        config.token_url.as_str(),
        config.api_key.clone(),
        config.api_secret.clone(),
        Arc::new(FileTokenStore::new(config.token_cache_file.clone())),
    );
    let client = LaasClient::new(http, config.base_url.clone());
    tracing::info!("✓ LaaS client initialized: {}", config.base_url);

    let pipeline = Pipeline::new(
        Arc::new(JsonFileSource::new(
            config.orders_file.clone(),
            config.orders_sheet.clone(),
        )),
        credentials,
        client,
        Arc::new(JsonLinesSink::new(config.results_file.clone())),
    )
    .with_rates(config.quote_rate_per_sec, config.order_rate_per_sec);

    let summary = pipeline.run_once(config.run_weekday, config.dry_run).await;

    if let Some(path) = &config.summary_file {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing run summary to {}", path.display()))?;
        tracing::info!("Run summary written to {}", path.display());
    }

    if let Some(reason) = summary.aborted {
        anyhow::bail!("run aborted: {}", reason);
    }
    Ok(())
}
