//! Forces a new bearer token and stores it in the credential cache.

use std::sync::Arc;

use laas_dispatch::config::Config;
use laas_dispatch::logistics_client::build_http_client;
use laas_dispatch::token_cache::{CredentialCache, FileTokenStore};

/// Main entry point for the token refresh utility.
///
/// Prints only a masked prefix of the token, never the token itself.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let http = build_http_client(config.http_timeout)?;
    let cache = CredentialCache::new(
        http,
        config.token_url.as_str(),
        config.api_key.clone(),
        config.api_secret.clone(),
        Arc::new(FileTokenStore::new(config.token_cache_file.clone())),
    );

    let credential = cache.get_token(true).await?;

    println!("✓ Token refreshed: {}", credential.masked());
    println!("  Expires at: {}", credential.expires_at());
    println!("  Cached in:  {}", config.token_cache_file.display());
    Ok(())
}
