use anyhow::{Context, Result};
use std::time::Duration;
use url::Url;

/// Checks that the ingest service answers its health endpoint with a 2xx.
pub async fn check_ingest_health(client: &reqwest::Client, health_url: &Url, timeout: Duration) -> Result<()> {
    let response = client
        .get(health_url.clone())
        .timeout(timeout)
        .send()
        .await
        .with_context(|| format!("health check request to {health_url} failed"))?;
    response
        .error_for_status()
        .with_context(|| format!("health check at {health_url} returned an error status"))?;
    Ok(())
}
