use redis::aio::ConnectionManager;
use tokio::time::{timeout, Duration};

/// `Ok(None)` when `REDIS_URL` is unset or blank: caching is off by choice.
pub async fn get_redis() -> anyhow::Result<Option<ConnectionManager>> {
    let redis_url = match std::env::var("REDIS_URL") {
        Ok(url) if !url.trim().is_empty() => url,
        _ => return Ok(None),
    };
    let client = redis::Client::open(redis_url)?;

    let manager = timeout(Duration::from_secs(5), ConnectionManager::new(client))
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 5 seconds"))??;

    Ok(Some(manager))
}
