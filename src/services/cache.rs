use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};

pub const KEY_VISIBLE_BOARDS: &str = "boards:visible";
pub const KEY_NAVIGATION: &str = "menus:navigation";
pub const DEFAULT_TTL_SECS: u64 = 300;

/// JSON values in redis. Every failure is a miss; callers fall back to the database.
#[derive(Clone)]
pub struct CacheService {
    redis: ConnectionManager,
}

impl CacheService {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn.get(key).await.ok()?;
        let value = raw.and_then(|s| serde_json::from_str(&s).ok());
        if value.is_some() {
            tracing::debug!("cache hit: {}", key);
        }
        value
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) {
        let mut conn = self.redis.clone();
        match serde_json::to_string(value) {
            Ok(json) => {
                if let Err(e) = conn.set_ex::<_, _, ()>(key, json, ttl_secs).await {
                    tracing::warn!("cache write for {} failed: {}", key, e);
                }
            }
            Err(e) => tracing::warn!("cache value for {} not serializable: {}", key, e),
        }
    }

    pub async fn invalidate(&self, key: &str) {
        let mut conn = self.redis.clone();
        let _: Result<(), _> = conn.del(key).await;
    }
}
