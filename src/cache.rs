use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::aggregate;
use crate::models::PostView;
use crate::repo::{Repo, RepoResult};

/// Fixed key of the "all posts" listing.
pub const FEED_KEY: &str = "posts:all";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend: {0}")]
    Backend(String),
}

/// Key/value storage holding serialized payloads. No TTLs.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: String) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

#[derive(Clone, Default)]
pub struct InMemCacheStore {
    entries: Arc<DashMap<String, String>>,
}

impl InMemCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for InMemCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }
    async fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(feature = "redis-cache")]
pub mod redis_store {
    use super::*;
    use anyhow::Context;
    use redis::aio::ConnectionManager;
    use redis::AsyncCommands;

    #[derive(Clone)]
    pub struct RedisCacheStore {
        manager: ConnectionManager,
    }

    impl RedisCacheStore {
        pub async fn connect(url: &str) -> anyhow::Result<Self> {
            let client = redis::Client::open(url).context("failed to parse REDIS_URL")?;
            let manager = ConnectionManager::new(client)
                .await
                .context("failed to initialize Redis connection manager")?;
            Ok(Self { manager })
        }
    }

    fn backend(e: redis::RedisError) -> CacheError {
        CacheError::Backend(e.to_string())
    }

    #[async_trait]
    impl CacheStore for RedisCacheStore {
        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            let mut conn = self.manager.clone();
            conn.get::<_, Option<String>>(key).await.map_err(backend)
        }
        async fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
            let mut conn = self.manager.clone();
            conn.set::<_, _, ()>(key, value).await.map_err(backend)
        }
        async fn delete(&self, key: &str) -> Result<(), CacheError> {
            let mut conn = self.manager.clone();
            conn.del::<_, ()>(key).await.map_err(backend)
        }
    }
}

/// Read-through cache over the post listing.
///
/// Population and invalidation are not coordinated: a listing computed just
/// before a concurrent invalidation can be written back afterwards, leaving
/// it stale until the next mutation.
#[derive(Clone)]
pub struct FeedCache {
    store: Arc<dyn CacheStore>,
}

impl FeedCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemCacheStore::new()))
    }

    /// `getAllPost`. Cache failures degrade to a repository read.
    pub async fn all_posts(&self, repo: &dyn Repo) -> RepoResult<Vec<PostView>> {
        match self.store.get(FEED_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<PostView>>(&raw) {
                Ok(views) => {
                    metrics::increment_counter!("feed_cache_hits_total");
                    debug!(posts = views.len(), "feed cache hit");
                    return Ok(views);
                }
                Err(e) => warn!(error = %e, "discarding undecodable feed cache entry"),
            },
            Ok(None) => {}
            Err(e) => warn!(error = %e, "feed cache read failed"),
        }

        metrics::increment_counter!("feed_cache_misses_total");
        let views = aggregate::all_posts(repo).await?;
        match serde_json::to_string(&views) {
            Ok(raw) => {
                if let Err(e) = self.store.set(FEED_KEY, raw).await {
                    warn!(error = %e, "feed cache write failed");
                }
            }
            Err(e) => warn!(error = %e, "feed listing not serializable"),
        }
        debug!(posts = views.len(), "feed cache miss");
        Ok(views)
    }

    /// Drop the cached listing. Failures are logged, never returned: the
    /// mutation that triggered the call has already been committed.
    pub async fn invalidate(&self, reason: &'static str) {
        metrics::increment_counter!("feed_cache_invalidations_total");
        match self.store.delete(FEED_KEY).await {
            Ok(()) => debug!(reason, "feed cache invalidated"),
            Err(e) => tracing::error!(error = %e, reason, "feed cache invalidation failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inmem_store_set_get_delete() {
        let store = InMemCacheStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", "v".into()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        // deleting a missing key is fine
        store.delete("k").await.unwrap();
    }
}
