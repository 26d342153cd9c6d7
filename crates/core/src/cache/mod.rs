pub mod memory;
pub mod redis_cache;

pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

use crate::models::{QueryDescriptor, ResultPage};
use crate::query::cache_key;
use crate::traits::CacheBackend;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_TTL: Duration = Duration::from_secs(3_600);

/// Memoizes gateway responses and other collaborator reads.
///
/// Reads and writes go to the primary backend when one is configured. Any
/// backend fault is logged and the in-process map takes over for that call;
/// callers only ever observe a miss.
pub struct ResultCache {
    primary: Option<Arc<dyn CacheBackend>>,
    fallback: MemoryCache,
    default_ttl: Duration,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl ResultCache {
    pub fn in_memory() -> Self {
        Self {
            primary: None,
            fallback: MemoryCache::default(),
            default_ttl: DEFAULT_TTL,
        }
    }

    pub fn with_primary(primary: Arc<dyn CacheBackend>) -> Self {
        Self {
            primary: Some(primary),
            ..Self::in_memory()
        }
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_fallback(mut self, fallback: MemoryCache) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn backend_name(&self) -> &'static str {
        self.primary
            .as_ref()
            .map_or(self.fallback.name(), |primary| primary.name())
    }

    pub async fn get(&self, scope: &str, descriptor: &QueryDescriptor) -> Option<ResultPage> {
        self.get_json(&cache_key(scope, descriptor)).await
    }

    pub async fn put(&self, scope: &str, page: &ResultPage, ttl: Option<Duration>) {
        self.put_json(&cache_key(scope, &page.descriptor), page, ttl)
            .await;
    }

    pub async fn get_json<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let raw = self.read(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(key, "cache hit");
                Some(value)
            }
            Err(error) => {
                warn!(key, %error, "discarding undecodable cache entry");
                None
            }
        }
    }

    pub async fn put_json<T>(&self, key: &str, value: &T, ttl: Option<Duration>)
    where
        T: Serialize + ?Sized,
    {
        match serde_json::to_string(value) {
            Ok(payload) => self.write(key, &payload, ttl.unwrap_or(self.default_ttl)).await,
            Err(error) => warn!(key, %error, "skipping cache write for unencodable value"),
        }
    }

    /// Read-through memoization: returns the cached value for `key`, or runs
    /// `fetch` and caches its output. Errors from `fetch` are returned as-is
    /// and never cached.
    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        fetch: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get_json(key).await {
            return Ok(cached);
        }

        debug!(key, "cache miss");
        let value = fetch().await?;
        self.put_json(key, &value, ttl).await;
        Ok(value)
    }

    async fn read(&self, key: &str) -> Option<String> {
        if let Some(primary) = &self.primary {
            match primary.get(key).await {
                Ok(Some(value)) => return Some(value),
                Ok(None) => {}
                Err(error) => {
                    warn!(backend = primary.name(), key, %error, "cache read failed, using in-process cache");
                }
            }
        }
        self.fallback.read(key)
    }

    async fn write(&self, key: &str, value: &str, ttl: Duration) {
        if let Some(primary) = &self.primary {
            match primary.set(key, value, ttl).await {
                Ok(()) => return,
                Err(error) => {
                    warn!(backend = primary.name(), key, %error, "cache write failed, using in-process cache");
                }
            }
        }
        self.fallback.write(key, value, ttl);
    }
}
