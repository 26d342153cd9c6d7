use crate::traits::CacheBackend;
use crate::CacheError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_MEMORY_CAPACITY: usize = 1_024;

#[derive(Debug)]
struct Entry {
    data: String,
    expires_at: Instant,
}

/// In-process bounded map with per-entry expiry.
///
/// Expired entries are dropped lazily: reads ignore them and every write
/// sweeps them out. When the map is still full after the sweep, the entry
/// closest to expiry is evicted.
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    capacity: usize,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }
}

impl MemoryCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn read(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.lock()
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.data.clone())
    }

    pub fn write(&self, key: &str, value: &str, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.lock();

        entries.insert(
            key.to_string(),
            Entry {
                data: value.to_string(),
                expires_at: now + ttl,
            },
        );
        entries.retain(|_, entry| entry.expires_at > now);

        while entries.len() > self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(oldest) => {
                    entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // Entries are plain data; a panic mid-write cannot leave one half-built.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.read(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.write(key, value, ttl);
        Ok(())
    }
}
