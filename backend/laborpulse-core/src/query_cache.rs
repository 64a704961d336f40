// src/query_cache.rs
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const MAX_KEY_LEN: usize = 100;

#[derive(Debug, Clone)]
struct CacheMetadata {
    cached_at: Instant,
    query: String,
}

impl CacheMetadata {
    fn new(query: &str) -> Self {
        Self {
            cached_at: Instant::now(),
            query: query.to_string(),
        }
    }

    fn is_stale(&self, max_age: Duration) -> bool {
        self.cached_at.elapsed() > max_age
    }
}

#[derive(Debug, Clone)]
struct CachedData {
    metadata: CacheMetadata,
    data: serde_json::Value,
}

/// In-memory TTL cache for ERP query results. Failed fetches are never stored.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: Mutex<HashMap<String, CachedData>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a cache key from a query name and its parameters. Keys are
    /// sanitized to `[A-Za-z0-9_;]` and long keys are shortened with a SHA-256 suffix.
    pub fn generate_cache_key(query: &str, params: &[(&str, String)]) -> String {
        let mut key = query.replace(|c: char| !c.is_ascii_alphanumeric(), "_");

        if !params.is_empty() {
            key.push_str("__PARAMS_");
            let mut sorted: Vec<&(&str, String)> = params.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            for (k, v) in sorted {
                key.push_str(&k.replace(|c: char| !c.is_ascii_alphanumeric(), "_"));
                key.push('_');
                key.push_str(&v.replace(|c: char| !c.is_ascii_alphanumeric(), "_"));
                key.push(';');
            }
        }

        if key.len() > MAX_KEY_LEN {
            use sha2::{Digest, Sha256};
            let mut hasher = Sha256::new();
            hasher.update(key.as_bytes());
            let hash = hasher.finalize();
            key = format!("{}_{}", &key[..MAX_KEY_LEN / 2], hex::encode(&hash[..8]));
        }

        key
    }

    /// Returns the cached value for `key` if younger than `ttl`, otherwise runs
    /// `fetch` and stores its result. A zero `ttl` bypasses the cache.
    pub async fn get_or_fetch<T, E, F, Fut>(&self, key: &str, ttl: Duration, fetch: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if ttl.is_zero() {
            return fetch().await;
        }

        if let Some(cached) = self.load(key, ttl).await {
            return Ok(cached);
        }

        let fresh = fetch().await?;
        match serde_json::to_value(&fresh) {
            Ok(data) => {
                let mut entries = self.entries.lock().await;
                entries.insert(
                    key.to_string(),
                    CachedData {
                        metadata: CacheMetadata::new(key),
                        data,
                    },
                );
                debug!("Cached query result for key: {}", key);
            }
            Err(e) => warn!("Query result for {} could not be cached: {}", key, e),
        }
        Ok(fresh)
    }

    async fn load<T: DeserializeOwned>(&self, key: &str, ttl: Duration) -> Option<T> {
        let mut entries = self.entries.lock().await;
        let entry = match entries.get(key) {
            Some(entry) => entry,
            None => {
                debug!("Cache miss for key: {}", key);
                return None;
            }
        };

        if entry.metadata.is_stale(ttl) {
            debug!("Cache entry for {} is stale", entry.metadata.query);
            entries.remove(key);
            return None;
        }

        match serde_json::from_value(entry.data.clone()) {
            Ok(data) => {
                debug!("Cache hit for key: {}", key);
                Some(data)
            }
            Err(e) => {
                warn!("Cached data for {} is unreadable: {}. Dropping entry.", key, e);
                entries.remove(key);
                None
            }
        }
    }

    #[cfg(test)]
    pub async fn invalidate(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}
