//! Keyed read cache with explicit invalidation.
//!
//! Nothing here expires on its own: a cached value is served until its key is
//! invalidated or refetched. A fetch that started before an invalidation of
//! the same key still returns its value to the caller but is not stored.

use std::{collections::HashMap, future::Future, hash::Hash};

use parking_lot::Mutex;
use tracing::debug;

struct CacheState<K, V> {
    entries: HashMap<K, V>,
    generations: HashMap<K, u64>,
}

pub struct QueryCache<K, V> {
    name: &'static str,
    state: Mutex<CacheState<K, V>>,
}

impl<K, V> QueryCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                generations: HashMap::new(),
            }),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.state.lock().entries.get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    /// Serves the cached value for `key`, fetching and storing it on a miss.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: &K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(hit) = self.get(key) {
            debug!(cache = self.name, ?key, "cache hit");
            return Ok(hit);
        }
        debug!(cache = self.name, ?key, "cache miss");
        self.fetch_and_store(key, fetch).await
    }

    /// Bypasses the cached value. On failure the previous entry is kept.
    pub async fn refetch<F, Fut, E>(&self, key: &K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        debug!(cache = self.name, ?key, "cache bypass");
        self.fetch_and_store(key, fetch).await
    }

    pub fn invalidate(&self, key: &K) {
        let mut state = self.state.lock();
        state.entries.remove(key);
        *state.generations.entry(key.clone()).or_default() += 1;
        debug!(cache = self.name, ?key, "cache entry invalidated");
    }

    async fn fetch_and_store<F, Fut, E>(&self, key: &K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let generation = self.generation(key);
        let value = fetch().await?;

        let mut state = self.state.lock();
        if state.generations.get(key).copied().unwrap_or_default() == generation {
            state.entries.insert(key.clone(), value.clone());
        } else {
            debug!(cache = self.name, ?key, "discarding fetch that raced an invalidation");
        }
        Ok(value)
    }

    fn generation(&self, key: &K) -> u64 {
        self.state
            .lock()
            .generations
            .get(key)
            .copied()
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "tests/cache_tests.rs"]
mod tests;
