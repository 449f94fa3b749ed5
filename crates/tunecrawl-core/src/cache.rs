//! In-process TTL cache with least-recently-accessed eviction.
//!
//! Entries expire lazily on read and eagerly through a periodic sweep.
//! When a `set` pushes the cache past `max_items`, the entry with the
//! oldest access time is evicted.
//!
//! ```text
//! set ──► insert ──► size > max_items? ──► evict min(last_accessed)
//! get ──► expired? ──► delete, None
//!            └──────► touch last_accessed, Some(value)
//! sweep (every check_period) ──► drop every expired entry
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Sizing and expiry policy for a [`TtlCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL applied when `set` is called without one.
    pub default_ttl: Duration,
    pub max_items: usize,
    /// Interval between eager expiry sweeps.
    pub check_period: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(600),
            max_items: 1_000,
            check_period: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub max_items: usize,
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    last_accessed: Instant,
    /// Monotonic access order, breaks ties between equal timestamps.
    access_seq: u64,
}

#[derive(Debug)]
struct CacheState<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    next_seq: u64,
}

impl<K, V> CacheState<K, V> {
    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

struct CacheInner<K, V> {
    config: CacheConfig,
    state: Mutex<CacheState<K, V>>,
    sweeper: Mutex<Option<CancellationToken>>,
}

/// Thread-safe TTL cache. Cloning yields another handle to the same store.
pub struct TtlCache<K, V> {
    inner: Arc<CacheInner<K, V>>,
}

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                config,
                state: Mutex::new(CacheState {
                    entries: HashMap::new(),
                    next_seq: 0,
                }),
                sweeper: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Acquires the state lock, recovering from poison if necessary.
    fn lock_state(&self) -> MutexGuard<'_, CacheState<K, V>> {
        self.inner.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned cache mutex");
            poisoned.into_inner()
        })
    }

    /// Returns the live value for `key`, deleting it if it has expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut state = self.lock_state();
        let now = Instant::now();

        let expired = match state.entries.get(key) {
            None => return None,
            Some(entry) => now > entry.expires_at,
        };
        if expired {
            state.entries.remove(key);
            return None;
        }

        let seq = state.bump_seq();
        let entry = state.entries.get_mut(key)?;
        entry.last_accessed = now;
        entry.access_seq = seq;
        Some(entry.value.clone())
    }

    /// Stores `value` under `key` with `ttl` (or the default TTL).
    pub fn set(&self, key: K, value: V, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.inner.config.default_ttl);
        let mut state = self.lock_state();
        let now = Instant::now();

        // Overwrites keep their access history: only `get` counts as access.
        let existing = state
            .entries
            .get(&key)
            .map(|entry| (entry.last_accessed, entry.access_seq));
        let (last_accessed, access_seq) = match existing {
            Some(history) => history,
            None => (now, state.bump_seq()),
        };
        state.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: now + ttl,
                last_accessed,
                access_seq,
            },
        );

        if state.entries.len() > self.inner.config.max_items {
            Self::evict_least_recent(&mut state);
        }
    }

    pub fn delete(&self, key: &K) -> bool {
        self.lock_state().entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.lock_state().entries.clear();
    }

    /// Returns the cached value or computes, stores and returns a new one.
    pub fn get_or_set<F>(&self, key: K, ttl: Option<Duration>, producer: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = producer();
        self.set(key, value.clone(), ttl);
        value
    }

    /// Async, fallible variant of [`get_or_set`](Self::get_or_set).
    ///
    /// The lock is not held while `producer` runs; errors are not cached.
    pub async fn get_or_try_set<F, Fut, E>(
        &self,
        key: K,
        ttl: Option<Duration>,
        producer: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = producer().await?;
        self.set(key, value.clone(), ttl);
        Ok(value)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.lock_state().entries.len(),
            max_items: self.inner.config.max_items,
        }
    }

    /// Removes every expired entry. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let mut state = self.lock_state();
        let now = Instant::now();
        let before = state.entries.len();
        state.entries.retain(|_, entry| now <= entry.expires_at);
        before - state.entries.len()
    }

    fn evict_least_recent(state: &mut CacheState<K, V>) {
        let oldest = state
            .entries
            .iter()
            .min_by_key(|(_, entry)| (entry.last_accessed, entry.access_seq))
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            state.entries.remove(&key);
        }
    }

    /// Spawns the periodic sweeper. Calling `start` twice is a no-op.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut sweeper = self.inner.sweeper.lock().unwrap_or_else(|p| p.into_inner());
        if sweeper.is_some() {
            return;
        }
        let token = CancellationToken::new();
        *sweeper = Some(token.clone());

        let weak: Weak<CacheInner<K, V>> = Arc::downgrade(&self.inner);
        let period = self.inner.config.check_period;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    () = token.cancelled() => break,
                }
                let Some(inner) = weak.upgrade() else { break };
                let removed = TtlCache { inner }.sweep();
                if removed > 0 {
                    tracing::debug!(removed, "Cache sweep removed expired entries");
                }
            }
            tracing::debug!("Cache sweeper stopped");
        });
    }

    /// Stops the periodic sweeper if it is running.
    pub fn stop(&self) {
        let mut sweeper = self.inner.sweeper.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(token) = sweeper.take() {
            token.cancel();
        }
    }

    pub fn is_sweeping(&self) -> bool {
        self.inner
            .sweeper
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }
}
