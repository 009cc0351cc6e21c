//! Process-wide object cache shared by every mounted tree.
//!
//! Entries are byte-accounted and evicted least-recently-used first once the
//! configured budget is exceeded. Concurrent requests for the same uncached
//! key share a single computation.

mod lru;
mod memory;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use lru::{Admission, LruIndex};
pub use memory::{
    AvailableBytes, CacheSizeError, FixedMemory, HostMemory, SystemMemory,
    DEFAULT_MEMORY_FRACTION,
};

pub(crate) type CachedValue = Arc<dyn Any + Send + Sync>;
type SharedError = Arc<dyn std::error::Error + Send + Sync>;
type InFlight = Shared<BoxFuture<'static, Result<CachedValue, SharedError>>>;

/// Key of a cache entry: an ordered tuple of string parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Vec<String>);

impl CacheKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl From<&str> for CacheKey {
    fn from(part: &str) -> Self {
        Self(vec![part.to_string()])
    }
}

impl From<String> for CacheKey {
    fn from(part: String) -> Self {
        Self(vec![part])
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.0.join(", "))
    }
}

/// Size of a value as charged against the cache budget.
pub trait Weighted {
    fn size_bytes(&self) -> usize;
}

impl Weighted for Bytes {
    fn size_bytes(&self) -> usize {
        self.len()
    }
}

impl Weighted for Vec<u8> {
    fn size_bytes(&self) -> usize {
        self.len()
    }
}

impl Weighted for String {
    fn size_bytes(&self) -> usize {
        self.len()
    }
}

/// Verbosity of per-operation cache events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheLogLevel {
    Debug,
    #[default]
    Info,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("computing cache entry {key} failed: {cause}")]
    Compute { key: CacheKey, cause: SharedError },
    #[error("cache entry {0} holds a value of a different type")]
    TypeMismatch(CacheKey),
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub entries: usize,
    pub used_bytes: usize,
    pub available_bytes: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheState {
    lru: LruIndex,
    in_flight: HashMap<CacheKey, InFlight>,
}

struct Inner {
    available_bytes: usize,
    log_level: CacheLogLevel,
    state: Mutex<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
}

impl Inner {
    fn verbose(&self) -> bool {
        self.log_level == CacheLogLevel::Debug
    }

    fn record_hit(&self, key: &CacheKey) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        if self.verbose() {
            tracing::debug!(target: "canopy::cache", %key, "cache hit");
        }
    }

    fn record_miss(&self, key: &CacheKey) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        if self.verbose() {
            tracing::debug!(target: "canopy::cache", %key, "cache miss");
        }
    }

    fn store(&self, key: CacheKey, value: CachedValue, size: usize) -> bool {
        let admission = self.state.lock().lru.insert(key.clone(), value, size);
        match admission {
            Admission::Stored { evicted } => {
                self.stores.fetch_add(1, Ordering::Relaxed);
                if self.verbose() {
                    for old in &evicted {
                        tracing::debug!(target: "canopy::cache", key = %old, "cache evict");
                    }
                    tracing::debug!(target: "canopy::cache", %key, size, "cache store");
                }
                true
            }
            Admission::Rejected => {
                if self.verbose() && self.available_bytes > 0 {
                    tracing::debug!(
                        target: "canopy::cache",
                        %key,
                        size,
                        available_bytes = self.available_bytes,
                        "value larger than the cache; not stored"
                    );
                }
                false
            }
        }
    }

    fn finish<T, E>(&self, key: CacheKey, outcome: Result<T, E>) -> Result<CachedValue, SharedError>
    where
        T: Weighted + Send + Sync + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        // store before leaving the in-flight map so late callers hit the entry
        let result = match outcome {
            Ok(value) => {
                let size = value.size_bytes();
                let value: CachedValue = Arc::new(value);
                self.store(key.clone(), Arc::clone(&value), size);
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(target: "canopy::cache", %key, error = %err, "cache computation failed");
                Err(Arc::new(err) as SharedError)
            }
        };
        self.state.lock().in_flight.remove(&key);
        result
    }
}

/// Handle to the shared cache. Cloning is cheap and every clone sees the
/// same entries.
#[derive(Clone)]
pub struct ObjectCache {
    inner: Arc<Inner>,
}

impl fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCache")
            .field("available_bytes", &self.inner.available_bytes)
            .field("log_level", &self.inner.log_level)
            .finish_non_exhaustive()
    }
}

impl ObjectCache {
    pub fn new(available_bytes: usize, log_level: CacheLogLevel) -> Self {
        Self {
            inner: Arc::new(Inner {
                available_bytes,
                log_level,
                state: Mutex::new(CacheState {
                    lru: LruIndex::new(available_bytes),
                    in_flight: HashMap::new(),
                }),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                stores: AtomicU64::new(0),
            }),
        }
    }

    /// A cache that never retains anything.
    pub fn disabled() -> Self {
        Self::new(0, CacheLogLevel::Info)
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.available_bytes > 0
    }

    pub fn available_bytes(&self) -> usize {
        self.inner.available_bytes
    }

    pub fn log_level(&self) -> CacheLogLevel {
        self.inner.log_level
    }

    /// Return the cached value for `key`, computing and storing it on a miss.
    ///
    /// If another caller is already computing the same key, this waits for
    /// that computation instead of starting a second one. A failed
    /// computation is reported to every waiter and nothing is stored.
    pub async fn get_or_compute<T, F, Fut, E>(
        &self,
        key: CacheKey,
        compute: F,
    ) -> Result<Arc<T>, CacheError>
    where
        T: Weighted + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let flight = {
            let mut state = self.inner.state.lock();
            if let Some(value) = state.lru.get(&key) {
                self.inner.record_hit(&key);
                return downcast(&key, value);
            }
            self.inner.record_miss(&key);
            match state.in_flight.get(&key) {
                Some(flight) => flight.clone(),
                None => {
                    let flight = self.start_flight(key.clone(), compute);
                    state.in_flight.insert(key.clone(), flight.clone());
                    flight
                }
            }
        };

        let value = flight.await.map_err(|cause| CacheError::Compute {
            key: key.clone(),
            cause,
        })?;
        downcast(&key, value)
    }

    fn start_flight<T, F, Fut, E>(&self, key: CacheKey, compute: F) -> InFlight
    where
        T: Weighted + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let inner = Arc::clone(&self.inner);
        async move {
            let outcome = compute().await;
            inner.finish(key, outcome)
        }
        .boxed()
        .shared()
    }

    /// Look up a value without computing it.
    pub fn get<T>(&self, key: &CacheKey) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let value = self.inner.state.lock().lru.get(key);
        match value {
            Some(value) => {
                self.inner.record_hit(key);
                value.downcast::<T>().ok()
            }
            None => {
                self.inner.record_miss(key);
                None
            }
        }
    }

    /// Store a value with an explicit size. Returns whether it was retained.
    pub fn put<T>(&self, key: CacheKey, value: T, size_bytes: usize) -> bool
    where
        T: Send + Sync + 'static,
    {
        self.inner.store(key, Arc::new(value), size_bytes)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.state.lock().lru.contains(key)
    }

    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let removed = self.inner.state.lock().lru.remove(key);
        if removed && self.inner.verbose() {
            tracing::debug!(target: "canopy::cache", %key, "cache invalidate");
        }
        removed
    }

    pub fn clear(&self) {
        self.inner.state.lock().lru.clear();
        tracing::debug!(target: "canopy::cache", "cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock();
        CacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            stores: self.inner.stores.load(Ordering::Relaxed),
            entries: state.lru.len(),
            used_bytes: state.lru.used_bytes(),
            available_bytes: self.inner.available_bytes,
        }
    }

    /// Seconds since the least recently used entry was touched.
    pub fn oldest_entry_age(&self) -> Option<f64> {
        self.inner
            .state
            .lock()
            .lru
            .oldest_access()
            .map(|at| at.elapsed().as_secs_f64())
    }
}

fn downcast<T>(key: &CacheKey, value: CachedValue) -> Result<Arc<T>, CacheError>
where
    T: Send + Sync + 'static,
{
    value
        .downcast::<T>()
        .map_err(|_| CacheError::TypeMismatch(key.clone()))
}
