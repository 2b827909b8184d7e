//! The TTL cache engine.
//!
//! [`TtlCache`] pairs a hash index with an expiry-ordered binary heap under
//! a single reader/writer lock. Reads treat entries past their expiry as
//! absent without touching state; a background sweeper wakes on a fixed
//! interval and physically reclaims a bounded batch of expired entries per
//! pass. Values are cloned in and out, entries are never shared with
//! callers.
//!
//! The cache has no size limit: it grows until entries expire or the
//! process runs out of memory.
//!
//! # Example
//!
//! ```no_run
//! use ephemera_cache::{CacheConfig, TtlCache};
//!
//! # async fn example() {
//! let config = CacheConfig { ttl_secs: 60, ..CacheConfig::default() };
//! let cache: TtlCache<String> = TtlCache::from_config(&config);
//!
//! cache.set("session", "data".to_string());
//! assert_eq!(cache.get("session"), Some("data".to_string()));
//!
//! cache.close().await;
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use ephemera_common::time::{Clock, SystemClock};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::heap::{Entry, ExpiryHeap, NOT_IN_HEAP};
use crate::observability::{CacheMetrics, CacheObserver, MetricsResult, NullObserver};

/// Metric subsystem name, appended to the configured prefix.
const SUBSYSTEM_NAME: &str = "cache";

/// How long `close` waits for the sweeper task to finish.
const SWEEPER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Index and heap, always mutated together under one lock.
struct Storage<V> {
    index: HashMap<String, Entry<V>>,
    heap: ExpiryHeap,
    /// Scratch buffer reused across sweeps, sized to the batch limit.
    reclaim_buf: Vec<String>,
}

struct Inner<V, C> {
    storage: RwLock<Storage<V>>,
    ttl: Duration,
    expire_limit: usize,
    deage_on_access: bool,
    clock: C,
    observer: Arc<dyn CacheObserver>,
}

/// Process-local TTL cache with heap-ordered expiry and a background
/// sweeper.
///
/// Share it across tasks behind an `Arc`. Constructors spawn the sweeper
/// and therefore must run inside a Tokio runtime; call [`TtlCache::close`]
/// for a deterministic shutdown, or rely on drop cancelling the sweeper.
pub struct TtlCache<V, C = SystemClock> {
    inner: Arc<Inner<V, C>>,
    cancel: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<V> TtlCache<V, SystemClock>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache from configuration using the system clock.
    ///
    /// With `config.metrics` enabled the cache reports through a
    /// [`CacheMetrics`] named `{metrics_prefix}cache`; otherwise
    /// instrumentation is a no-op.
    pub fn from_config(config: &CacheConfig) -> Self {
        let observer: Arc<dyn CacheObserver> = if config.metrics {
            Arc::new(CacheMetrics::new(format!("{}{}", config.metrics_prefix, SUBSYSTEM_NAME)))
        } else {
            Arc::new(NullObserver)
        };
        Self::with_observer(config, SystemClock, observer)
    }
}

impl<V, C> TtlCache<V, C>
where
    V: Clone + Send + Sync + 'static,
    C: Clock + 'static,
{
    /// Create a cache with a custom clock (useful for testing) and no
    /// instrumentation.
    pub fn with_clock(config: &CacheConfig, clock: C) -> Self {
        Self::with_observer(config, clock, Arc::new(NullObserver))
    }

    /// Create a cache with a custom clock and observer.
    ///
    /// This is the full constructor the others delegate to. It spawns the
    /// background sweeper, so it must be called within a Tokio runtime.
    pub fn with_observer(config: &CacheConfig, clock: C, observer: Arc<dyn CacheObserver>) -> Self {
        let inner = Arc::new(Inner {
            storage: RwLock::new(Storage {
                index: HashMap::new(),
                heap: ExpiryHeap::new(),
                reclaim_buf: Vec::with_capacity(config.expire_limit),
            }),
            ttl: config.ttl(),
            expire_limit: config.expire_limit,
            deage_on_access: config.deage_on_access,
            clock,
            observer,
        });

        let cancel = CancellationToken::new();
        let handle =
            spawn_sweeper(Arc::downgrade(&inner), config.expire_frequency(), cancel.clone());

        info!(
            ttl_secs = config.ttl_secs,
            expire_limit = config.expire_limit,
            expire_frequency_ms = config.expire_frequency_ms,
            "ttl cache created"
        );

        Self { inner, cancel, sweeper: Mutex::new(Some(handle)) }
    }

    /// Fetch a value by key.
    ///
    /// A logically expired entry is reported as absent even before the
    /// sweeper has removed it. With `deage_on_access` enabled a hit also
    /// resets the entry's TTL.
    pub fn get(&self, key: &str) -> Option<V> {
        if self.inner.deage_on_access {
            self.inner.get_deage(key)
        } else {
            self.inner.get_plain(key)
        }
    }

    /// Store a value under a key with the cache's default TTL.
    ///
    /// Overwriting an existing key replaces its value and extends its
    /// expiry from the current clock reading.
    pub fn set(&self, key: &str, value: V) {
        self.inner.set_with_ttl(key, value, self.inner.ttl);
    }

    /// Store a value under a key with an explicit TTL for this entry.
    pub fn set_with_ttl(&self, key: &str, value: V, ttl: Duration) {
        self.inner.set_with_ttl(key, value, ttl);
    }

    /// Remove all entries.
    pub fn clear(&self) {
        let mut storage = self.inner.storage.write();
        storage.index = HashMap::new();
        storage.heap = ExpiryHeap::new();
        drop(storage);

        log_metric(self.inner.observer.on_entries_resize(0), "cache.entries");
        debug!("cache cleared");
    }

    /// Number of physically present entries, including logically expired
    /// ones the sweeper has not reclaimed yet.
    pub fn len(&self) -> usize {
        self.inner.storage.read().index.len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop the background sweeper and wait for it to finish.
    ///
    /// Safe to call more than once; later calls are no-ops.
    pub async fn close(&self) {
        self.cancel.cancel();

        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle {
            match tokio::time::timeout(SWEEPER_JOIN_TIMEOUT, handle).await {
                Ok(Ok(())) => debug!("cache sweeper stopped"),
                Ok(Err(e)) => warn!(error = %e, "cache sweeper task panicked"),
                Err(_) => warn!("cache sweeper did not stop within timeout"),
            }
        }
    }
}

impl<V, C> Drop for TtlCache<V, C> {
    fn drop(&mut self) {
        // Backstop for callers that never close(); the sweeper also exits
        // on its own once the weak reference is gone.
        self.cancel.cancel();
    }
}

impl<V, C> Inner<V, C>
where
    V: Clone + Send + Sync + 'static,
    C: Clock,
{
    fn get_plain(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let storage = self.storage.read();

        let Some(entry) = storage.index.get(key) else {
            log_metric(self.observer.on_miss(), "cache.miss");
            return None;
        };
        if entry.expires_at <= now {
            log_metric(self.observer.on_miss(), "cache.miss");
            return None;
        }

        log_metric(self.observer.on_hit(), "cache.hit");
        Some(entry.value.clone())
    }

    /// Read path with TTL refresh: needs the write lock because it updates
    /// the entry's expiry and re-balances the heap.
    fn get_deage(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut guard = self.storage.write();
        let Storage { index, heap, .. } = &mut *guard;

        let Some(entry) = index.get_mut(key) else {
            log_metric(self.observer.on_miss(), "cache.miss");
            return None;
        };
        if entry.expires_at <= now {
            log_metric(self.observer.on_miss(), "cache.miss");
            return None;
        }

        let remaining = entry.expires_at - now;
        let value = entry.value.clone();
        entry.expires_at = now + self.ttl;
        heap.fix(index, key);

        log_metric(self.observer.on_deage(remaining.as_millis() as u64), "cache.deage");
        log_metric(self.observer.on_hit(), "cache.hit");
        Some(value)
    }

    fn set_with_ttl(&self, key: &str, value: V, ttl: Duration) {
        let expires_at = self.clock.now() + ttl;
        let mut guard = self.storage.write();
        let Storage { index, heap, .. } = &mut *guard;

        if let Some(entry) = index.get_mut(key) {
            entry.value = value;
            entry.expires_at = expires_at;
            heap.fix(index, key);
        } else {
            index.insert(key.to_string(), Entry { value, expires_at, heap_slot: NOT_IN_HEAP });
            heap.push(index, key.to_string());
            log_metric(self.observer.on_entries_inc(), "cache.entries");
        }

        log_metric(self.observer.on_set(), "cache.set");
    }

    /// One garbage collection pass: reclaim a bounded batch of expired
    /// entries and drop them from the index.
    fn sweep(&self) {
        let now = self.clock.now();
        let mut guard = self.storage.write();
        let Storage { index, heap, reclaim_buf } = &mut *guard;

        let expired = heap.reclaim_expired(index, now, self.expire_limit, reclaim_buf);
        for key in reclaim_buf.iter() {
            index.remove(key);
        }
        debug_assert_eq!(index.len(), heap.len(), "cache index and expiry heap out of sync");
        let remaining = index.len();
        drop(guard);

        log_metric(self.observer.on_gc(expired), "cache.gc");
        log_metric(self.observer.on_evict(expired), "cache.evict");
        log_metric(self.observer.on_entries_resize(remaining), "cache.entries");

        if expired > 0 {
            debug!(expired, remaining, "cache sweep completed");
        }
    }
}

/// Background sweep loop.
///
/// Holds only a weak reference to the cache state, so an abandoned cache is
/// never kept alive by its own sweeper; the loop exits when cancelled or
/// when every cache handle is gone.
fn spawn_sweeper<V, C>(
    inner: Weak<Inner<V, C>>,
    frequency: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
    C: Clock + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("cache sweeper cancelled");
                    break;
                }
                _ = tokio::time::sleep(frequency) => {
                    let Some(inner) = inner.upgrade() else {
                        debug!("cache dropped, sweeper exiting");
                        break;
                    };
                    inner.sweep();
                }
            }
        }
    })
}

fn log_metric(result: MetricsResult<()>, metric: &'static str) {
    if let Err(err) = result {
        warn!(metric, error = ?err, "failed to record cache metric");
    }
}
