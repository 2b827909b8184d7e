//! Process-local TTL cache with heap-ordered expiry and background
//! reclamation.
//!
//! Entries are added with a key and a value and live for the cache's
//! configured TTL (or a per-call TTL). Reads treat entries past their
//! expiry as absent immediately; a background sweeper wakes every
//! `expire_frequency` and physically removes expired entries in batches of
//! at most `expire_limit`. The cache has no size limit; it grows until
//! entries expire. All operations are safe for concurrent access.
//!
//! With `deage_on_access` enabled, reading an entry resets its TTL in true
//! LRU fashion; by default the cache behaves as a plain TTL cache.
//!
//! With `metrics` enabled the cache reports the following, labeled by
//! `{metrics_prefix}cache`:
//! - `entries`: gauge of entries in the cache
//! - `hits` / `misses`: read outcome counters
//! - `sets`: write counter
//! - `evictions`: counter of physically removed entries
//! - `gc_runs`: counter of garbage collection passes
//! - `gc_sizes`: histogram of entries removed per pass (buckets 1, x2)
//! - `deaged`: histogram of remaining TTL in ms at de-age time
//!   (buckets 10, x10)
//!
//! Alternate backends (e.g. a remote cache) plug in behind the
//! [`ContextCache`] interface through a [`CacheProviderRegistry`].

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod config;
pub mod cache;
pub mod errors;
mod heap;
pub mod observability;
pub mod provider;

// Re-export the public API at the crate root for convenience
pub use config::CacheConfig;
pub use cache::TtlCache;
pub use errors::{CacheError, CacheResult};
pub use observability::{
    CacheMetrics, CacheObserver, ExponentialHistogram, MetricsError, MetricsResult, NullObserver,
};
pub use provider::{
    register_in_memory_provider, CacheProviderFactory, CacheProviderRegistry, ContextCache,
    ContextCacheAdapter, IN_MEMORY_PROVIDER,
};
