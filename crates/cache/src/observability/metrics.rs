//! Counter, gauge and histogram backed cache metrics.
//!
//! ## Design
//! - **SeqCst ordering** for atomics that feed derived metrics (hit rate,
//!   histogram mean)
//! - **Relaxed ordering** for independent counters
//! - **No locking** - the whole structure is atomics, safe to share behind
//!   an `Arc` and to update while the cache lock is held

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use super::{CacheObserver, MetricsError, MetricsResult};

/// Bucket count for the gc batch size histogram (1, 2, 4, .. 512).
const GC_SIZE_BUCKETS: usize = 10;

/// Bucket count for the de-age remaining-TTL histogram in milliseconds
/// (10, 100, .. 100_000).
const DEAGE_BUCKETS: usize = 5;

/// Fixed-bound exponential histogram on atomics.
///
/// Bucket upper bounds are `start * factor^i`; one extra overflow bucket
/// catches everything above the last bound. Observation is lock-free.
#[derive(Debug)]
pub struct ExponentialHistogram {
    bounds: Vec<u64>,
    buckets: Vec<AtomicU64>,
    count: AtomicU64,
    sum: AtomicU64,
}

impl ExponentialHistogram {
    /// Create a histogram with `buckets` exponential bounds starting at
    /// `start` and growing by `factor`, plus an overflow bucket.
    pub fn new(start: u64, factor: u64, buckets: usize) -> Self {
        let mut bounds = Vec::with_capacity(buckets);
        let mut bound = start;
        for _ in 0..buckets {
            bounds.push(bound);
            bound = bound.saturating_mul(factor);
        }
        let buckets = (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect();
        Self { bounds, buckets, count: AtomicU64::new(0), sum: AtomicU64::new(0) }
    }

    /// Record one observation.
    pub fn observe(&self, value: u64) {
        let slot = self
            .bounds
            .iter()
            .position(|bound| value <= *bound)
            .unwrap_or(self.bounds.len());
        // Relaxed OK: per-bucket counters are independent
        self.buckets[slot].fetch_add(1, Ordering::Relaxed);
        // SeqCst for consistency with the mean calculation
        self.count.fetch_add(1, Ordering::SeqCst);
        self.sum.fetch_add(value, Ordering::SeqCst);
    }

    /// Total number of observations.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    /// Sum of all observed values.
    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::SeqCst)
    }

    /// Mean observed value.
    ///
    /// Returns `Err(MetricsError::EmptyData)` if nothing was observed yet.
    pub fn mean(&self) -> MetricsResult<f64> {
        // SeqCst for a consistent snapshot of count and sum
        let count = self.count.load(Ordering::SeqCst);
        let sum = self.sum.load(Ordering::SeqCst);
        if count == 0 {
            return Err(MetricsError::EmptyData { metric: "mean" });
        }
        Ok(sum as f64 / count as f64)
    }

    /// Upper bounds of the regular buckets.
    pub fn bounds(&self) -> &[u64] {
        &self.bounds
    }

    /// Per-bucket observation counts; the final element is the overflow
    /// bucket.
    pub fn bucket_counts(&self) -> Vec<u64> {
        self.buckets.iter().map(|bucket| bucket.load(Ordering::Relaxed)).collect()
    }
}

/// Production cache instrumentation, labeled by cache name.
///
/// Exposes the `cache` subsystem metric set: the `entries` gauge, the
/// `hits`, `misses`, `sets`, `evictions` and `gc_runs` counters, and the
/// `gc_sizes` and `deaged` histograms.
#[derive(Debug)]
pub struct CacheMetrics {
    name: String,
    entries: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    evictions: AtomicU64,
    gc_runs: AtomicU64,
    gc_sizes: ExponentialHistogram,
    deaged: ExponentialHistogram,
}

impl CacheMetrics {
    /// Create a metrics set for the cache with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            gc_runs: AtomicU64::new(0),
            gc_sizes: ExponentialHistogram::new(1, 2, GC_SIZE_BUCKETS),
            deaged: ExponentialHistogram::new(10, 10, DEAGE_BUCKETS),
        }
    }

    /// Name this cache's metrics are labeled with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value of the `entries` gauge.
    pub fn entries(&self) -> usize {
        self.entries.load(Ordering::SeqCst)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> u64 {
        self.sets.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn gc_runs(&self) -> u64 {
        self.gc_runs.load(Ordering::Relaxed)
    }

    /// Histogram of batch sizes per garbage collection run.
    pub fn gc_sizes(&self) -> &ExponentialHistogram {
        &self.gc_sizes
    }

    /// Histogram of remaining TTL (milliseconds) at de-age time.
    pub fn deaged(&self) -> &ExponentialHistogram {
        &self.deaged
    }

    /// Cache hit rate as a fraction (0.0 to 1.0).
    ///
    /// Returns 0.0 if no reads have been recorded.
    pub fn hit_rate(&self) -> f64 {
        // SeqCst for a consistent snapshot of both counters
        let hits = self.hits.load(Ordering::SeqCst);
        let misses = self.misses.load(Ordering::SeqCst);

        let total = hits + misses;
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }
}

impl CacheObserver for CacheMetrics {
    fn on_hit(&self) -> MetricsResult<()> {
        // SeqCst for consistency with hit_rate calculation
        self.hits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_miss(&self) -> MetricsResult<()> {
        // SeqCst for consistency with hit_rate calculation
        self.misses.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_set(&self) -> MetricsResult<()> {
        // Relaxed OK: independent counter
        self.sets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn on_entries_inc(&self) -> MetricsResult<()> {
        self.entries.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_entries_resize(&self, entries: usize) -> MetricsResult<()> {
        self.entries.store(entries, Ordering::SeqCst);
        Ok(())
    }

    fn on_gc(&self, expired: usize) -> MetricsResult<()> {
        // Relaxed OK: independent counter
        self.gc_runs.fetch_add(1, Ordering::Relaxed);
        self.gc_sizes.observe(expired as u64);
        Ok(())
    }

    fn on_evict(&self, evicted: usize) -> MetricsResult<()> {
        // Relaxed OK: independent counter
        self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        Ok(())
    }

    fn on_deage(&self, remaining_ms: u64) -> MetricsResult<()> {
        self.deaged.observe(remaining_ms);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for observability::metrics.
    use super::*;

    #[test]
    fn test_new_starts_empty() {
        let metrics = CacheMetrics::new("cache");
        assert_eq!(metrics.name(), "cache");
        assert_eq!(metrics.entries(), 0);
        assert_eq!(metrics.hits(), 0);
        assert_eq!(metrics.misses(), 0);
        assert_eq!(metrics.sets(), 0);
        assert_eq!(metrics.evictions(), 0);
        assert_eq!(metrics.gc_runs(), 0);
        assert_eq!(metrics.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate() {
        let metrics = CacheMetrics::new("cache");
        for _ in 0..3 {
            metrics.on_hit().unwrap();
        }
        for _ in 0..7 {
            metrics.on_miss().unwrap();
        }

        assert!((metrics.hit_rate() - 0.3).abs() < 0.001);
    }

    #[test]
    fn test_entries_gauge_tracks_inc_and_resize() {
        let metrics = CacheMetrics::new("cache");
        metrics.on_entries_inc().unwrap();
        metrics.on_entries_inc().unwrap();
        assert_eq!(metrics.entries(), 2);

        metrics.on_entries_resize(1).unwrap();
        assert_eq!(metrics.entries(), 1);

        metrics.on_entries_resize(0).unwrap();
        assert_eq!(metrics.entries(), 0);
    }

    #[test]
    fn test_gc_records_runs_and_sizes() {
        let metrics = CacheMetrics::new("cache");
        metrics.on_gc(3).unwrap();
        metrics.on_gc(0).unwrap();
        metrics.on_evict(3).unwrap();

        assert_eq!(metrics.gc_runs(), 2);
        assert_eq!(metrics.evictions(), 3);
        assert_eq!(metrics.gc_sizes().count(), 2);
        assert_eq!(metrics.gc_sizes().sum(), 3);
    }

    #[test]
    fn test_deage_histogram() {
        let metrics = CacheMetrics::new("cache");
        metrics.on_deage(250).unwrap();
        metrics.on_deage(90_000).unwrap();

        assert_eq!(metrics.deaged().count(), 2);
        assert_eq!(metrics.deaged().sum(), 90_250);
    }

    #[test]
    fn test_histogram_bounds_are_exponential() {
        let histogram = ExponentialHistogram::new(1, 2, 4);
        assert_eq!(histogram.bounds(), &[1, 2, 4, 8]);

        let histogram = ExponentialHistogram::new(10, 10, 3);
        assert_eq!(histogram.bounds(), &[10, 100, 1_000]);
    }

    #[test]
    fn test_histogram_bucket_assignment() {
        let histogram = ExponentialHistogram::new(1, 2, 4);
        histogram.observe(0); // le 1
        histogram.observe(1); // le 1
        histogram.observe(3); // le 4
        histogram.observe(100); // overflow

        assert_eq!(histogram.bucket_counts(), vec![2, 0, 1, 0, 1]);
        assert_eq!(histogram.count(), 4);
        assert_eq!(histogram.sum(), 104);
    }

    #[test]
    fn test_histogram_mean_empty_is_error() {
        let histogram = ExponentialHistogram::new(1, 2, 4);
        assert!(matches!(histogram.mean(), Err(MetricsError::EmptyData { metric: "mean" })));

        histogram.observe(4);
        histogram.observe(8);
        assert_eq!(histogram.mean().unwrap(), 6.0);
    }

    #[test]
    fn test_null_observer_accepts_everything() {
        let observer = super::super::NullObserver;
        assert!(observer.on_hit().is_ok());
        assert!(observer.on_miss().is_ok());
        assert!(observer.on_set().is_ok());
        assert!(observer.on_entries_inc().is_ok());
        assert!(observer.on_entries_resize(7).is_ok());
        assert!(observer.on_gc(1).is_ok());
        assert!(observer.on_evict(1).is_ok());
        assert!(observer.on_deage(10).is_ok());
    }
}
