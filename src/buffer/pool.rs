//! Size-Class Buffer Pool
//!
//! The pool keeps one lock-free free-list per size class. Class `i` holds
//! buffers of exactly `unit_size * (i + 1) * 2` bytes, so with the default
//! 1 KiB unit the classes are 2 KiB, 4 KiB, 6 KiB ... 40 KiB.
//!
//! ```text
//!  acquire(5000)
//!       │  class_for(5000) = (5000 - 1) / 2048 = 2
//!       ▼
//! ┌──────────┬──────────┬──────────┬─────┬───────────┐
//! │ 2 KiB    │ 4 KiB    │ 6 KiB    │ ... │ 40 KiB    │   SegQueue per class
//! │ [][][]   │ [][]     │ [] ◄─pop │     │ [][][][]  │
//! └──────────┴──────────┴──────────┴─────┴───────────┘
//!       ▲
//!       │  recycle(): zero, push onto class_for(capacity)
//! ```
//!
//! An empty free-list never fails an acquire: a new buffer of the class
//! capacity is allocated on demand, so the pool grows under load and keeps
//! what it grew. Requests larger than the last class get an overflow
//! allocation rounded up to the next class boundary; overflow buffers are
//! freed on release instead of being pooled.
//!
//! ## Sharing
//!
//! `BufferPool` is a cheap `Arc` handle. Construct one during startup and
//! hand clones to every acceptor and connector; tests build their own
//! isolated pools.

use crate::buffer::pooled::PooledBuffer;
use crossbeam_queue::SegQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Default size unit (1 KiB).
pub const DEFAULT_UNIT_SIZE: usize = 1024;

/// Default number of size classes (2 KiB through 40 KiB).
pub const DEFAULT_CLASS_COUNT: usize = 20;

/// Default number of buffers pre-allocated per class by [`BufferPool::warm_start`].
pub const DEFAULT_WARM_COUNT: usize = 32;

/// Buffer pool sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Base unit; class `i` has capacity `unit_size * (i + 1) * 2`
    pub unit_size: usize,
    /// Number of pooled size classes
    pub class_count: usize,
    /// Buffers allocated per class during warm start
    pub warm_count: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            unit_size: DEFAULT_UNIT_SIZE,
            class_count: DEFAULT_CLASS_COUNT,
            warm_count: DEFAULT_WARM_COUNT,
        }
    }
}

impl PoolConfig {
    /// Capacity of the buffers held by class `class`.
    pub fn class_capacity(&self, class: usize) -> usize {
        self.step() * (class + 1)
    }

    /// Index of the smallest class whose capacity is at least `size`.
    ///
    /// The result may be `>= class_count` for oversized requests. A request
    /// for zero bytes maps to class 0.
    pub fn class_for(&self, size: usize) -> usize {
        size.saturating_sub(1) / self.step()
    }

    /// Largest request served from a pooled class.
    pub fn max_pooled_size(&self) -> usize {
        self.class_capacity(self.class_count - 1)
    }

    fn step(&self) -> usize {
        self.unit_size * 2
    }

    fn normalized(mut self) -> Self {
        self.unit_size = self.unit_size.max(1);
        self.class_count = self.class_count.max(1);
        self
    }
}

/// Counters kept by the pool.
#[derive(Debug, Default)]
struct PoolCounters {
    allocations: AtomicU64,
    reuses: AtomicU64,
    recycled: AtomicU64,
    overflow_freed: AtomicU64,
}

/// Point-in-time view of pool activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers freshly allocated (warm start, empty class, overflow)
    pub allocations: u64,
    /// Acquires served from a free-list
    pub reuses: u64,
    /// Buffers returned to a free-list
    pub recycled: u64,
    /// Overflow buffers freed on release
    pub overflow_freed: u64,
    /// Buffers currently sitting in each class free-list
    pub free_per_class: Vec<usize>,
}

impl PoolStats {
    /// Total number of idle buffers across all classes.
    pub fn free_total(&self) -> usize {
        self.free_per_class.iter().sum()
    }
}

struct SizeClass {
    capacity: usize,
    free: SegQueue<Box<[u8]>>,
}

struct PoolInner {
    config: PoolConfig,
    classes: Box<[SizeClass]>,
    counters: PoolCounters,
}

/// A process-wide pool of reusable byte buffers bucketed by size class.
///
/// All operations are safe to call concurrently from any worker thread;
/// the free-lists are `crossbeam_queue::SegQueue`s, so push and pop never
/// take a lock.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Creates an empty pool. Call [`warm_start`](Self::warm_start) before
    /// traffic starts to pre-populate the classes.
    pub fn new(config: PoolConfig) -> Self {
        let config = config.normalized();
        let classes = (0..config.class_count)
            .map(|class| SizeClass {
                capacity: config.class_capacity(class),
                free: SegQueue::new(),
            })
            .collect();

        Self {
            inner: Arc::new(PoolInner {
                config,
                classes,
                counters: PoolCounters::default(),
            }),
        }
    }

    /// Creates a pool and immediately warm-starts it.
    pub fn with_warm_start(config: PoolConfig) -> Self {
        let pool = Self::new(config);
        pool.warm_start();
        pool
    }

    /// Returns the pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Pre-allocates `warm_count` buffers into every class.
    ///
    /// Returns the number of buffers allocated.
    pub fn warm_start(&self) -> usize {
        let per_class = self.inner.config.warm_count;
        for class in self.inner.classes.iter() {
            for _ in 0..per_class {
                class.free.push(zeroed(class.capacity));
            }
        }

        let total = per_class * self.inner.classes.len();
        self.inner
            .counters
            .allocations
            .fetch_add(total as u64, Ordering::Relaxed);
        debug!(
            classes = self.inner.classes.len(),
            per_class, total, "Buffer pool warm start"
        );
        total
    }

    /// Acquires a buffer with capacity of at least `min_size` bytes.
    ///
    /// The returned buffer is empty (length 0) and uniquely owned by the
    /// caller. Dropping it hands the memory back to this pool.
    pub fn acquire(&self, min_size: usize) -> PooledBuffer {
        let config = &self.inner.config;
        let class = config.class_for(min_size);
        let counters = &self.inner.counters;

        let storage = match self.inner.classes.get(class) {
            Some(size_class) => match size_class.free.pop() {
                Some(storage) => {
                    counters.reuses.fetch_add(1, Ordering::Relaxed);
                    storage
                }
                None => {
                    counters.allocations.fetch_add(1, Ordering::Relaxed);
                    zeroed(size_class.capacity)
                }
            },
            None => {
                counters.allocations.fetch_add(1, Ordering::Relaxed);
                zeroed(config.class_capacity(class))
            }
        };

        PooledBuffer::from_parts(storage, self.clone())
    }

    /// Takes back the storage of a released buffer.
    ///
    /// The storage is zeroed and pushed onto the class matching its actual
    /// capacity. Overflow storage is dropped.
    pub(crate) fn recycle(&self, mut storage: Box<[u8]>) {
        let class = self.inner.config.class_for(storage.len());
        let counters = &self.inner.counters;

        match self.inner.classes.get(class) {
            Some(size_class) if size_class.capacity == storage.len() => {
                storage.fill(0);
                size_class.free.push(storage);
                counters.recycled.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                counters.overflow_freed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Frees every idle buffer in every class.
    ///
    /// Buffers still held elsewhere are unaffected and will be pooled again
    /// when released. Intended for process shutdown once all sessions are
    /// gone. Returns the number of buffers freed.
    pub fn drain(&self) -> usize {
        let mut freed = 0;
        for class in self.inner.classes.iter() {
            while class.free.pop().is_some() {
                freed += 1;
            }
        }
        debug!(freed, "Buffer pool drained");
        freed
    }

    /// Number of idle buffers in `class`.
    pub fn free_count(&self, class: usize) -> usize {
        self.inner
            .classes
            .get(class)
            .map(|c| c.free.len())
            .unwrap_or(0)
    }

    /// Returns a snapshot of the pool counters.
    pub fn stats(&self) -> PoolStats {
        let counters = &self.inner.counters;
        PoolStats {
            allocations: counters.allocations.load(Ordering::Relaxed),
            reuses: counters.reuses.load(Ordering::Relaxed),
            recycled: counters.recycled.load(Ordering::Relaxed),
            overflow_freed: counters.overflow_freed.load(Ordering::Relaxed),
            free_per_class: self.inner.classes.iter().map(|c| c.free.len()).collect(),
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

fn zeroed(capacity: usize) -> Box<[u8]> {
    vec![0u8; capacity].into_boxed_slice()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn small_pool() -> BufferPool {
        BufferPool::new(PoolConfig {
            unit_size: 16,
            class_count: 4,
            warm_count: 2,
        })
    }

    #[test]
    fn test_class_capacities() {
        let config = PoolConfig::default();
        assert_eq!(config.class_capacity(0), 2048);
        assert_eq!(config.class_capacity(1), 4096);
        assert_eq!(config.class_capacity(19), 40960);
        assert_eq!(config.max_pooled_size(), 40960);
    }

    #[test]
    fn test_class_selection_boundaries() {
        let config = PoolConfig::default();
        assert_eq!(config.class_for(0), 0);
        assert_eq!(config.class_for(1), 0);
        assert_eq!(config.class_for(2048), 0);
        assert_eq!(config.class_for(2049), 1);
        assert_eq!(config.class_for(40960), 19);
        assert_eq!(config.class_for(40961), 20);
    }

    #[test]
    fn test_class_selection_is_monotonic() {
        let config = PoolConfig::default();
        for size in 1..20_000usize {
            assert!(config.class_for(size * 2) >= config.class_for(size));
        }
    }

    #[test]
    fn test_acquire_returns_smallest_fitting_class() {
        let pool = small_pool();
        let max = pool.config().max_pooled_size();

        for n in 1..=max {
            let buf = pool.acquire(n);
            assert!(buf.capacity() >= n);
            assert_eq!(buf.len(), 0);

            let class = pool.config().class_for(n);
            assert_eq!(buf.capacity(), pool.config().class_capacity(class));
            if class > 0 {
                assert!(pool.config().class_capacity(class - 1) < n);
            }
        }
    }

    #[test]
    fn test_overflow_allocation() {
        let pool = small_pool();
        // classes are 32, 64, 96, 128
        let buf = pool.acquire(129);
        assert_eq!(buf.capacity(), 160);
        drop(buf);

        let stats = pool.stats();
        assert_eq!(stats.overflow_freed, 1);
        assert_eq!(stats.recycled, 0);
        assert_eq!(stats.free_total(), 0);
    }

    #[test]
    fn test_warm_start_and_reuse() {
        let pool = small_pool();
        assert_eq!(pool.warm_start(), 8);
        assert_eq!(pool.free_count(0), 2);
        assert_eq!(pool.free_count(3), 2);

        let a = pool.acquire(10);
        let b = pool.acquire(10);
        let c = pool.acquire(10);
        assert_eq!(pool.free_count(0), 0);

        let stats = pool.stats();
        assert_eq!(stats.reuses, 2);
        assert_eq!(stats.allocations, 9);

        drop((a, b, c));
        // grown, never shrunk
        assert_eq!(pool.free_count(0), 3);
    }

    #[test]
    fn test_release_returns_to_capacity_class() {
        let pool = small_pool();
        // asked for 40, served from the 64-byte class
        let mut buf = pool.acquire(40);
        buf.write(&[7u8; 10]).unwrap();
        drop(buf);

        assert_eq!(pool.free_count(1), 1);
        assert_eq!(pool.free_count(0), 0);
    }

    #[test]
    fn test_recycled_buffers_are_zeroed() {
        let pool = small_pool();
        let mut buf = pool.acquire(32);
        buf.write(&[0xAB; 32]).unwrap();
        drop(buf);

        let mut again = pool.acquire(32);
        assert!(again.storage_mut().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_drain() {
        let pool = small_pool();
        pool.warm_start();
        let held = pool.acquire(1);

        assert_eq!(pool.drain(), 7);
        assert_eq!(pool.stats().free_total(), 0);

        drop(held);
        assert_eq!(pool.stats().free_total(), 1);
    }

    #[test]
    fn test_concurrent_acquire_release() {
        let pool = small_pool();
        pool.warm_start();

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let pool = pool.clone();
                thread::spawn(move || {
                    for i in 0..1000usize {
                        let size = 1 + (i * 7 + t) % 128;
                        let mut buf = pool.acquire(size);
                        buf.write(&[t as u8; 1]).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = pool.stats();
        assert_eq!(stats.reuses + stats.allocations - 8, 8000);
        assert_eq!(stats.recycled, 8000);
        assert_eq!(stats.free_total() as u64, stats.allocations);
    }
}
