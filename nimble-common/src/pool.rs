use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use nimble_error::{NimbleResult, nimble_bail};

/// A shareable memory pool that accounts for every buffer allocated under it.
///
/// The pool does not allocate memory itself; it meters allocations performed
/// by [`Vector`](crate::Vector) and the per-stream decoder state, and rejects
/// reservations beyond its configured capacity. Cloning a pool shares the
/// underlying accounting.
#[derive(Clone)]
pub struct MemoryPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    name: String,
    capacity: Option<u64>,
    track_usage: bool,
    used: AtomicU64,
    peak: AtomicU64,
}

impl MemoryPool {
    /// An unbounded pool with usage tracking controlled by `track_usage`.
    pub fn new(name: impl Into<String>, track_usage: bool) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                name: name.into(),
                capacity: None,
                track_usage,
                used: AtomicU64::new(0),
                peak: AtomicU64::new(0),
            }),
        }
    }

    /// A pool that rejects reservations once `capacity` bytes are in use.
    pub fn with_capacity(name: impl Into<String>, capacity: u64) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                name: name.into(),
                capacity: Some(capacity),
                track_usage: true,
                used: AtomicU64::new(0),
                peak: AtomicU64::new(0),
            }),
        }
    }

    /// The pool's name, used in error messages.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Reserve `bytes` from the pool.
    pub fn reserve(&self, bytes: usize) -> NimbleResult<()> {
        let bytes = bytes as u64;
        let used = self.inner.used.fetch_add(bytes, Ordering::Relaxed) + bytes;
        if let Some(capacity) = self.inner.capacity {
            if used > capacity {
                self.inner.used.fetch_sub(bytes, Ordering::Relaxed);
                nimble_bail!(
                    ResourceExhausted: "pool '{}' exceeded capacity: {} + {} > {}",
                    self.inner.name,
                    used - bytes,
                    bytes,
                    capacity
                );
            }
        }
        if self.inner.track_usage {
            self.inner.peak.fetch_max(used, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Return `bytes` to the pool.
    pub fn release(&self, bytes: usize) {
        self.inner.used.fetch_sub(bytes as u64, Ordering::Relaxed);
    }

    /// Bytes currently reserved.
    pub fn used(&self) -> u64 {
        self.inner.used.load(Ordering::Relaxed)
    }

    /// High-water mark of reserved bytes. Zero unless usage tracking is on.
    pub fn peak(&self) -> u64 {
        self.inner.peak.load(Ordering::Relaxed)
    }
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new("nimble.default", false)
    }
}

impl std::fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPool")
            .field("name", &self.inner.name)
            .field("used", &self.used())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_release() {
        let pool = MemoryPool::new("test", true);
        pool.reserve(1024).unwrap();
        pool.reserve(512).unwrap();
        assert_eq!(pool.used(), 1536);
        pool.release(1024);
        assert_eq!(pool.used(), 512);
        assert_eq!(pool.peak(), 1536);
    }

    #[test]
    fn capacity_exceeded() {
        let pool = MemoryPool::with_capacity("small", 100);
        pool.reserve(60).unwrap();
        assert!(pool.reserve(41).is_err());
        // The failed reservation must not leak accounting.
        assert_eq!(pool.used(), 60);
        pool.reserve(40).unwrap();
    }
}
