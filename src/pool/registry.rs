//! Free-region registry
//!
//! Recency-ordered free list of raw regions keyed by exact element count.
//! A steady capture loop produces a small number of distinct frame sizes,
//! so after warm-up every acquisition is served from the registry instead
//! of the system allocator.

use parking_lot::Mutex;
use std::alloc::{self, Layout};
use std::mem;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

use crate::config::PoolConfig;

use super::buffer::FrameBuffer;

/// Pool errors
#[derive(Debug, Error)]
pub enum PoolError {
    /// The system allocator could not satisfy a fresh region request
    #[error("out of memory allocating region of {bytes} bytes")]
    OutOfMemory {
        /// Requested region size in bytes
        bytes: usize,
    },
    /// Requested element count does not fit in a single allocation
    #[error("region of {count} elements overflows the address space")]
    CapacityOverflow {
        /// Requested element count
        count: usize,
    },
}

/// Element types that may live in pooled storage.
///
/// Regions are handed out uninitialized, so implementors must be plain
/// fixed-size values for which every bit pattern is a valid value. Types
/// with drop glue or with invalid representations (`bool`, references,
/// most enums) must not implement this.
///
/// # Safety
///
/// Any sequence of `size_of::<Self>()` bytes must be a valid `Self`.
pub unsafe trait FrameElement: Copy + Send + Sync + 'static {}

unsafe impl FrameElement for u8 {}
unsafe impl FrameElement for i8 {}
unsafe impl FrameElement for u16 {}
unsafe impl FrameElement for i16 {}
unsafe impl FrameElement for u32 {}
unsafe impl FrameElement for i32 {}
unsafe impl FrameElement for f32 {}
unsafe impl<T: FrameElement, const N: usize> FrameElement for [T; N] {}

/// An owned raw region of `len` elements.
///
/// While a region sits in the free list its pointer is not aliased by any
/// live handle; length zero means the dangling placeholder pointer.
pub(crate) struct Region<T> {
    pub(crate) ptr: NonNull<T>,
    pub(crate) len: usize,
}

// A region is plain owned storage with no interior sharing.
unsafe impl<T: Send> Send for Region<T> {}

impl<T: FrameElement> Region<T> {
    /// Allocate fresh uninitialized storage for `len` elements.
    fn alloc(len: usize) -> Result<Self, PoolError> {
        if len == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                len: 0,
            });
        }
        let layout = Self::layout(len)?;
        // Safety: layout has non-zero size
        let raw = unsafe { alloc::alloc(layout) };
        match NonNull::new(raw.cast::<T>()) {
            Some(ptr) => Ok(Self { ptr, len }),
            None => Err(PoolError::OutOfMemory {
                bytes: layout.size(),
            }),
        }
    }

    fn layout(len: usize) -> Result<Layout, PoolError> {
        Layout::array::<T>(len).map_err(|_| PoolError::CapacityOverflow { count: len })
    }
}

impl<T> Region<T> {
    /// Return this region's storage to the system allocator.
    fn free(self) {
        if self.len == 0 {
            return;
        }
        // The layout was validated when the region was first allocated.
        let layout = Layout::array::<T>(self.len).expect("region layout validated at allocation");
        // Safety: the region owns this storage and it was allocated with
        // exactly this layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr().cast(), layout) };
    }

    fn byte_len(&self) -> usize {
        self.len * mem::size_of::<T>()
    }
}

/// Shared registry state (one per pool, shared with every handle)
pub(crate) struct PoolInner<T> {
    /// Free regions in release order; scanned back-to-front on acquire
    free: Mutex<Vec<Region<T>>>,

    // Counters
    fresh: AtomicUsize,
    recycled: AtomicUsize,
    live: AtomicUsize,
}

impl<T: FrameElement> PoolInner<T> {
    /// Take a region of exactly `len` elements, favoring the most recently
    /// freed match. Falls back to a fresh system allocation on miss; the
    /// registry lock is released before the system allocator is touched.
    pub(crate) fn take_region(&self, len: usize) -> Result<Region<T>, PoolError> {
        if len == 0 {
            return Region::alloc(0);
        }

        {
            let mut free = self.free.lock();
            if let Some(pos) = free.iter().rposition(|region| region.len == len) {
                let region = free.swap_remove(pos);
                self.recycled.fetch_add(1, Ordering::Relaxed);
                self.live.fetch_add(1, Ordering::Relaxed);
                return Ok(region);
            }
        }

        let region = Region::alloc(len)?;
        trace!(len, bytes = region.byte_len(), "fresh region allocation");
        self.fresh.fetch_add(1, Ordering::Relaxed);
        self.live.fetch_add(1, Ordering::Relaxed);
        Ok(region)
    }

    /// Return a region to the registry for reuse. Zero-length placeholder
    /// regions own no storage and are discarded.
    pub(crate) fn put_region(&self, region: Region<T>) {
        if region.len == 0 {
            return;
        }
        self.live.fetch_sub(1, Ordering::Relaxed);
        self.free.lock().push(region);
    }
}

impl<T> Drop for PoolInner<T> {
    fn drop(&mut self) {
        // Every free region is released to the system exactly once. Regions
        // still owned by handles are freed by those handles' drops through
        // their own Arc reference.
        for region in self.free.get_mut().drain(..) {
            region.free();
        }
    }
}

/// Session-scoped pool of reusable frame regions.
///
/// Cloning is cheap and shares the registry. Handles keep their own
/// reference to the registry, so buffers may outlive the pool value they
/// were acquired from.
pub struct FramePool<T: FrameElement> {
    inner: Arc<PoolInner<T>>,
}

impl<T: FrameElement> Clone for FramePool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: FrameElement> FramePool<T> {
    /// Create a pool with default configuration
    pub fn new() -> Self {
        Self::with_config(&PoolConfig::default())
    }

    /// Create a pool with explicit configuration
    pub fn with_config(config: &PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::with_capacity(config.reserve_regions)),
                fresh: AtomicUsize::new(0),
                recycled: AtomicUsize::new(0),
                live: AtomicUsize::new(0),
            }),
        }
    }

    /// Create an empty buffer bound to this pool
    pub fn buffer(&self) -> FrameBuffer<T> {
        FrameBuffer::empty(self.inner.clone())
    }

    /// Acquire a buffer of `len` elements with unspecified contents.
    ///
    /// The caller must write every element it later reads. `len == 0` is
    /// permitted and yields a zero-length usable buffer.
    pub fn acquire(&self, len: usize) -> Result<FrameBuffer<T>, PoolError> {
        let region = self.inner.take_region(len)?;
        Ok(FrameBuffer::from_region(region, self.inner.clone()))
    }

    /// Snapshot of pool counters
    pub fn stats(&self) -> PoolStats {
        let (free_regions, free_bytes) = {
            let free = self.inner.free.lock();
            (free.len(), free.iter().map(Region::byte_len).sum())
        };
        PoolStats {
            fresh_allocations: self.inner.fresh.load(Ordering::Relaxed),
            recycled: self.inner.recycled.load(Ordering::Relaxed),
            live_buffers: self.inner.live.load(Ordering::Relaxed),
            free_regions,
            free_bytes,
        }
    }
}

impl<T: FrameElement> Default for FramePool<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Pool statistics
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Regions obtained from the system allocator
    pub fresh_allocations: usize,
    /// Acquisitions served from the free registry
    pub recycled: usize,
    /// Non-empty buffers currently owned by handles
    pub live_buffers: usize,
    /// Regions currently sitting in the free registry
    pub free_regions: usize,
    /// Bytes held by the free registry
    pub free_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_size_reuse_returns_same_pointer() {
        let pool: FramePool<u8> = FramePool::new();

        let buf = pool.acquire(640 * 480).unwrap();
        let first_ptr = buf.as_ptr();
        drop(buf);

        let buf = pool.acquire(640 * 480).unwrap();
        assert_eq!(buf.as_ptr(), first_ptr);

        let stats = pool.stats();
        assert_eq!(stats.fresh_allocations, 1);
        assert_eq!(stats.recycled, 1);
    }

    #[test]
    fn test_most_recently_freed_preferred() {
        let pool: FramePool<u16> = FramePool::new();

        let a = pool.acquire(256).unwrap();
        let b = pool.acquire(256).unwrap();
        let a_ptr = a.as_ptr();
        let b_ptr = b.as_ptr();
        assert_ne!(a_ptr, b_ptr);

        drop(a);
        drop(b);

        // b was freed last, so it comes back first
        let warm = pool.acquire(256).unwrap();
        assert_eq!(warm.as_ptr(), b_ptr);
        let cold = pool.acquire(256).unwrap();
        assert_eq!(cold.as_ptr(), a_ptr);
    }

    #[test]
    fn test_size_mismatch_never_reused() {
        let pool: FramePool<u8> = FramePool::new();

        let small = pool.acquire(100).unwrap();
        let small_ptr = small.as_ptr();
        drop(small);

        let other = pool.acquire(200).unwrap();
        assert_ne!(other.as_ptr(), small_ptr);
        assert_eq!(pool.stats().recycled, 0);

        // the 100-element region is still waiting for a matching request
        let again = pool.acquire(100).unwrap();
        assert_eq!(again.as_ptr(), small_ptr);
    }

    #[test]
    fn test_zero_length_acquire() {
        let pool: FramePool<u8> = FramePool::new();

        let buf = pool.acquire(0).unwrap();
        assert_eq!(buf.len(), 0);
        assert!(buf.is_empty());
        drop(buf);

        let stats = pool.stats();
        assert_eq!(stats.free_regions, 0);
        assert_eq!(stats.live_buffers, 0);
    }

    #[test]
    fn test_stats_track_live_and_free() {
        let pool: FramePool<u8> = FramePool::new();

        let a = pool.acquire(64).unwrap();
        let b = pool.acquire(32).unwrap();
        assert_eq!(pool.stats().live_buffers, 2);

        drop(a);
        let stats = pool.stats();
        assert_eq!(stats.live_buffers, 1);
        assert_eq!(stats.free_regions, 1);
        assert_eq!(stats.free_bytes, 64);

        drop(b);
        assert_eq!(pool.stats().free_bytes, 96);
    }

    #[test]
    fn test_pools_of_distinct_types_are_independent() {
        let bytes: FramePool<u8> = FramePool::new();
        let words: FramePool<u16> = FramePool::new();

        drop(bytes.acquire(128).unwrap());
        assert_eq!(bytes.stats().free_regions, 1);
        assert_eq!(words.stats().free_regions, 0);
    }
}
